// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
mod cli;
mod runtime;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Commands};
use ocrelay_config::LoggingConfig;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ocrelay_config::load(cli.config.as_deref()).context("loading configuration")?;

    init_logging(cli.verbose, &config.logging);

    if matches!(cli.command, Some(Commands::ShowConfig)) {
        println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
        return Ok(());
    }

    runtime::run(config).await
}

/// Mirrors the teacher's verbosity-to-level map; unlike its TUI case there is
/// no "silence everything unless opted in" branch here — this binary only
/// ever runs headless. `logging.output` (§6.2) picks stderr or an append-only
/// log file; `stderr` is the default and anything else is treated as a path.
fn init_logging(verbosity: u8, logging: &LoggingConfig) {
    let level = match verbosity {
        0 => logging.level.as_str(),
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let path = logging.output.strip_prefix("file:").unwrap_or_else(|| {
        if logging.output == "stderr" {
            ""
        } else {
            logging.output.as_str()
        }
    });

    if path.is_empty() {
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .with(filter)
            .try_init();
        return;
    }

    match std::fs::OpenOptions::new().create(true).append(true).open(path) {
        Ok(file) => {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(false).with_writer(file))
                .with(filter)
                .try_init();
        }
        Err(e) => {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .with(filter)
                .try_init();
            tracing::warn!(path, error = %e, "failed to open log file, falling back to stderr");
        }
    }
}
