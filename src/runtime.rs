// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
//! C8: boots every other component and wires the Telegram dispatcher to the
//! session registry. Mirrors the teacher's `TelegramBot::run` shape — a
//! `Dispatcher` built over one endpoint, with shared state handed in through
//! `dptree::deps!` — generalized from a single chat backend to the full
//! actor/event-pump/renderer stack.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ocrelay_backend::{BackendClient, HttpBackendClient, SessionSummary};
use ocrelay_channels::TelegramAdapter;
use ocrelay_config::{Config, RenderMode};
use ocrelay_core::{ActorConfig, ChatAdapter, EventPump, SessionRegistry, SubmitError, Task};
use ocrelay_model::ModelBinding;
use ocrelay_render::{Mode, RenderCache};
use ocrelay_sessions::{SessionRecord, SessionStore};
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const HELP_TEXT: &str = "\
Send any message to continue the current conversation.\n\
/new — start a fresh backend session for this chat\n\
/abort — cancel the in-flight response for this chat\n\
/help — show this message";

/// §4.8: per-call deadline for the blocking startup sequence.
const STARTUP_DEADLINE: Duration = Duration::from_secs(8);

/// §4.8: blocking startup sequence — `ListSessions`, `GetProviders`,
/// `GetAgents`, `GetConfig`, called sequentially, each under its own
/// deadline. Any failure aborts startup; the session list is returned so the
/// caller can prime the status map afterward.
async fn startup_sequence(backend: &dyn BackendClient) -> anyhow::Result<Vec<SessionSummary>> {
    let sessions = tokio::time::timeout(STARTUP_DEADLINE, backend.list_sessions())
        .await
        .context("list_sessions timed out during startup")??;
    tokio::time::timeout(STARTUP_DEADLINE, backend.get_providers())
        .await
        .context("get_providers timed out during startup")??;
    tokio::time::timeout(STARTUP_DEADLINE, backend.get_agents())
        .await
        .context("get_agents timed out during startup")??;
    tokio::time::timeout(STARTUP_DEADLINE, backend.get_config())
        .await
        .context("get_config timed out during startup")??;
    Ok(sessions)
}

fn render_mode(mode: RenderMode) -> Mode {
    match mode {
        RenderMode::Plain => Mode::Plain,
        RenderMode::MarkdownFinal => Mode::MarkdownFinal,
        RenderMode::MarkdownStream => Mode::MarkdownStream,
    }
}

/// Boots the backend client, renderer, chat adapter, session registry, and
/// event pump, then runs the Telegram long-poll dispatcher until it exits
/// (Ctrl-C, per `enable_ctrlc_handler`).
pub async fn run(config: Config) -> anyhow::Result<()> {
    let token = std::env::var(&config.telegram.bot_token_env).with_context(|| {
        format!(
            "reading Telegram bot token from ${}",
            config.telegram.bot_token_env
        )
    })?;
    let bot = build_bot(token, &config)?;

    let configured_timeout = Duration::from_secs(config.backend.timeout_seconds);
    let backend: Arc<dyn BackendClient> = Arc::new(HttpBackendClient::with_request_logging(
        config.backend.url.clone(),
        configured_timeout,
        config.logging.enable_backend_request_logs,
    )?);
    let chat: Arc<dyn ChatAdapter> = Arc::new(TelegramAdapter::new(bot.clone()));
    let cache = Arc::new(RenderCache::new());
    let sessions = Arc::new(SessionStore::open(&config.storage)?);

    let actor_config = ActorConfig {
        render_mode: render_mode(config.render.mode),
        configured_timeout,
    };
    let registry = Arc::new(SessionRegistry::new(
        backend.clone(),
        chat.clone(),
        cache.clone(),
        actor_config,
    ));

    let sessions_at_boot = startup_sequence(backend.as_ref()).await?;

    // §4.8 non-blocking priming: seed the process-wide status map so a
    // session's state is known before its first in-flight task. Fire-and-
    // forget — startup does not wait on this.
    let priming_registry = Arc::clone(&registry);
    tokio::spawn(async move {
        for summary in sessions_at_boot {
            priming_registry
                .prime_status(&summary.id, ocrelay_model::SessionStatus::Idle)
                .await;
        }
    });

    let cancel = CancellationToken::new();
    let pump = EventPump::new(backend.clone(), Arc::clone(&registry));
    let pump_handle = tokio::spawn(pump.run(cancel.clone()));

    let allowed_chat_ids = config.telegram.allowed_chat_ids.clone();

    let handler = Update::filter_message().endpoint(
        move |bot: Bot,
              msg: Message,
              registry: Arc<SessionRegistry>,
              sessions: Arc<SessionStore>,
              backend: Arc<dyn BackendClient>| async move {
            if !is_allowed(&allowed_chat_ids, msg.chat.id.0) {
                return respond(());
            }
            if let Err(e) = handle_message(
                &bot,
                &msg,
                registry.as_ref(),
                sessions.as_ref(),
                backend.as_ref(),
                configured_timeout,
            )
            .await
            {
                error!(error = %e, "error handling telegram update");
            }
            respond(())
        },
    );

    info!("starting telegram dispatcher");
    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![
            Arc::clone(&registry),
            Arc::clone(&sessions),
            backend.clone()
        ])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    cancel.cancel();
    let _ = pump_handle.await;
    info!("ocrelay shut down");
    Ok(())
}

/// §4.1/§6.2: `proxy.*` applies only to the Telegram transport, never the
/// backend client (`HttpBackendClient::new` always builds with `.no_proxy()`).
fn build_bot(token: String, config: &Config) -> anyhow::Result<Bot> {
    if !config.proxy.enabled {
        return Ok(Bot::new(token));
    }
    let url = config
        .proxy
        .url
        .as_deref()
        .context("proxy.enabled requires proxy.url")?;
    let client = reqwest::Client::builder()
        .proxy(reqwest::Proxy::all(url)?)
        .build()?;
    Ok(Bot::with_client(token, client))
}

fn is_allowed(allowed_chat_ids: &[i64], chat_id: i64) -> bool {
    allowed_chat_ids.is_empty() || allowed_chat_ids.contains(&chat_id)
}

async fn handle_message(
    bot: &Bot,
    msg: &Message,
    registry: &SessionRegistry,
    sessions: &SessionStore,
    backend: &dyn BackendClient,
    configured_timeout: Duration,
) -> anyhow::Result<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat_id = msg.chat.id.0.to_string();

    if text.trim() == "/help" {
        bot.send_message(msg.chat.id, HELP_TEXT).await?;
        return Ok(());
    }
    if text.trim() == "/new" {
        let summary = backend.create_session().await?;
        sessions.upsert(SessionRecord {
            chat_id: chat_id.clone(),
            session_id: summary.id,
            model: None,
        });
        bot.send_message(msg.chat.id, "Started a new session.").await?;
        return Ok(());
    }
    if text.trim() == "/abort" {
        // §5 `/abort`: cancels the task context, calls `AbortSession`, and
        // leaves already-displayed content intact.
        if let Some(record) = sessions.get(&chat_id) {
            registry.abort(&record.session_id).await;
            if let Err(e) = backend.abort_session(&record.session_id).await {
                warn!(error = %e, "abort_session failed");
            }
            bot.send_message(msg.chat.id, "Aborted.").await?;
        } else {
            bot.send_message(msg.chat.id, "No active session to abort.").await?;
        }
        return Ok(());
    }

    let (session_id, model) = resolve_session(&chat_id, sessions, backend).await?;
    let task = Task {
        trace_id: uuid::Uuid::new_v4().to_string(),
        session_id,
        chat_id,
        prompt: text.to_string(),
        model,
        configured_timeout,
    };

    match registry.submit(task).await {
        Ok(()) => {}
        Err(SubmitError::Busy) => {
            bot.send_message(msg.chat.id, "Still working on the previous message — hold on.")
                .await?;
        }
        Err(e) => {
            warn!(error = %e, "submit failed");
            bot.send_message(msg.chat.id, "Couldn't reach the backend, try again shortly.")
                .await?;
        }
    }
    Ok(())
}

/// Looks up the backend session bound to `chat_id`, creating one on first
/// contact (§3: sessions are created on demand).
async fn resolve_session(
    chat_id: &str,
    sessions: &SessionStore,
    backend: &dyn BackendClient,
) -> anyhow::Result<(String, Option<ModelBinding>)> {
    if let Some(record) = sessions.get(chat_id) {
        return Ok((record.session_id, record.model));
    }
    let summary = backend.create_session().await?;
    sessions.upsert(SessionRecord {
        chat_id: chat_id.to_string(),
        session_id: summary.id.clone(),
        model: None,
    });
    Ok((summary.id, None))
}
