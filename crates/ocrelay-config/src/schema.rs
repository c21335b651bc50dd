// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

fn default_backend_url() -> String {
    "http://127.0.0.1:4096".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            storage: StorageConfig::default(),
            render: RenderConfig::default(),
            logging: LoggingConfig::default(),
            proxy: ProxyConfig::default(),
            telegram: TelegramConfig::default(),
        }
    }
}

/// §6.2: `backend.url`, `backend.timeout_seconds`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_url")]
    pub url: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: default_backend_url(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// §6.2: `storage.type`, `storage.file_path`. Backs the session metadata
/// store (`ocrelay-sessions`) — out of scope as a feature per the distilled
/// spec's Non-goals, but still needs *some* concrete persistence choice for
/// the binary to run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default, rename = "type")]
    pub storage_type: StorageType,
    pub file_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            storage_type: StorageType::Memory,
            file_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageType {
    #[default]
    Memory,
    File,
}

/// §6.2, §4.5: renderer operating mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub mode: RenderMode,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self { mode: RenderMode::default() }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    Plain,
    MarkdownFinal,
    #[default]
    MarkdownStream,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_output")]
    pub output: String,
    #[serde(default)]
    pub enable_backend_request_logs: bool,
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_output() -> String {
    "stderr".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            output: default_log_output(),
            enable_backend_request_logs: false,
        }
    }
}

/// §6.2: applied only to the chat-transport client, never the backend client
/// (§4.1 forbids a proxy on backend traffic regardless of this setting).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub enabled: bool,
    pub url: Option<String>,
}

/// Telegram credentials and access control — new in the full spec; the
/// distilled spec's §6.2 table predates fixing the chat surface to Telegram.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    #[serde(default = "default_token_env")]
    pub bot_token_env: String,
    /// Empty means "allow any chat"; non-empty is an allowlist.
    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,
}

fn default_token_env() -> String {
    "OCRELAY_TELEGRAM_TOKEN".to_string()
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token_env: default_token_env(),
            allowed_chat_ids: Vec::new(),
        }
    }
}
