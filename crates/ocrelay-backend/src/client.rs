// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use std::time::Duration;

use async_trait::async_trait;
use ocrelay_model::{MessageInfo, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::BackendError;
use crate::sse::open_event_stream;
use crate::{BackendClient, EventStream};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: Option<String>,
    #[serde(default)]
    pub created: i64,
}

/// A message together with its parts, as returned by `GET /session/{id}/message`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub info: MessageInfo,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptRequest {
    pub text: String,
    pub agent: Option<String>,
    pub model: Option<String>,
}

/// Shared-client HTTP + SSE implementation of [`BackendClient`].
///
/// Per §4.1, this client never honors `HTTP_PROXY`/`HTTPS_PROXY` — backend
/// traffic is always direct, regardless of `proxy.*` config (which governs
/// only the chat transport).
pub struct HttpBackendClient {
    client: Client,
    base_url: String,
    snapshot_timeout: Duration,
    submit_timeout: Duration,
    /// §4.8: per-call deadline for the blocking startup sequence.
    startup_timeout: Duration,
    /// `logging.enable_backend_request_logs` (§6.2): promotes the per-RPC
    /// trace line from `debug` to `info` so it shows up without raising the
    /// whole process's verbosity.
    log_requests: bool,
}

impl HttpBackendClient {
    pub fn new(base_url: impl Into<String>, configured_timeout: Duration) -> Result<Self, BackendError> {
        Self::with_request_logging(base_url, configured_timeout, false)
    }

    pub fn with_request_logging(
        base_url: impl Into<String>,
        configured_timeout: Duration,
        log_requests: bool,
    ) -> Result<Self, BackendError> {
        let client = Client::builder()
            .no_proxy()
            .use_rustls_tls()
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            snapshot_timeout: Duration::from_secs(4),
            submit_timeout: configured_timeout.max(Duration::from_secs(8)),
            startup_timeout: Duration::from_secs(8),
            log_requests,
        })
    }

    fn log_request(&self, session_id: &str, what: &str) {
        if self.log_requests {
            tracing::info!(session_id, "sending backend {what} request");
        } else {
            debug!(session_id, "sending backend {what} request");
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn snapshot_get<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<T, BackendError> {
        let resp = tokio::time::timeout(
            self.snapshot_timeout,
            self.client.get(self.url(path)).send(),
        )
        .await
        .map_err(|_| BackendError::Timeout)??;
        let resp = resp.error_for_status()?;
        resp.json::<T>().await.map_err(BackendError::from)
    }

    async fn startup_get(&self, path: &str) -> Result<serde_json::Value, BackendError> {
        debug!(path, "backend startup request");
        let resp = tokio::time::timeout(
            self.startup_timeout,
            self.client.get(self.url(path)).send(),
        )
        .await
        .map_err(|_| BackendError::Timeout)??;
        let resp = resp.error_for_status()?;
        resp.json::<serde_json::Value>().await.map_err(BackendError::from)
    }
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, BackendError> {
        self.snapshot_get("/session").await
    }

    async fn get_session(&self, session_id: &str) -> Result<SessionSummary, BackendError> {
        self.snapshot_get(&format!("/session/{session_id}")).await
    }

    async fn create_session(&self) -> Result<SessionSummary, BackendError> {
        let resp = tokio::time::timeout(
            self.snapshot_timeout,
            self.client.post(self.url("/session")).send(),
        )
        .await
        .map_err(|_| BackendError::Timeout)??;
        resp.error_for_status()?
            .json::<SessionSummary>()
            .await
            .map_err(BackendError::from)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), BackendError> {
        let resp = tokio::time::timeout(
            self.snapshot_timeout,
            self.client
                .delete(self.url(&format!("/session/{session_id}")))
                .send(),
        )
        .await
        .map_err(|_| BackendError::Timeout)??;
        resp.error_for_status()?;
        Ok(())
    }

    async fn rename_session(&self, session_id: &str, title: &str) -> Result<(), BackendError> {
        #[derive(Serialize)]
        struct Body<'a> {
            title: &'a str,
        }
        let resp = tokio::time::timeout(
            self.snapshot_timeout,
            self.client
                .put(self.url(&format!("/session/{session_id}")))
                .json(&Body { title })
                .send(),
        )
        .await
        .map_err(|_| BackendError::Timeout)??;
        resp.error_for_status()?;
        Ok(())
    }

    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, BackendError> {
        let mut messages: Vec<Message> = self
            .snapshot_get(&format!("/session/{session_id}/message"))
            .await?;
        messages.sort_by_key(|m| m.info.created);
        Ok(messages)
    }

    async fn prompt_async(
        &self,
        session_id: &str,
        req: PromptRequest,
    ) -> Result<(), BackendError> {
        self.log_request(session_id, "prompt_async");
        #[derive(Serialize)]
        struct Body {
            text: String,
            agent: Option<String>,
            model: Option<String>,
        }
        let resp = tokio::time::timeout(
            self.submit_timeout,
            self.client
                .post(self.url(&format!("/session/{session_id}/prompt_async")))
                .json(&Body {
                    text: req.text,
                    agent: req.agent,
                    model: req.model,
                })
                .send(),
        )
        .await
        .map_err(|_| BackendError::Timeout)??;
        resp.error_for_status()?;
        Ok(())
    }

    async fn abort_session(&self, session_id: &str) -> Result<(), BackendError> {
        self.log_request(session_id, "abort_session");
        let resp = tokio::time::timeout(
            self.snapshot_timeout,
            self.client
                .post(self.url(&format!("/session/{session_id}/abort")))
                .send(),
        )
        .await
        .map_err(|_| BackendError::Timeout)??;
        resp.error_for_status()?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        let resp = tokio::time::timeout(
            self.snapshot_timeout,
            self.client.get(self.url("/global/health")).send(),
        )
        .await
        .map_err(|_| BackendError::Timeout)??;
        resp.error_for_status()?;
        Ok(())
    }

    async fn get_providers(&self) -> Result<serde_json::Value, BackendError> {
        self.startup_get("/provider").await
    }

    async fn get_agents(&self) -> Result<serde_json::Value, BackendError> {
        self.startup_get("/agent").await
    }

    async fn get_config(&self) -> Result<serde_json::Value, BackendError> {
        self.startup_get("/config").await
    }

    async fn stream_session_events(
        &self,
        cancel: CancellationToken,
    ) -> Result<EventStream, BackendError> {
        open_event_stream(&self.client, &self.url("/event"), cancel).await
    }
}
