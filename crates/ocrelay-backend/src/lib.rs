// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
mod client;
mod error;
mod mock;
mod sse;

pub use client::{HttpBackendClient, Message, PromptRequest, SessionSummary};
pub use error::BackendError;
pub use mock::{MockBackendClient, ScriptedMockBackendClient};

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use ocrelay_model::SessionEvent;
use tokio_util::sync::CancellationToken;

pub type EventStream = Pin<Box<dyn Stream<Item = Result<SessionEvent, BackendError>> + Send>>;

/// Typed RPC + SSE surface presented by an OpenCode-style backend.
///
/// Implemented both by [`HttpBackendClient`] (real network) and by the mock
/// doubles in this crate, so the session actor and event pump can be driven
/// without a live backend.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, BackendError>;
    async fn get_session(&self, session_id: &str) -> Result<SessionSummary, BackendError>;
    async fn create_session(&self) -> Result<SessionSummary, BackendError>;
    async fn delete_session(&self, session_id: &str) -> Result<(), BackendError>;
    async fn rename_session(&self, session_id: &str, title: &str) -> Result<(), BackendError>;

    /// Messages with their parts, ordered by creation time.
    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, BackendError>;

    /// Submits a prompt and returns as soon as the backend has accepted the
    /// turn; completion is observed later through the event stream.
    async fn prompt_async(
        &self,
        session_id: &str,
        req: PromptRequest,
    ) -> Result<(), BackendError>;

    async fn abort_session(&self, session_id: &str) -> Result<(), BackendError>;
    async fn health_check(&self) -> Result<(), BackendError>;

    /// §4.8 startup sequence: the provider catalog, agent catalog, and
    /// effective backend config, in whatever opaque JSON shape the backend
    /// reports — these calls only gate startup here, nothing downstream
    /// parses their payload.
    async fn get_providers(&self) -> Result<serde_json::Value, BackendError>;
    async fn get_agents(&self) -> Result<serde_json::Value, BackendError>;
    async fn get_config(&self) -> Result<serde_json::Value, BackendError>;

    /// Opens the backend's global SSE event stream. `cancel` lets the event
    /// pump tear down the underlying connection on shutdown instead of
    /// waiting for the next idle timeout.
    async fn stream_session_events(
        &self,
        cancel: CancellationToken,
    ) -> Result<EventStream, BackendError>;
}
