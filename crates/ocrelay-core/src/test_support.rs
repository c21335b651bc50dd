// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
//! Test-only doubles shared by this crate's unit tests: a recording
//! [`ChatAdapter`] plus a couple of event/message builders, so `actor.rs`,
//! `flush.rs`, `pump.rs`, and `registry.rs` don't each reinvent them.
#![cfg(test)]

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use ocrelay_backend::{BackendClient, BackendError, EventStream, Message, MockBackendClient, PromptRequest, SessionSummary};
use ocrelay_model::{MessageInfo, Part, PartKind, Role, SessionEvent, SessionEventKind, SessionStatus};
use ocrelay_render::OutputMode;
use tokio_util::sync::CancellationToken;

use crate::chat::{ChatAdapter, ChatError, ChatHandle};

/// Records every `send`/`edit` call in order; never fails. Good enough to
/// assert on the final rendered text of a task without a live Telegram bot.
#[derive(Default)]
pub struct RecordingChatAdapter {
    pub sent: Mutex<Vec<(String, String)>>,
    pub edited: Mutex<Vec<(String, String)>>,
}

impl RecordingChatAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The text of the most recent `edit` call, if any — i.e. what the chat
    /// would currently show for the first message slot.
    pub fn last_edit(&self) -> Option<String> {
        self.edited.lock().unwrap().last().map(|(_, text)| text.clone())
    }
}

#[async_trait]
impl ChatAdapter for RecordingChatAdapter {
    async fn send(&self, chat_id: &str, text: &str, _mode: OutputMode) -> Result<ChatHandle, ChatError> {
        let idx = self.sent.lock().unwrap().len();
        self.sent.lock().unwrap().push((chat_id.to_string(), text.to_string()));
        Ok(ChatHandle(format!("handle-{idx}")))
    }

    async fn edit(
        &self,
        _chat_id: &str,
        handle: &ChatHandle,
        text: &str,
        _mode: OutputMode,
    ) -> Result<(), ChatError> {
        self.edited.lock().unwrap().push((handle.0.clone(), text.to_string()));
        Ok(())
    }
}

/// Wraps [`MockBackendClient`] but always fails `prompt_async` — exercises
/// the `SubmitError::Backend` path (§4.1/§7) without a live backend.
#[derive(Default)]
pub struct PromptFailingBackend {
    inner: MockBackendClient,
}

impl PromptFailingBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BackendClient for PromptFailingBackend {
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, BackendError> {
        self.inner.list_sessions().await
    }
    async fn get_session(&self, session_id: &str) -> Result<SessionSummary, BackendError> {
        self.inner.get_session(session_id).await
    }
    async fn create_session(&self) -> Result<SessionSummary, BackendError> {
        self.inner.create_session().await
    }
    async fn delete_session(&self, session_id: &str) -> Result<(), BackendError> {
        self.inner.delete_session(session_id).await
    }
    async fn rename_session(&self, session_id: &str, title: &str) -> Result<(), BackendError> {
        self.inner.rename_session(session_id, title).await
    }
    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, BackendError> {
        self.inner.get_messages(session_id).await
    }
    async fn prompt_async(&self, _session_id: &str, _req: PromptRequest) -> Result<(), BackendError> {
        Err(BackendError::Timeout)
    }
    async fn abort_session(&self, session_id: &str) -> Result<(), BackendError> {
        self.inner.abort_session(session_id).await
    }
    async fn health_check(&self) -> Result<(), BackendError> {
        self.inner.health_check().await
    }
    async fn get_providers(&self) -> Result<serde_json::Value, BackendError> {
        self.inner.get_providers().await
    }
    async fn get_agents(&self) -> Result<serde_json::Value, BackendError> {
        self.inner.get_agents().await
    }
    async fn get_config(&self) -> Result<serde_json::Value, BackendError> {
        self.inner.get_config().await
    }
    async fn stream_session_events(&self, cancel: CancellationToken) -> Result<EventStream, BackendError> {
        self.inner.stream_session_events(cancel).await
    }
}

pub fn message_info(id: &str, session_id: &str, role: Role) -> MessageInfo {
    MessageInfo {
        id: id.to_string(),
        session_id: session_id.to_string(),
        role,
        created: Utc::now(),
        completed: None,
        finish: None,
        error: None,
        model: None,
        agent: None,
    }
}

pub fn text_part(id: &str, message_id: &str, text: &str) -> Part {
    Part {
        id: id.to_string(),
        message_id: message_id.to_string(),
        kind: PartKind::Text,
        text: text.to_string(),
        tool: None,
        state: None,
        snapshot: None,
        reason: None,
    }
}

pub fn message_updated(session_id: &str, info: MessageInfo) -> SessionEvent {
    SessionEvent {
        kind: SessionEventKind::MessageUpdated { session_id: session_id.to_string(), info },
        raw: serde_json::Value::Null,
    }
}

pub fn part_updated(session_id: &str, part: Part, delta: Option<&str>) -> SessionEvent {
    SessionEvent {
        kind: SessionEventKind::MessagePartUpdated {
            session_id: session_id.to_string(),
            part,
            delta: delta.map(str::to_string),
        },
        raw: serde_json::Value::Null,
    }
}

pub fn status_changed(session_id: &str, status: SessionStatus) -> SessionEvent {
    SessionEvent {
        kind: SessionEventKind::SessionStatusChanged { session_id: session_id.to_string(), status },
        raw: serde_json::Value::Null,
    }
}
