// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures::stream;
use ocrelay_model::SessionEvent;
use tokio_util::sync::CancellationToken;

use crate::client::{Message, PromptRequest, SessionSummary};
use crate::error::BackendError;
use crate::{BackendClient, EventStream};

/// Deterministic mock backend for tests. Tracks sessions and messages in
/// memory; `prompt_async` is a no-op acknowledgement with no assistant reply
/// of its own — tests that need streamed content drive it in separately via
/// `push_event`/`ScriptedMockBackendClient`.
#[derive(Default)]
pub struct MockBackendClient {
    sessions: Mutex<HashMap<String, SessionSummary>>,
    messages: Mutex<HashMap<String, Vec<Message>>>,
    next_id: Mutex<u64>,
}

impl MockBackendClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_id(&self, prefix: &str) -> String {
        let mut n = self.next_id.lock().unwrap();
        *n += 1;
        format!("{prefix}-{n}")
    }

    /// Replaces the message snapshot `get_messages` returns for `session_id`.
    /// Lets tests drive `reconcile`'s cumulative-snapshot replay without a
    /// live backend.
    pub fn seed_messages(&self, session_id: &str, messages: Vec<Message>) {
        self.messages.lock().unwrap().insert(session_id.to_string(), messages);
    }
}

#[async_trait]
impl BackendClient for MockBackendClient {
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, BackendError> {
        Ok(self.sessions.lock().unwrap().values().cloned().collect())
    }

    async fn get_session(&self, session_id: &str) -> Result<SessionSummary, BackendError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| BackendError::protocol(format!("no such session: {session_id}")))
    }

    async fn create_session(&self) -> Result<SessionSummary, BackendError> {
        let id = self.alloc_id("session");
        let summary = SessionSummary {
            id: id.clone(),
            title: None,
            created: 0,
        };
        self.sessions.lock().unwrap().insert(id, summary.clone());
        Ok(summary)
    }

    async fn delete_session(&self, session_id: &str) -> Result<(), BackendError> {
        self.sessions.lock().unwrap().remove(session_id);
        self.messages.lock().unwrap().remove(session_id);
        Ok(())
    }

    async fn rename_session(&self, session_id: &str, title: &str) -> Result<(), BackendError> {
        if let Some(s) = self.sessions.lock().unwrap().get_mut(session_id) {
            s.title = Some(title.to_string());
        }
        Ok(())
    }

    async fn get_messages(&self, session_id: &str) -> Result<Vec<Message>, BackendError> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn prompt_async(
        &self,
        _session_id: &str,
        _req: PromptRequest,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    async fn abort_session(&self, _session_id: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn get_providers(&self) -> Result<serde_json::Value, BackendError> {
        Ok(serde_json::Value::Array(Vec::new()))
    }

    async fn get_agents(&self) -> Result<serde_json::Value, BackendError> {
        Ok(serde_json::Value::Array(Vec::new()))
    }

    async fn get_config(&self) -> Result<serde_json::Value, BackendError> {
        Ok(serde_json::Value::Object(Default::default()))
    }

    async fn stream_session_events(
        &self,
        _cancel: CancellationToken,
    ) -> Result<EventStream, BackendError> {
        Ok(Box::pin(stream::empty()))
    }
}

/// A pre-scripted mock backend. Each call to `stream_session_events` replays
/// the next queued batch of events, letting tests drive the event pump and
/// session actor through an exact, deterministic sequence without a live
/// backend connection.
pub struct ScriptedMockBackendClient {
    batches: Arc<Mutex<Vec<Vec<Result<SessionEvent, BackendError>>>>>,
    pub submitted_prompts: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedMockBackendClient {
    pub fn new(batches: Vec<Vec<Result<SessionEvent, BackendError>>>) -> Self {
        Self {
            batches: Arc::new(Mutex::new(batches)),
            submitted_prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl BackendClient for ScriptedMockBackendClient {
    async fn list_sessions(&self) -> Result<Vec<SessionSummary>, BackendError> {
        Ok(Vec::new())
    }

    async fn get_session(&self, session_id: &str) -> Result<SessionSummary, BackendError> {
        Ok(SessionSummary {
            id: session_id.to_string(),
            title: None,
            created: 0,
        })
    }

    async fn create_session(&self) -> Result<SessionSummary, BackendError> {
        Ok(SessionSummary {
            id: "scripted".to_string(),
            title: None,
            created: 0,
        })
    }

    async fn delete_session(&self, _session_id: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn rename_session(&self, _session_id: &str, _title: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn get_messages(&self, _session_id: &str) -> Result<Vec<Message>, BackendError> {
        Ok(Vec::new())
    }

    async fn prompt_async(
        &self,
        session_id: &str,
        req: PromptRequest,
    ) -> Result<(), BackendError> {
        self.submitted_prompts
            .lock()
            .unwrap()
            .push((session_id.to_string(), req.text));
        Ok(())
    }

    async fn abort_session(&self, _session_id: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn get_providers(&self) -> Result<serde_json::Value, BackendError> {
        Ok(serde_json::Value::Array(Vec::new()))
    }

    async fn get_agents(&self) -> Result<serde_json::Value, BackendError> {
        Ok(serde_json::Value::Array(Vec::new()))
    }

    async fn get_config(&self) -> Result<serde_json::Value, BackendError> {
        Ok(serde_json::Value::Object(Default::default()))
    }

    async fn stream_session_events(
        &self,
        _cancel: CancellationToken,
    ) -> Result<EventStream, BackendError> {
        let batch = {
            let mut batches = self.batches.lock().unwrap();
            if batches.is_empty() {
                Vec::new()
            } else {
                batches.remove(0)
            }
        };
        Ok(Box::pin(stream::iter(batch)))
    }
}

#[cfg(test)]
mod tests {
    use ocrelay_model::parse_session_event;

    use super::*;

    #[tokio::test]
    async fn mock_round_trips_created_session() {
        let backend = MockBackendClient::new();
        let created = backend.create_session().await.unwrap();
        let fetched = backend.get_session(&created.id).await.unwrap();
        assert_eq!(created.id, fetched.id);
    }

    #[tokio::test]
    async fn mock_forgets_deleted_session() {
        let backend = MockBackendClient::new();
        let created = backend.create_session().await.unwrap();
        backend.delete_session(&created.id).await.unwrap();
        assert!(backend.get_session(&created.id).await.is_err());
    }

    #[tokio::test]
    async fn scripted_backend_replays_batches_in_order() {
        let heartbeat = parse_session_event(r#"{"type":"server.heartbeat","properties":{}}"#)
            .unwrap();
        let backend =
            ScriptedMockBackendClient::new(vec![vec![Ok(heartbeat)], vec![Err(BackendError::Timeout)]]);

        use futures::StreamExt;
        let cancel = CancellationToken::new();
        let mut first = backend
            .stream_session_events(cancel.clone())
            .await
            .unwrap();
        assert!(first.next().await.unwrap().is_ok());

        let mut second = backend.stream_session_events(cancel).await.unwrap();
        assert!(second.next().await.unwrap().is_err());
    }

    #[tokio::test]
    async fn scripted_backend_records_submitted_prompts() {
        let backend = ScriptedMockBackendClient::new(vec![]);
        backend
            .prompt_async(
                "s1",
                PromptRequest {
                    text: "hello".into(),
                    agent: None,
                    model: None,
                },
            )
            .await
            .unwrap();
        let sent = backend.submitted_prompts.lock().unwrap();
        assert_eq!(sent.as_slice(), &[("s1".to_string(), "hello".to_string())]);
    }
}
