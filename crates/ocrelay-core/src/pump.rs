// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use ocrelay_backend::BackendClient;
use ocrelay_model::SessionEventKind;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::registry::SessionRegistry;

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(3);

/// §4.2: the process-wide event pump. One instance per process, independent
/// of how many sessions are in flight — it demultiplexes the backend's single
/// `/event` stream and routes each event to the actor that owns it.
pub struct EventPump {
    backend: Arc<dyn BackendClient>,
    registry: Arc<SessionRegistry>,
}

impl EventPump {
    pub fn new(backend: Arc<dyn BackendClient>, registry: Arc<SessionRegistry>) -> Self {
        Self { backend, registry }
    }

    /// Runs until `cancel` fires. Reconnects with exponential backoff on any
    /// stream error, resetting the backoff after each successful connection
    /// that stays up long enough to deliver at least one event.
    pub async fn run(self, cancel: CancellationToken) {
        let mut backoff = INITIAL_BACKOFF;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            match self.backend.stream_session_events(cancel.clone()).await {
                Ok(mut stream) => {
                    info!("event stream connected");
                    let mut saw_event = false;
                    loop {
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => return,
                            next = stream.next() => {
                                match next {
                                    Some(Ok(event)) => {
                                        saw_event = true;
                                        self.dispatch(event).await;
                                    }
                                    Some(Err(e)) => {
                                        warn!(error = %e, "event stream error, reconnecting");
                                        break;
                                    }
                                    None => {
                                        warn!("event stream closed, reconnecting");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                    if saw_event {
                        backoff = INITIAL_BACKOFF;
                    }
                }
                Err(e) => warn!(error = %e, "failed to open event stream"),
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
        info!("event pump stopped");
    }

    async fn dispatch(&self, event: ocrelay_model::SessionEvent) {
        match event.session_id() {
            Some(session_id) => {
                let session_id = session_id.to_string();
                self.registry.route_event(&session_id, event).await;
            }
            None => match &event.kind {
                SessionEventKind::Heartbeat => debug!("heartbeat"),
                other => debug!(?other, "event without a session id, dropping"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ocrelay_backend::MockBackendClient;
    use ocrelay_model::SessionStatus;
    use ocrelay_render::{Mode, RenderCache};

    use crate::registry::ActorConfig;
    use crate::test_support::{status_changed, RecordingChatAdapter};

    use super::*;

    fn registry() -> Arc<SessionRegistry> {
        Arc::new(SessionRegistry::new(
            Arc::new(MockBackendClient::new()),
            Arc::new(RecordingChatAdapter::new()),
            Arc::new(RenderCache::new()),
            ActorConfig {
                render_mode: Mode::Plain,
                configured_timeout: Duration::from_secs(30),
            },
        ))
    }

    /// §4.2 step 4: an event carrying a session id is routed to the
    /// registry; with no actor tracking the session it's just a status
    /// update, not a panic or an error.
    #[tokio::test]
    async fn dispatch_routes_events_with_a_session_id() {
        let registry = registry();
        let pump = EventPump::new(Arc::new(MockBackendClient::new()), Arc::clone(&registry));

        pump.dispatch(status_changed("s1", SessionStatus::Busy)).await;

        assert_eq!(registry.status_of("s1").await, Some(SessionStatus::Busy));
    }

    #[tokio::test]
    async fn dispatch_drops_events_without_a_session_id() {
        let registry = registry();
        let pump = EventPump::new(Arc::new(MockBackendClient::new()), Arc::clone(&registry));

        let heartbeat = ocrelay_model::SessionEvent {
            kind: SessionEventKind::Heartbeat,
            raw: serde_json::Value::Null,
        };
        pump.dispatch(heartbeat).await;

        assert_eq!(registry.status_of("s1").await, None);
    }
}
