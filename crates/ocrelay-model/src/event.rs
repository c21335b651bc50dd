// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

use crate::{MessageInfo, Part};

/// Session-level busy/idle status as reported by `session.status` events
/// (§3, §4.3.2). The backend may emit other values over time; we only act
/// on the two named here (§9 Open Questions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Busy,
    Idle,
    #[serde(other)]
    Other,
}

/// One event off the backend's `/event` SSE multiplex, already demultiplexed
/// down to the shapes this system reacts to. Anything else decodes to
/// `Other` so a single unrecognized event type cannot break the stream
/// (§6.1).
#[derive(Debug, Clone)]
pub enum SessionEventKind {
    MessageUpdated { session_id: String, info: MessageInfo },
    MessagePartUpdated { session_id: String, part: Part, delta: Option<String> },
    SessionStatusChanged { session_id: String, status: SessionStatus },
    /// `server.connected` / `server.heartbeat` — recognized but carry no
    /// session id and no actionable payload.
    Heartbeat,
    /// Any event type this build does not recognize.
    Other(String),
}

/// A parsed SSE event, retaining the raw JSON in case a consumer needs to
/// inspect fields this crate's typed view does not surface.
#[derive(Debug, Clone)]
pub struct SessionEvent {
    pub kind: SessionEventKind,
    pub raw: serde_json::Value,
}

impl SessionEvent {
    /// The session this event belongs to, if any (heartbeats and unrecognized
    /// events have none) — used by the event pump to route to the owning
    /// actor (§4.2).
    pub fn session_id(&self) -> Option<&str> {
        match &self.kind {
            SessionEventKind::MessageUpdated { session_id, .. } => Some(session_id),
            SessionEventKind::MessagePartUpdated { session_id, .. } => Some(session_id),
            SessionEventKind::SessionStatusChanged { session_id, .. } => Some(session_id),
            SessionEventKind::Heartbeat | SessionEventKind::Other(_) => None,
        }
    }
}

/// Wire envelope as sent by the backend: `{"type": "...", "properties": {...}}`.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    properties: serde_json::Value,
}

/// Parse one SSE `data:` payload into a [`SessionEvent`].
///
/// Returns `Err` only for payloads that aren't even valid JSON envelopes;
/// recognized-but-unexpected shapes inside a known `type` fall back to
/// `Other` rather than erroring, per §6.1 and §7's `BackendProtocolError`
/// (logged, event dropped, state unchanged — the caller decides to drop it).
pub fn parse_session_event(data: &str) -> Result<SessionEvent, serde_json::Error> {
    let raw: serde_json::Value = serde_json::from_str(data)?;
    let envelope: RawEnvelope = serde_json::from_value(raw.clone())?;

    let kind = match envelope.kind.as_str() {
        "message.updated" => match serde_json::from_value::<MessageInfoEnvelope>(envelope.properties) {
            Ok(e) => SessionEventKind::MessageUpdated {
                session_id: e.info.session_id.clone(),
                info: e.info,
            },
            Err(_) => SessionEventKind::Other(envelope.kind),
        },
        "message.part.updated" => {
            match serde_json::from_value::<PartEnvelope>(envelope.properties) {
                Ok(e) => SessionEventKind::MessagePartUpdated {
                    session_id: e.part.session_id,
                    part: e.part.part,
                    delta: e.delta,
                },
                Err(_) => SessionEventKind::Other(envelope.kind),
            }
        }
        "session.status" => match serde_json::from_value::<StatusEnvelope>(envelope.properties) {
            Ok(e) => SessionEventKind::SessionStatusChanged {
                session_id: e.session_id,
                status: e.status,
            },
            Err(_) => SessionEventKind::Other(envelope.kind),
        },
        "server.connected" | "server.heartbeat" => SessionEventKind::Heartbeat,
        other => SessionEventKind::Other(other.to_string()),
    };

    Ok(SessionEvent { kind, raw })
}

#[derive(Deserialize)]
struct MessageInfoEnvelope {
    info: MessageInfo,
}

#[derive(Deserialize)]
struct PartEnvelope {
    #[serde(flatten)]
    part: PartWithSession,
    delta: Option<String>,
}

#[derive(Deserialize)]
struct PartWithSession {
    #[serde(rename = "sessionID", alias = "session_id")]
    session_id: String,
    #[serde(flatten)]
    part: Part,
}

#[derive(Deserialize)]
struct StatusEnvelope {
    #[serde(rename = "sessionID", alias = "session_id")]
    session_id: String,
    status: SessionStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heartbeat_events_are_dropped_without_error() {
        let ev = parse_session_event(r#"{"type":"server.heartbeat","properties":{}}"#).unwrap();
        assert!(matches!(ev.kind, SessionEventKind::Heartbeat));
        assert!(ev.session_id().is_none());
    }

    #[test]
    fn unrecognized_event_type_does_not_error() {
        let ev = parse_session_event(r#"{"type":"some.future.event","properties":{"x":1}}"#).unwrap();
        assert!(matches!(ev.kind, SessionEventKind::Other(_)));
    }

    #[test]
    fn malformed_json_is_an_error_not_a_panic() {
        assert!(parse_session_event("not json").is_err());
    }

    #[test]
    fn session_status_event_carries_explicit_session_id() {
        let ev = parse_session_event(
            r#"{"type":"session.status","properties":{"sessionID":"sess-1","status":"idle"}}"#,
        )
        .unwrap();
        assert_eq!(ev.session_id(), Some("sess-1"));
        assert!(matches!(
            ev.kind,
            SessionEventKind::SessionStatusChanged { status: SessionStatus::Idle, .. }
        ));
    }
}
