// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
//! Wire types shared between the backend client ([`ocrelay_backend`]) and the
//! session actor ([`ocrelay_core`]).
//!
//! Every type here mirrors one of the entities the backend's HTTP+SSE surface
//! emits: a session message, one of its parts, and the session-level events
//! delivered over `/event`. None of these types carry behavior beyond what is
//! needed for (de)serialization and the merge/equality rules the actor needs —
//! the state machine itself lives in `ocrelay-core`.

mod event;
mod message;
mod part;

pub use event::{SessionEvent, SessionEventKind, SessionStatus};
pub use message::{MessageInfo, ModelBinding, Role};
pub use part::{Part, PartKind, ToolState};

/// Canonical (sorted-key) JSON stringification, used by [`Part`]'s equality
/// check so that two semantically-identical `state` payloads with different
/// key orders don't spuriously bump a message's revision (§4.4.3).
pub fn canonical_json(value: &serde_json::Value) -> String {
    fn sorted(value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::Object(map) => {
                let mut entries: Vec<_> = map.iter().collect();
                entries.sort_by(|a, b| a.0.cmp(b.0));
                let mut sorted_map = serde_json::Map::new();
                for (k, v) in entries {
                    sorted_map.insert(k.clone(), sorted(v));
                }
                serde_json::Value::Object(sorted_map)
            }
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(sorted).collect())
            }
            other => other.clone(),
        }
    }
    sorted(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_is_order_independent() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn canonical_json_sorts_nested_objects() {
        let a = json!({"outer": {"z": 1, "a": 2}});
        let b = json!({"outer": {"a": 2, "z": 1}});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }
}
