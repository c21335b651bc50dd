// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

use crate::canonical_json;

/// Kind of a message part. `Unknown` preserves forward compatibility with
/// backend part types introduced after this crate was written — round-trip
/// instead of erroring (§6.1: unrecognized event/part shapes must not cause
/// parse failures).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PartKind {
    Text,
    Reasoning,
    Tool,
    StepStart,
    StepFinish,
    #[serde(other)]
    Unknown,
}

/// Fast-path shape for a tool part's structured state (§9 design note), with
/// an opaque fallback for anything that doesn't match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolState {
    Structured {
        status: String,
        #[serde(default)]
        input: ToolStateInput,
        #[serde(default)]
        output: Option<String>,
    },
    Opaque(serde_json::Value),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolStateInput {
    pub command: Option<String>,
    pub description: Option<String>,
}

impl ToolState {
    fn canonical(&self) -> String {
        match self {
            ToolState::Structured { .. } => {
                let value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
                canonical_json(&value)
            }
            ToolState::Opaque(v) => canonical_json(v),
        }
    }
}

/// One fragment of an assistant message's content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub id: String,
    #[serde(rename = "messageID", alias = "message_id")]
    pub message_id: String,
    pub kind: PartKind,
    pub text: String,
    pub tool: Option<String>,
    pub state: Option<ToolState>,
    pub snapshot: Option<serde_json::Value>,
    pub reason: Option<String>,
}

impl Part {
    /// Synthesize a deterministic ID for a part the backend sent without one,
    /// so repeated events/reconciles for the same (message, type) converge on
    /// one record (§4.3.2, §4.4.3, §8 scenario 4).
    pub fn fallback_id(kind: &PartKind) -> String {
        format!("{}:event-fallback", kind_tag(kind))
    }

    /// Equality used to suppress no-op updates and keep `Revision` from
    /// bumping on a replayed/idempotent event (§4.4.3).
    pub fn content_eq(&self, other: &Part) -> bool {
        self.id == other.id
            && self.kind == other.kind
            && self.text == other.text
            && self.tool == other.tool
            && self.reason == other.reason
            && snapshot_eq(&self.snapshot, &other.snapshot)
            && state_eq(&self.state, &other.state)
    }
}

fn kind_tag(kind: &PartKind) -> &'static str {
    match kind {
        PartKind::Text => "text",
        PartKind::Reasoning => "reasoning",
        PartKind::Tool => "tool",
        PartKind::StepStart => "step-start",
        PartKind::StepFinish => "step-finish",
        PartKind::Unknown => "unknown",
    }
}

fn snapshot_eq(a: &Option<serde_json::Value>, b: &Option<serde_json::Value>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => canonical_json(a) == canonical_json(b),
        (None, None) => true,
        _ => false,
    }
}

fn state_eq(a: &Option<ToolState>, b: &Option<ToolState>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.canonical() == b.canonical(),
        (None, None) => true,
        _ => false,
    }
}
