// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a backend session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// Metadata for one backend session message (the `Info` half of a message;
/// its parts are tracked separately — see [`crate::Part`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageInfo {
    pub id: String,
    #[serde(rename = "sessionID", alias = "session_id")]
    pub session_id: String,
    pub role: Role,
    pub created: DateTime<Utc>,
    /// Set once the backend has finished generating this message.
    pub completed: Option<DateTime<Utc>>,
    /// Finish reason (e.g. "stop", "length", "tool-calls").
    pub finish: Option<String>,
    pub error: Option<String>,
    pub model: Option<String>,
    pub agent: Option<String>,
}

impl MessageInfo {
    /// A message is done generating when it carries a completion timestamp,
    /// a finish reason, or an error — any one suffices (§4.3.3).
    pub fn is_complete(&self) -> bool {
        self.completed.is_some() || self.finish.is_some() || self.error.is_some()
    }

    /// Merge an incoming snapshot/event `Info` into `self`: every populated
    /// field on `other` overwrites the corresponding field on `self`; zero
    /// (`None`) fields on `other` leave `self` untouched. Completion markers
    /// are monotonic — once set they are never cleared by a later merge
    /// (§4.4.2).
    pub fn merge_from(&mut self, other: &MessageInfo) {
        if other.completed.is_some() {
            self.completed = other.completed;
        }
        if other.finish.is_some() {
            self.finish = other.finish.clone();
        }
        if other.error.is_some() {
            self.error = other.error.clone();
        }
        if other.model.is_some() {
            self.model = other.model.clone();
        }
        if other.agent.is_some() {
            self.agent = other.agent.clone();
        }
        // `created`, `id`, `session_id`, `role` are set once at creation and
        // never change under merge.
    }
}

/// The provider+model a session is bound to, resolved by the session
/// metadata collaborator before a prompt is dispatched (§3, §6.3).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelBinding {
    pub provider: String,
    pub model: String,
}
