// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use std::time::{Duration, Instant};

use ocrelay_model::ModelBinding;

/// One prompt in flight for a session (§3).
#[derive(Debug, Clone)]
pub struct Task {
    pub trace_id: String,
    pub session_id: String,
    pub chat_id: String,
    pub prompt: String,
    pub model: Option<ModelBinding>,
    pub configured_timeout: Duration,
}

impl Task {
    /// §5: end-to-end deadline is `max(90s, 2 × configured_timeout)`, capped
    /// at 30 minutes.
    pub fn deadline_from(&self, started_at: Instant) -> Instant {
        let span = (self.configured_timeout * 2).max(Duration::from_secs(90));
        let span = span.min(Duration::from_secs(30 * 60));
        started_at + span
    }
}
