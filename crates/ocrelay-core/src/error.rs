// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

use ocrelay_backend::BackendError;

/// §7: the error a `Submit` caller observes. This is the task's *acceptance*
/// outcome, not its eventual render outcome — the actor never reports task
/// failures back through this channel once accepted (§4.8).
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("session is already processing another task")]
    Busy,
    #[error("task exceeded its deadline")]
    Timeout,
    #[error("backend rejected the prompt: {0}")]
    Backend(#[from] BackendError),
    #[error("session actor is shutting down")]
    ActorGone,
}
