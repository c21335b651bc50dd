// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// §7 error taxonomy for the backend client boundary.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend protocol error: {0}")]
    Protocol(String),

    #[error("backend request timed out")]
    Timeout,
}

impl BackendError {
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}
