// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;
use ocrelay_render::OutputMode;
use thiserror::Error;

/// Opaque reference to a sent chat message, returned by [`ChatAdapter::send`]
/// and reused by every later [`ChatAdapter::edit`] call for that slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatHandle(pub String);

/// §4.7/§7: the chat transport boundary. Implemented against Telegram in
/// `ocrelay-channels`; the actor only ever sees this trait.
#[async_trait]
pub trait ChatAdapter: Send + Sync {
    async fn send(&self, chat_id: &str, text: &str, mode: OutputMode) -> Result<ChatHandle, ChatError>;

    /// Edits an existing message in place. "Content not modified" is success.
    async fn edit(
        &self,
        chat_id: &str,
        handle: &ChatHandle,
        text: &str,
        mode: OutputMode,
    ) -> Result<(), ChatError>;
}

#[derive(Debug, Error)]
pub enum ChatError {
    /// Telegram's "message is not modified" response. Adapters are expected
    /// to absorb this themselves and return `Ok(())` (§4.7) — kept here so
    /// the taxonomy has a name for it if a future adapter can't.
    #[error("chat message content was not modified")]
    NotModified,
    #[error("chat message text failed to parse: {0}")]
    ParseError(String),
    #[error("chat transport error: {0}")]
    Transport(String),
}
