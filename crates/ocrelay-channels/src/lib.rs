// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
//! Telegram implementation of [`ocrelay_core::ChatAdapter`] (§4.7).

use async_trait::async_trait;
use ocrelay_core::{ChatAdapter, ChatError, ChatHandle};
use ocrelay_render::OutputMode;
use teloxide::prelude::*;
use teloxide::types::{ChatId, MessageId, ParseMode};
use teloxide::RequestError;

/// Thin wrapper over a [`teloxide::Bot`] implementing the chat transport the
/// session actor speaks to. Also exposed to `ocrelay`'s runtime so the same
/// `Bot` backs both the outbound adapter and the inbound dispatcher.
#[derive(Clone)]
pub struct TelegramAdapter {
    bot: Bot,
}

impl TelegramAdapter {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> &Bot {
        &self.bot
    }
}

fn to_parse_mode(mode: OutputMode) -> Option<ParseMode> {
    match mode {
        OutputMode::Html => Some(ParseMode::Html),
        OutputMode::Plain => None,
    }
}

fn parse_chat_id(chat_id: &str) -> Result<ChatId, ChatError> {
    chat_id
        .parse::<i64>()
        .map(ChatId)
        .map_err(|_| ChatError::Transport(format!("invalid telegram chat id: {chat_id}")))
}

fn parse_message_id(handle: &ChatHandle) -> Result<MessageId, ChatError> {
    handle
        .0
        .parse::<i32>()
        .map(MessageId)
        .map_err(|_| ChatError::Transport(format!("invalid telegram message id: {}", handle.0)))
}

/// Telegram's "message is not modified" edit response (§4.7, §7 `NotModified`).
fn is_not_modified(err: &RequestError) -> bool {
    message_contains(&err.to_string(), "message is not modified")
}

/// Telegram's HTML-entity parse failure (§4.7, §7 `ParseError`).
fn is_parse_error(err: &RequestError) -> bool {
    message_contains(&err.to_string(), "can't parse entities")
}

fn message_contains(rendered: &str, needle: &str) -> bool {
    rendered.contains(needle)
}

#[async_trait]
impl ChatAdapter for TelegramAdapter {
    async fn send(&self, chat_id: &str, text: &str, mode: OutputMode) -> Result<ChatHandle, ChatError> {
        let id = parse_chat_id(chat_id)?;
        let request = self.bot.send_message(id, text);
        let request = match to_parse_mode(mode) {
            Some(pm) => request.parse_mode(pm),
            None => request,
        };
        let msg = request.await.map_err(|e| ChatError::Transport(e.to_string()))?;
        Ok(ChatHandle(msg.id.0.to_string()))
    }

    async fn edit(
        &self,
        chat_id: &str,
        handle: &ChatHandle,
        text: &str,
        mode: OutputMode,
    ) -> Result<(), ChatError> {
        let id = parse_chat_id(chat_id)?;
        let message_id = parse_message_id(handle)?;
        let request = self.bot.edit_message_text(id, message_id, text);
        let request = match to_parse_mode(mode) {
            Some(pm) => request.parse_mode(pm),
            None => request,
        };
        match request.await {
            Ok(_) => Ok(()),
            Err(e) if is_not_modified(&e) => Ok(()),
            Err(e) if is_parse_error(&e) => Err(ChatError::ParseError(e.to_string())),
            Err(e) => Err(ChatError::Transport(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_mode_maps_html_and_plain() {
        assert!(matches!(to_parse_mode(OutputMode::Html), Some(ParseMode::Html)));
        assert!(to_parse_mode(OutputMode::Plain).is_none());
    }

    #[test]
    fn chat_id_parses_numeric_strings() {
        assert_eq!(parse_chat_id("12345").unwrap(), ChatId(12345));
        assert_eq!(parse_chat_id("-100987").unwrap(), ChatId(-100987));
    }

    #[test]
    fn chat_id_rejects_garbage() {
        assert!(parse_chat_id("not-a-number").is_err());
        assert!(parse_chat_id("").is_err());
    }

    #[test]
    fn message_id_parses_handle() {
        let handle = ChatHandle("42".to_string());
        assert_eq!(parse_message_id(&handle).unwrap(), MessageId(42));
    }

    #[test]
    fn message_id_rejects_non_numeric_handle() {
        let handle = ChatHandle("abc".to_string());
        assert!(parse_message_id(&handle).is_err());
    }

    #[test]
    fn message_contains_matches_telegram_not_modified_text() {
        let rendered = "Api(BadRequest(\"Bad Request: message is not modified\"))";
        assert!(message_contains(rendered, "message is not modified"));
    }

    #[test]
    fn message_contains_matches_telegram_parse_entities_text() {
        let rendered = "Api(BadRequest(\"Bad Request: can't parse entities: unclosed tag\"))";
        assert!(message_contains(rendered, "can't parse entities"));
    }

    #[test]
    fn message_contains_false_for_unrelated_text() {
        let rendered = "Network(error sending request)";
        assert!(!message_contains(rendered, "message is not modified"));
        assert!(!message_contains(rendered, "can't parse entities"));
    }
}
