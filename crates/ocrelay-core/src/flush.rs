// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use std::time::Instant;

use ocrelay_model::{PartKind, ToolState};
use ocrelay_render::{paginate, render, Mode, RenderCache};
use tracing::warn;

use crate::chat::{ChatAdapter, ChatError, ChatHandle};
use crate::state::StreamingState;

const MAX_CHUNKS: usize = 20;
const PLACEHOLDER: &str = "Processing...";
const NO_CONTENT: &str = "🤖 Response completed with no content.";

/// §4.3.4: renders the current display, paginates it, and sends/edits chat
/// messages so each chunk matches what was last committed. `finished` marks
/// this as the task's terminal flush (drives `markdown_final` gating and
/// cache eligibility); `any_event_observed` controls the initial placeholder.
/// §8 Scenario 1: a `finished` flush with no display content ever produced
/// substitutes the literal "no content" notice instead of the placeholder.
pub async fn flush(
    adapter: &dyn ChatAdapter,
    chat_id: &str,
    state: &mut StreamingState,
    mode: Mode,
    cache: &RenderCache,
    finished: bool,
    any_event_observed: bool,
) -> Result<(), ChatError> {
    let mut body = build_display(state);
    if body.is_empty() {
        if finished {
            body = NO_CONTENT.to_string();
        } else if !any_event_observed {
            body = PLACEHOLDER.to_string();
        }
    }

    let rendered = render(&body, mode, finished, cache);
    let chunks = paginate(&rendered.primary_text, MAX_CHUNKS);

    for (i, chunk) in chunks.iter().enumerate() {
        if state.last_rendered.get(i).map(String::as_str) == Some(chunk.as_str()) {
            continue;
        }

        if i >= state.chat_handles.len() {
            let handle = adapter.send(chat_id, PLACEHOLDER, rendered.primary_mode).await?;
            state.chat_handles.push(handle);
            state.last_rendered.push(String::new());
        }

        let handle = state.chat_handles[i].clone();
        match adapter.edit(chat_id, &handle, chunk, rendered.primary_mode).await {
            Ok(()) => {}
            Err(ChatError::ParseError(reason)) => {
                warn!(reason, "chat html parse error, retrying with plain fallback");
                adapter.edit(chat_id, &handle, chunk, ocrelay_render::OutputMode::Plain).await?;
            }
            Err(e) => return Err(e),
        }

        if i >= state.last_rendered.len() {
            state.last_rendered.push(chunk.clone());
        } else {
            state.last_rendered[i] = chunk.clone();
        }
    }

    state.last_update = Instant::now();
    Ok(())
}

fn build_display(state: &StreamingState) -> String {
    let mut blocks = Vec::new();
    for id in state.display_order() {
        let Some(msg) = state.message(id) else { continue };
        let mut block = format!("**{:?}** _{}_", msg.info.role, msg.info.created.to_rfc3339());
        for part_id in &msg.part_order {
            let Some(part) = msg.parts.get(part_id) else { continue };
            match part.kind {
                PartKind::Text => {
                    block.push('\n');
                    block.push_str(&part.text);
                }
                PartKind::Reasoning => {
                    for line in part.text.lines() {
                        block.push_str("\n> Thinking: ");
                        block.push_str(line);
                    }
                }
                PartKind::Tool => {
                    block.push('\n');
                    block.push_str(&render_tool_card(part));
                }
                PartKind::StepStart | PartKind::StepFinish | PartKind::Unknown => {}
            }
        }
        blocks.push(block);
    }
    blocks.join("\n\n")
}

fn render_tool_card(part: &ocrelay_model::Part) -> String {
    let Some(state) = &part.state else {
        return part.tool.clone().unwrap_or_default();
    };
    match state {
        ToolState::Structured { status, input, output } => {
            let emoji = match status.as_str() {
                "running" | "pending" => "\u{23f3}",
                "completed" | "success" => "\u{2705}",
                "error" | "failed" => "\u{274c}",
                _ => "\u{2753}",
            };
            let tool_name = part.tool.as_deref().unwrap_or("tool");
            let mut card = format!("{emoji} **{tool_name}**");
            if let Some(cmd) = &input.command {
                card.push_str(&format!("\n`{cmd}`"));
            }
            if let Some(out) = output {
                card.push_str(&format!("\n{}", truncate_output(out)));
            }
            card
        }
        ToolState::Opaque(_) => part.tool.clone().unwrap_or_default(),
    }
}

const TOOL_OUTPUT_CAP: usize = 2000;

fn truncate_output(text: &str) -> String {
    if text.len() <= TOOL_OUTPUT_CAP {
        return text.to_string();
    }
    let mut end = TOOL_OUTPUT_CAP;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &text[..end])
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use ocrelay_model::Role;
    use ocrelay_render::{Mode, RenderCache};

    use crate::test_support::{message_info, text_part, RecordingChatAdapter};

    use super::*;

    /// §8 Scenario 1: a terminal flush that never displayed any content
    /// substitutes the literal "no content" notice, not the placeholder
    /// (review finding #3).
    #[tokio::test]
    async fn terminal_flush_with_no_content_uses_no_content_notice() {
        let adapter = RecordingChatAdapter::new();
        let mut state = StreamingState::new(HashSet::new());
        let cache = RenderCache::new();

        flush(&adapter, "c1", &mut state, Mode::Plain, &cache, true, false)
            .await
            .unwrap();

        assert_eq!(adapter.last_edit().as_deref(), Some(NO_CONTENT));
    }

    /// A non-terminal flush before any event has been observed still shows
    /// the transient placeholder.
    #[tokio::test]
    async fn non_terminal_flush_before_any_event_uses_placeholder() {
        let adapter = RecordingChatAdapter::new();
        let mut state = StreamingState::new(HashSet::new());
        let cache = RenderCache::new();

        flush(&adapter, "c1", &mut state, Mode::Plain, &cache, false, false)
            .await
            .unwrap();

        assert_eq!(adapter.last_edit().as_deref(), Some(PLACEHOLDER));
    }

    /// Once content has actually streamed in, a terminal flush renders it
    /// instead of the "no content" notice.
    #[tokio::test]
    async fn terminal_flush_with_content_renders_the_content() {
        let adapter = RecordingChatAdapter::new();
        let mut state = StreamingState::new(HashSet::new());
        let cache = RenderCache::new();

        state.upsert_message_info(message_info("m1", "s1", Role::Assistant));
        state.upsert_part("m1", text_part("p1", "m1", "hello world"), None);
        state.promote();

        flush(&adapter, "c1", &mut state, Mode::Plain, &cache, true, true)
            .await
            .unwrap();

        let rendered = adapter.last_edit().unwrap();
        assert!(rendered.contains("hello world"));
        assert_ne!(rendered, NO_CONTENT);
    }
}
