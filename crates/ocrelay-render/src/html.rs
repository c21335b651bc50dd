// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use pulldown_cmark::{Event, Options, Parser, Tag, TagEnd};

use crate::cache::RenderCache;

const INPUT_CAP: usize = 100_000;
const TRUNCATION_TAIL: &str = "... (truncated)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Plain,
    MarkdownFinal,
    MarkdownStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Html,
    Plain,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub primary_text: String,
    pub primary_mode: OutputMode,
}

/// §4.5: renders `raw` according to `mode`. `finished` marks whether the
/// owning task has completed its current edit ("non-streaming" in cache
/// terms); `markdown_final` only transforms once `finished` is true.
pub fn render(raw: &str, mode: Mode, finished: bool, cache: &RenderCache) -> Output {
    let raw = truncate_input(raw);

    match mode {
        Mode::Plain => Output {
            primary_text: raw,
            primary_mode: OutputMode::Plain,
        },
        Mode::MarkdownFinal if !finished => Output {
            primary_text: raw,
            primary_mode: OutputMode::Plain,
        },
        Mode::MarkdownFinal | Mode::MarkdownStream => {
            if finished {
                if let Some(hit) = cache.get(&raw) {
                    return hit;
                }
            }
            let output = render_markdown(&raw);
            if finished {
                cache.put(raw, output.clone());
            }
            output
        }
    }
}

fn truncate_input(raw: &str) -> String {
    if raw.len() <= INPUT_CAP {
        return raw.to_string();
    }
    let mut end = INPUT_CAP;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &raw[..end], TRUNCATION_TAIL)
}

fn render_markdown(raw: &str) -> Output {
    let (closed_body, open_tail) = split_trailing_open_fence(raw);

    let mut html = String::new();
    let mut opts = Options::empty();
    opts.insert(Options::ENABLE_STRIKETHROUGH);

    let mut list_depth: Vec<Option<u64>> = Vec::new();
    let mut in_code_block = false;
    let mut code_lang = String::new();
    let mut code_buf = String::new();
    let mut link_url: Option<String> = None;
    let mut link_text = String::new();
    let mut in_link = false;

    for event in Parser::new_ext(&closed_body, opts) {
        if in_code_block {
            match event {
                Event::Text(t) => code_buf.push_str(&t),
                Event::Code(t) => code_buf.push_str(&t),
                Event::End(TagEnd::CodeBlock) => {
                    html.push_str("<pre><code");
                    if !code_lang.is_empty() {
                        html.push_str(&format!(" class=\"language-{}\"", escape_attr(&code_lang)));
                    }
                    html.push('>');
                    html.push_str(&escape_html(&code_buf));
                    html.push_str("</code></pre>");
                    in_code_block = false;
                    code_lang.clear();
                    code_buf.clear();
                }
                _ => {}
            }
            continue;
        }

        match event {
            Event::Start(Tag::CodeBlock(kind)) => {
                in_code_block = true;
                code_lang = match kind {
                    pulldown_cmark::CodeBlockKind::Fenced(lang) => lang.to_string(),
                    pulldown_cmark::CodeBlockKind::Indented => String::new(),
                };
            }
            Event::Code(t) => {
                html.push_str("<code>");
                html.push_str(&escape_html(&t));
                html.push_str("</code>");
            }
            Event::Start(Tag::Strong) => html.push_str("<b>"),
            Event::End(TagEnd::Strong) => html.push_str("</b>"),
            Event::Start(Tag::Emphasis) => html.push_str("<i>"),
            Event::End(TagEnd::Emphasis) => html.push_str("</i>"),
            Event::Start(Tag::Strikethrough) => html.push_str("<s>"),
            Event::End(TagEnd::Strikethrough) => html.push_str("</s>"),
            Event::Start(Tag::BlockQuote(_)) => html.push_str("<blockquote>"),
            Event::End(TagEnd::BlockQuote(_)) => html.push_str("</blockquote>"),
            Event::Start(Tag::Link { dest_url, .. }) => {
                in_link = true;
                link_url = Some(dest_url.to_string());
                link_text.clear();
            }
            Event::End(TagEnd::Link) => {
                in_link = false;
                let url = link_url.take().unwrap_or_default();
                if is_safe_scheme(&url) {
                    html.push_str(&format!(
                        "<a href=\"{}\">{}</a>",
                        escape_attr(&url),
                        escape_html(&link_text)
                    ));
                } else {
                    html.push_str(&escape_html(&format!("{link_text} ({url})")));
                }
            }
            Event::Start(Tag::Heading { .. }) => html.push_str("<b>"),
            Event::End(TagEnd::Heading(_)) => {
                html.push_str("</b>\n");
            }
            Event::Start(Tag::Paragraph) => {}
            Event::End(TagEnd::Paragraph) => html.push('\n'),
            Event::Start(Tag::List(start)) => list_depth.push(start),
            Event::End(TagEnd::List(_)) => {
                list_depth.pop();
            }
            Event::Start(Tag::Item) => {
                let marker = match list_depth.last_mut() {
                    Some(Some(n)) => {
                        let m = format!("{n}. ");
                        *n += 1;
                        m
                    }
                    _ => "\u{2022} ".to_string(),
                };
                html.push_str(&marker);
            }
            Event::End(TagEnd::Item) => html.push('\n'),
            Event::SoftBreak => html.push(' '),
            Event::HardBreak => html.push('\n'),
            Event::Text(t) => {
                if in_link {
                    link_text.push_str(&t);
                } else {
                    html.push_str(&escape_html(&t));
                }
            }
            _ => {}
        }
    }

    if let Some(tail) = open_tail {
        if !html.is_empty() && !html.ends_with('\n') {
            html.push('\n');
        }
        html.push_str(&escape_html(&tail));
    }

    Output {
        primary_text: html.trim_end_matches('\n').to_string(),
        primary_mode: OutputMode::Html,
    }
}

/// Walks fence markers line by line; if the document ends inside an
/// unterminated fenced block, splits off everything from the opening
/// marker onward so it can be kept raw instead of being swallowed into a
/// single to-EOF code block by the parser.
fn split_trailing_open_fence(raw: &str) -> (String, Option<String>) {
    let mut fence: Option<(char, usize)> = None;
    let mut fence_line_start = 0usize;
    let mut offset = 0usize;

    for line in raw.split_inclusive('\n') {
        let trimmed = line.trim_end_matches('\n').trim_start();
        let marker_char = trimmed.chars().next();
        let marker_len = trimmed.chars().take_while(|&c| Some(c) == marker_char).count();

        match fence {
            None => {
                if matches!(marker_char, Some('`') | Some('~')) && marker_len >= 3 {
                    fence = Some((marker_char.unwrap(), marker_len));
                    fence_line_start = offset;
                }
            }
            Some((ch, len)) => {
                if marker_char == Some(ch) && marker_len >= len && trimmed.len() == marker_len {
                    fence = None;
                }
            }
        }
        offset += line.len();
    }

    match fence {
        Some(_) => (
            raw[..fence_line_start].to_string(),
            Some(raw[fence_line_start..].to_string()),
        ),
        None => (raw.to_string(), None),
    }
}

fn is_safe_scheme(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    escape_html(s).replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> RenderCache {
        RenderCache::new()
    }

    #[test]
    fn plain_mode_never_transforms() {
        let out = render("**bold**", Mode::Plain, true, &cache());
        assert_eq!(out.primary_mode, OutputMode::Plain);
        assert_eq!(out.primary_text, "**bold**");
    }

    #[test]
    fn markdown_final_stays_raw_until_finished() {
        let out = render("**bold**", Mode::MarkdownFinal, false, &cache());
        assert_eq!(out.primary_mode, OutputMode::Plain);
        let out = render("**bold**", Mode::MarkdownFinal, true, &cache());
        assert_eq!(out.primary_mode, OutputMode::Html);
        assert!(out.primary_text.contains("<b>bold</b>"));
    }

    #[test]
    fn bold_and_italic_render_to_telegram_tags() {
        let out = render("**bold** and *italic*", Mode::MarkdownStream, false, &cache());
        assert!(out.primary_text.contains("<b>bold</b>"));
        assert!(out.primary_text.contains("<i>italic</i>"));
    }

    #[test]
    fn inline_code_is_escaped_not_reparsed() {
        let out = render("`<b>not bold</b>`", Mode::MarkdownStream, false, &cache());
        assert!(out.primary_text.contains("<code>&lt;b&gt;not bold&lt;/b&gt;</code>"));
    }

    #[test]
    fn fenced_code_block_preserves_language_class() {
        let out = render("```rust\nfn main() {}\n```", Mode::MarkdownStream, false, &cache());
        assert!(out.primary_text.contains("class=\"language-rust\""));
        assert!(out.primary_text.contains("fn main() {}"));
    }

    #[test]
    fn unclosed_fence_stays_raw_with_marker_preserved() {
        let out = render("intro\n```rust\nfn partial(", Mode::MarkdownStream, false, &cache());
        assert!(out.primary_text.contains("```rust"));
        assert!(out.primary_text.contains("fn partial("));
        assert!(!out.primary_text.contains("<pre>"));
    }

    #[test]
    fn https_link_becomes_anchor() {
        let out = render("[site](https://example.com)", Mode::MarkdownStream, false, &cache());
        assert_eq!(out.primary_text, "<a href=\"https://example.com\">site</a>");
    }

    #[test]
    fn non_http_scheme_is_left_as_literal_text() {
        let out = render("[run](javascript:alert(1))", Mode::MarkdownStream, false, &cache());
        assert!(!out.primary_text.contains("<a"));
        assert!(out.primary_text.contains("run"));
    }

    #[test]
    fn oversized_input_is_truncated_with_tail_marker() {
        let huge = "a".repeat(INPUT_CAP + 50);
        let out = render(&huge, Mode::Plain, true, &cache());
        assert!(out.primary_text.ends_with(TRUNCATION_TAIL));
    }

    #[test]
    fn finished_renders_are_served_from_cache() {
        let cache = cache();
        let first = render("**x**", Mode::MarkdownStream, true, &cache);
        let second = render("**x**", Mode::MarkdownStream, true, &cache);
        assert_eq!(first, second);
    }
}
