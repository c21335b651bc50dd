// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
//! §4.6. Operates on the already-rendered text for one flush (HTML or
//! plain). "Code-block granularity" means never splitting inside a
//! `<pre>...</pre>` span; the re-render/verify step of the original
//! algorithm collapses to a direct length check since the input here is
//! already in its final, platform-bound form.

const INITIAL_TARGET: usize = 3000;
const HARD_LIMIT: usize = 4096;
const MIDPOINT_WINDOW: usize = 300;
const TRUNCATION_NOTE: &str = "\n\n... (response too long, truncated)";

/// Splits `rendered` into at most `max_chunks` pieces, each guaranteed to be
/// no longer than the platform's hard limit.
pub fn paginate(rendered: &str, max_chunks: usize) -> Vec<String> {
    let mut chunks = initial_split(rendered);

    let mut idx = 0;
    while idx < chunks.len() {
        if chunks[idx].len() > HARD_LIMIT {
            let piece = chunks.remove(idx);
            let (left, right) = split_near_midpoint(&piece);
            chunks.insert(idx, right);
            chunks.insert(idx, left);
            continue;
        }
        idx += 1;
    }

    if chunks.len() > max_chunks {
        chunks.truncate(max_chunks);
        if let Some(last) = chunks.last_mut() {
            let budget = HARD_LIMIT.saturating_sub(TRUNCATION_NOTE.len());
            if last.len() > budget {
                let mut end = budget;
                while !last.is_char_boundary(end) {
                    end -= 1;
                }
                last.truncate(end);
            }
            last.push_str(TRUNCATION_NOTE);
        }
    }

    chunks
}

/// First pass: accumulate lines into chunks around `INITIAL_TARGET` chars,
/// never closing a chunk while inside an open `<pre>` span, and hard-splitting
/// any single line longer than the target.
fn initial_split(text: &str) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut pre_depth: i32 = 0;

    for raw_line in text.split_inclusive('\n') {
        let mut line = raw_line;
        while line.len() > INITIAL_TARGET {
            let mut cut = INITIAL_TARGET;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            current.push_str(&line[..cut]);
            chunks.push(std::mem::take(&mut current));
            line = &line[cut..];
        }

        let would_be = current.len() + line.len();
        if would_be > INITIAL_TARGET && !current.is_empty() && pre_depth == 0 {
            chunks.push(std::mem::take(&mut current));
        }

        pre_depth += pre_depth_delta(line);
        if pre_depth < 0 {
            pre_depth = 0;
        }
        current.push_str(line);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    if chunks.is_empty() {
        chunks.push(String::new());
    }
    chunks
}

fn pre_depth_delta(line: &str) -> i32 {
    let opens = line.matches("<pre").count() as i32;
    let closes = line.matches("</pre>").count() as i32;
    opens - closes
}

fn split_near_midpoint(chunk: &str) -> (String, String) {
    let mid = chunk.len() / 2;
    let window_start = mid.saturating_sub(MIDPOINT_WINDOW);
    let window_end = (mid + MIDPOINT_WINDOW).min(chunk.len());

    let mut best: Option<usize> = None;
    for (i, _) in chunk.match_indices('\n') {
        if i >= window_start && i <= window_end {
            match best {
                Some(b) if (b as isize - mid as isize).abs() <= (i as isize - mid as isize).abs() => {}
                _ => best = Some(i),
            }
        }
    }

    let split_at = best.unwrap_or_else(|| {
        let mut p = mid;
        while p > 0 && !chunk.is_char_boundary(p) {
            p -= 1;
        }
        p
    });

    let split_at = split_at.max(1).min(chunk.len().saturating_sub(1).max(1));
    let mut p = split_at;
    while !chunk.is_char_boundary(p) {
        p -= 1;
    }
    (chunk[..p].to_string(), chunk[p..].to_string())
}
