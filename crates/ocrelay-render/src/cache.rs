// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use lru::LruCache;

use crate::html::Output;

const CAPACITY: usize = 100;
const TTL: Duration = Duration::from_secs(5 * 60);

/// §4.5: a small LRU cache memoizing non-streaming renders, keyed by raw
/// source text. Entries older than `TTL` are treated as absent.
pub struct RenderCache {
    inner: Mutex<LruCache<String, (Output, Instant)>>,
}

impl Default for RenderCache {
    fn default() -> Self {
        Self {
            inner: Mutex::new(LruCache::new(NonZeroUsize::new(CAPACITY).unwrap())),
        }
    }
}

impl RenderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<Output> {
        let mut guard = self.inner.lock().unwrap();
        match guard.get(key) {
            Some((output, stamped)) if stamped.elapsed() < TTL => Some(output.clone()),
            Some(_) => {
                guard.pop(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: String, output: Output) {
        self.inner.lock().unwrap().put(key, (output, Instant::now()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html::OutputMode;

    fn out(text: &str) -> Output {
        Output {
            primary_text: text.to_string(),
            primary_mode: OutputMode::Html,
        }
    }

    #[test]
    fn put_then_get_round_trips() {
        let cache = RenderCache::new();
        cache.put("hello".into(), out("<b>hello</b>"));
        assert_eq!(cache.get("hello").unwrap().primary_text, "<b>hello</b>");
    }

    #[test]
    fn miss_returns_none() {
        let cache = RenderCache::new();
        assert!(cache.get("missing").is_none());
    }
}
