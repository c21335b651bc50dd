// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
mod cache;
mod html;
mod paginate;

pub use html::{render, Mode, Output, OutputMode};
pub use paginate::paginate;

pub use cache::RenderCache;
