// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
mod loader;
mod schema;

pub use loader::load;
pub use schema::*;
