// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
//! Session actor, event pump, and streaming state engine (§3, §4.2-§4.6 of
//! the design spec). This crate has no chat- or backend-transport opinions
//! of its own — it is driven through [`ocrelay_backend::BackendClient`] and
//! [`chat::ChatAdapter`], both supplied by the caller.

mod actor;
mod chat;
mod error;
mod flush;
mod pump;
mod registry;
mod state;
mod task;
#[cfg(test)]
mod test_support;

pub use actor::{SessionActor, SessionActorHandle};
pub use chat::{ChatAdapter, ChatError, ChatHandle};
pub use error::SubmitError;
pub use pump::EventPump;
pub use registry::{ActorConfig, SessionRegistry};
pub use task::Task;
