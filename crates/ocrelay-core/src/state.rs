// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Instant;

use ocrelay_model::{MessageInfo, Part, Role, SessionStatus};

use crate::chat::ChatHandle;

/// Tracked state for one message discovered during the current task:
/// its merged `Info` plus parts in arrival order (§3).
#[derive(Debug, Clone)]
pub struct EventMessageState {
    pub info: MessageInfo,
    pub part_order: Vec<String>,
    pub parts: HashMap<String, Part>,
}

impl EventMessageState {
    fn new(info: MessageInfo) -> Self {
        Self {
            info,
            part_order: Vec::new(),
            parts: HashMap::new(),
        }
    }
}

/// Outcome of applying one part update, used by the actor to decide whether
/// a flush is warranted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Applied,
    NoOp,
    Buffered,
    Ignored,
}

/// The central invariant-bearing record for one in-flight task (§3, §4.4).
pub struct StreamingState {
    initial_message_ids: HashSet<String>,

    event_messages: HashMap<String, EventMessageState>,
    pending_event_parts: HashMap<String, Vec<(Part, Option<String>)>>,

    display_order: Vec<String>,
    display_set: HashSet<String>,
    pending_order: VecDeque<String>,
    pending_set: HashSet<String>,
    active_message_id: Option<String>,

    pub request_observed: bool,
    pub any_event_observed: bool,
    pub saw_idle_after_busy: bool,
    pub session_status: SessionStatus,

    pub last_event_at: Instant,
    pub last_update: Instant,
    pub started_at: Instant,

    pub chat_handles: Vec<ChatHandle>,
    pub last_rendered: Vec<String>,

    pub revision: u64,

    pub last_reconcile_at: Option<Instant>,
    pub idle_reconcile_done: bool,
}

impl StreamingState {
    pub fn new(initial_message_ids: HashSet<String>) -> Self {
        let now = Instant::now();
        Self {
            initial_message_ids,
            event_messages: HashMap::new(),
            pending_event_parts: HashMap::new(),
            display_order: Vec::new(),
            display_set: HashSet::new(),
            pending_order: VecDeque::new(),
            pending_set: HashSet::new(),
            active_message_id: None,
            request_observed: false,
            any_event_observed: false,
            saw_idle_after_busy: false,
            session_status: SessionStatus::Busy,
            last_event_at: now,
            last_update: now,
            started_at: now,
            chat_handles: Vec::new(),
            last_rendered: Vec::new(),
            revision: 0,
            last_reconcile_at: None,
            idle_reconcile_done: false,
        }
    }

    pub fn is_initial_message(&self, id: &str) -> bool {
        self.initial_message_ids.contains(id)
    }

    pub fn display_order(&self) -> &[String] {
        &self.display_order
    }

    pub fn pending_parts_empty(&self) -> bool {
        self.pending_event_parts.is_empty()
    }

    pub fn message(&self, id: &str) -> Option<&EventMessageState> {
        self.event_messages.get(id)
    }

    pub fn all_displayed_complete(&self) -> bool {
        self.display_order
            .iter()
            .all(|id| self.event_messages.get(id).is_some_and(|m| m.info.is_complete()))
    }

    /// §4.3.2 step for `message.updated`: merges into the tracked set (or
    /// creates it) and, for a brand-new assistant message, enqueues it behind
    /// the active one if any (§4.3.3 Promote). Returns `false` if the id is
    /// part of the task's immutable baseline.
    pub fn upsert_message_info(&mut self, info: MessageInfo) -> bool {
        if self.initial_message_ids.contains(&info.id) {
            return false;
        }
        let id = info.id.clone();
        let changed = match self.event_messages.get_mut(&id) {
            Some(existing) => {
                let before = existing.info.clone();
                existing.info.merge_from(&info);
                before != existing.info
            }
            None => {
                let is_assistant = info.role == Role::Assistant;
                self.event_messages.insert(id.clone(), EventMessageState::new(info));
                if is_assistant
                    && self.active_message_id.is_some()
                    && !self.display_set.contains(&id)
                    && !self.pending_set.contains(&id)
                {
                    self.pending_order.push_back(id.clone());
                    self.pending_set.insert(id.clone());
                }
                true
            }
        };
        if changed {
            self.revision += 1;
        }
        changed
    }

    /// §4.3.2 / §4.4.3: upserts one part. If the owning message hasn't been
    /// seen via `message.updated` yet, the update is buffered and replayed
    /// once the message appears.
    pub fn upsert_part(&mut self, message_id: &str, mut incoming: Part, delta: Option<String>) -> UpsertOutcome {
        if incoming.id.is_empty() {
            incoming.id = Part::fallback_id(&incoming.kind);
        }
        if !self.event_messages.contains_key(message_id) {
            if self.initial_message_ids.contains(message_id) {
                return UpsertOutcome::Ignored;
            }
            self.pending_event_parts
                .entry(message_id.to_string())
                .or_default()
                .push((incoming, delta));
            return UpsertOutcome::Buffered;
        }
        let outcome = apply_part_update(self.event_messages.get_mut(message_id).unwrap(), incoming, delta);
        if outcome == UpsertOutcome::Applied {
            self.revision += 1;
        }
        outcome
    }

    /// Replays any parts buffered before their owning message's `info` arrived.
    pub fn drain_pending_parts(&mut self, message_id: &str) {
        let Some(buffered) = self.pending_event_parts.remove(message_id) else {
            return;
        };
        if let Some(msg) = self.event_messages.get_mut(message_id) {
            for (part, delta) in buffered {
                if apply_part_update(msg, part, delta) == UpsertOutcome::Applied {
                    self.revision += 1;
                }
            }
        }
    }

    /// §4.3.3: promotes assistant messages one at a time, popping the pending
    /// queue as each active message completes.
    pub fn promote(&mut self) {
        loop {
            if let Some(active_id) = self.active_message_id.clone() {
                let Some(active) = self.event_messages.get(&active_id) else {
                    break;
                };
                if !active.info.is_complete() {
                    break;
                }
                if let Some(next_id) = self.pending_order.pop_front() {
                    self.pending_set.remove(&next_id);
                    self.activate(next_id);
                    continue;
                }
                self.active_message_id = None;
                continue;
            }

            let next = self
                .event_messages
                .iter()
                .filter(|(id, m)| m.info.role == Role::Assistant && !self.display_set.contains(*id))
                .min_by_key(|(_, m)| m.info.created)
                .map(|(id, _)| id.clone());

            match next {
                Some(id) => self.activate(id),
                None => break,
            }
        }
    }

    fn activate(&mut self, id: String) {
        self.display_order.push(id.clone());
        self.display_set.insert(id.clone());
        self.active_message_id = Some(id);
    }
}

fn apply_part_update(msg: &mut EventMessageState, incoming: Part, delta: Option<String>) -> UpsertOutcome {
    let Some(existing) = msg.parts.get(&incoming.id).cloned() else {
        msg.part_order.push(incoming.id.clone());
        msg.parts.insert(incoming.id.clone(), incoming);
        return UpsertOutcome::Applied;
    };

    let mut candidate = incoming.clone();
    candidate.text = match delta {
        Some(d) => {
            if !existing.text.is_empty() && existing.text.ends_with(d.as_str()) {
                existing.text.clone()
            } else {
                format!("{}{}", existing.text, d)
            }
        }
        None => {
            let snapshot = incoming.text.clone();
            if existing.text.is_empty() || snapshot.starts_with(&existing.text) {
                snapshot
            } else if existing.text.starts_with(&snapshot) {
                existing.text.clone()
            } else {
                snapshot
            }
        }
    };

    if candidate.content_eq(&existing) {
        return UpsertOutcome::NoOp;
    }
    msg.parts.insert(candidate.id.clone(), candidate);
    UpsertOutcome::Applied
}
