// Copyright (c) 2024-2026 The ocrelay Authors
//
// SPDX-License-Identifier: MIT
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ocrelay_backend::{BackendClient, PromptRequest};
use ocrelay_model::{Role, SessionEvent, SessionEventKind, SessionStatus};
use ocrelay_render::RenderCache;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;
use tracing::{error, warn};

use crate::chat::ChatAdapter;
use crate::error::SubmitError;
use crate::flush::flush;
use crate::registry::ActorConfig;
use crate::state::StreamingState;
use crate::task::Task;

/// Minimum gap between periodic flushes while a task is running (§4.3.4).
const FLUSH_THROTTLE: Duration = Duration::from_millis(350);
/// Minimum gap between reconciles triggered by the tick loop, unless forced
/// by the idle transition (§4.3.5).
const RECONCILE_MIN_INTERVAL: Duration = Duration::from_millis(1200);
/// §4.3.6 settle gap: idle plus this much quiet time with nothing pending.
const SETTLE_GAP: Duration = Duration::from_millis(1200);
/// §4.3.6 escape hatch: a task that never produced any display content.
const NO_OUTPUT_GRACE: Duration = Duration::from_secs(15);
/// §4.3.6 escape hatch: idle and quiet, but the backend never sent a
/// completion marker on the displayed message.
const NO_MARKER_GAP: Duration = Duration::from_millis(3600);

type SubmitMsg = (Task, oneshot::Sender<Result<(), SubmitError>>);

/// Cheap-to-clone handle to a running [`SessionActor`]. Held by the
/// [`crate::registry::SessionRegistry`]; never exposed beyond it.
#[derive(Clone)]
pub struct SessionActorHandle {
    submit_tx: mpsc::Sender<SubmitMsg>,
    event_tx: mpsc::Sender<SessionEvent>,
    abort_tx: mpsc::Sender<()>,
}

impl SessionActorHandle {
    /// §4.3.1/§4.1/§7: blocks until the task reaches a terminal outcome —
    /// rejected immediately as `Busy` if another task is in flight, or
    /// resolved once `prompt_async` dispatch fails, the task's deadline
    /// elapses, or it completes.
    pub async fn submit(&self, task: Task) -> Result<(), SubmitError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit_tx
            .send((task, reply_tx))
            .await
            .map_err(|_| SubmitError::ActorGone)?;
        reply_rx.await.map_err(|_| SubmitError::ActorGone)?
    }

    /// Forwards one parsed event. Drops it with a warning rather than
    /// blocking the pump indefinitely if the actor has fallen behind.
    pub async fn push_event(&self, event: SessionEvent) {
        if tokio::time::timeout(Duration::from_secs(2), self.event_tx.send(event))
            .await
            .is_err()
        {
            warn!("event push to session actor timed out, dropping event");
        }
    }

    /// §5 `/abort`: cancels the in-flight task's context, if any. A no-op if
    /// the session is idle or a cancellation is already pending.
    pub fn abort(&self) {
        let _ = self.abort_tx.try_send(());
    }

    pub fn is_closed(&self) -> bool {
        self.submit_tx.is_closed()
    }
}

/// One task-processing loop per session (§3, §4.3). Accepts at most one task
/// at a time; any `Submit` that arrives while a task is in flight is answered
/// with [`SubmitError::Busy`] immediately, not queued.
pub struct SessionActor {
    session_id: String,
    backend: Arc<dyn BackendClient>,
    chat: Arc<dyn ChatAdapter>,
    cache: Arc<RenderCache>,
    config: ActorConfig,
    submit_rx: mpsc::Receiver<SubmitMsg>,
    event_rx: mpsc::Receiver<SessionEvent>,
    abort_rx: mpsc::Receiver<()>,
}

impl SessionActor {
    pub fn spawn(
        session_id: String,
        backend: Arc<dyn BackendClient>,
        chat: Arc<dyn ChatAdapter>,
        cache: Arc<RenderCache>,
        config: ActorConfig,
    ) -> SessionActorHandle {
        let (submit_tx, submit_rx) = mpsc::channel(8);
        let (event_tx, event_rx) = mpsc::channel(2048);
        let (abort_tx, abort_rx) = mpsc::channel(1);
        let actor = Self {
            session_id,
            backend,
            chat,
            cache,
            config,
            submit_rx,
            event_rx,
            abort_rx,
        };
        tokio::spawn(actor.run());
        SessionActorHandle { submit_tx, event_tx, abort_tx }
    }

    async fn run(mut self) {
        while let Some((task, reply)) = self.submit_rx.recv().await {
            self.run_task(task, reply).await;
        }
    }

    /// Holds `reply` until the task's terminal outcome is known: `Err(Backend)`
    /// if `prompt_async` dispatch fails, `Err(Timeout)` if the task's deadline
    /// elapses first, otherwise `Ok(())` (§4.1/§7 — `PromptAsync` failure and
    /// task timeout must be surfaced to the `Submit` caller).
    async fn run_task(&mut self, task: Task, reply: oneshot::Sender<Result<(), SubmitError>>) {
        while self.abort_rx.try_recv().is_ok() {}

        let started_at = Instant::now();
        let deadline = task.deadline_from(started_at);

        let ids = self.baseline_snapshot(&task.session_id).await;
        let mut state = StreamingState::new(ids);

        let model = task.model.as_ref().map(|m| m.model.clone());
        let req = PromptRequest { text: task.prompt.clone(), agent: None, model };
        if let Err(e) = self.backend.prompt_async(&task.session_id, req).await {
            error!(session_id = %task.session_id, error = %e, "prompt submission failed");
            let _ = reply.send(Err(SubmitError::Backend(e)));
            return;
        }

        if let Err(e) = flush(
            self.chat.as_ref(),
            &task.chat_id,
            &mut state,
            self.config.render_mode,
            &self.cache,
            false,
            false,
        )
        .await
        {
            warn!(session_id = %task.session_id, error = %e, "initial flush failed");
        }

        let mut tick = tokio::time::interval(Duration::from_millis(200));
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut aborted = false;
        let outcome = loop {
            if Instant::now() >= deadline {
                warn!(session_id = %task.session_id, "task deadline exceeded");
                break Err(SubmitError::Timeout);
            }
            tokio::select! {
                biased;
                Some((_busy_task, busy_reply)) = self.submit_rx.recv() => {
                    let _ = busy_reply.send(Err(SubmitError::Busy));
                }
                Some(()) = self.abort_rx.recv() => {
                    warn!(session_id = %task.session_id, "task aborted");
                    aborted = true;
                    break Ok(());
                }
                maybe_event = self.event_rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            self.apply_event(&mut state, event);
                            state.promote();
                            if Instant::now().duration_since(state.last_update) >= FLUSH_THROTTLE {
                                if let Err(e) = flush(
                                    self.chat.as_ref(),
                                    &task.chat_id,
                                    &mut state,
                                    self.config.render_mode,
                                    &self.cache,
                                    false,
                                    state.any_event_observed,
                                )
                                .await
                                {
                                    warn!(session_id = %task.session_id, error = %e, "flush failed");
                                }
                            }
                        }
                        None => break Ok(()),
                    }
                }
                _ = tick.tick() => {
                    self.on_tick(&mut state, &task).await;
                    if self.is_complete(&state, started_at) {
                        break Ok(());
                    }
                }
            }
        };

        // §5 `/abort`: leaves already-displayed content intact, no terminal flush.
        if !aborted {
            if let Err(e) = flush(
                self.chat.as_ref(),
                &task.chat_id,
                &mut state,
                self.config.render_mode,
                &self.cache,
                true,
                state.any_event_observed,
            )
            .await
            {
                warn!(session_id = %task.session_id, error = %e, "final flush failed");
            }
        }

        let _ = reply.send(outcome);
    }

    async fn baseline_snapshot(&self, session_id: &str) -> HashSet<String> {
        match self.backend.get_messages(session_id).await {
            Ok(messages) => messages.into_iter().map(|m| m.info.id).collect(),
            Err(e) => {
                warn!(session_id, error = %e, "baseline snapshot failed, starting with an empty baseline");
                HashSet::new()
            }
        }
    }

    /// §4.3.5: pulls a fresh message/part snapshot and replays it through the
    /// same merge rules as the event stream, to recover from gaps.
    async fn reconcile(&self, state: &mut StreamingState, session_id: &str) {
        match self.backend.get_messages(session_id).await {
            Ok(messages) => {
                for m in messages {
                    if state.is_initial_message(&m.info.id) {
                        continue;
                    }
                    let id = m.info.id.clone();
                    state.upsert_message_info(m.info);
                    for part in m.parts {
                        state.upsert_part(&id, part, None);
                    }
                    state.drain_pending_parts(&id);
                }
                state.promote();
            }
            Err(e) => warn!(session_id, error = %e, "reconcile snapshot failed"),
        }
    }

    fn apply_event(&self, state: &mut StreamingState, event: SessionEvent) {
        match event.kind {
            SessionEventKind::MessageUpdated { info, .. } => {
                // §4.3.2: a user-role update only marks the request as seen;
                // otherwise (assistant/system) merge the Info.
                if info.role == Role::User {
                    state.request_observed = true;
                } else {
                    let id = info.id.clone();
                    state.upsert_message_info(info);
                    state.drain_pending_parts(&id);
                }
                state.any_event_observed = true;
                state.last_event_at = Instant::now();
            }
            SessionEventKind::MessagePartUpdated { part, delta, .. } => {
                let message_id = part.message_id.clone();
                state.upsert_part(&message_id, part, delta);
                state.any_event_observed = true;
                state.last_event_at = Instant::now();
            }
            SessionEventKind::SessionStatusChanged { status, .. } => {
                if state.session_status == SessionStatus::Busy && status == SessionStatus::Idle {
                    state.saw_idle_after_busy = true;
                }
                if status == SessionStatus::Busy {
                    state.idle_reconcile_done = false;
                }
                state.session_status = status;
                state.any_event_observed = true;
                state.last_event_at = Instant::now();
            }
            SessionEventKind::Heartbeat | SessionEventKind::Other(_) => {}
        }
    }

    async fn on_tick(&self, state: &mut StreamingState, task: &Task) {
        let now = Instant::now();
        let gap_suspected = state.request_observed
            && (state.display_order().is_empty() || !state.pending_parts_empty());
        let rate_ok = state
            .last_reconcile_at
            .map_or(true, |t| now.duration_since(t) >= RECONCILE_MIN_INTERVAL);
        let idle_forced = state.session_status == SessionStatus::Idle && !state.idle_reconcile_done;

        if idle_forced || (gap_suspected && rate_ok) {
            self.reconcile(state, &task.session_id).await;
            state.last_reconcile_at = Some(now);
            if idle_forced {
                state.idle_reconcile_done = true;
            }
        }

        if now.duration_since(state.last_update) >= FLUSH_THROTTLE {
            if let Err(e) = flush(
                self.chat.as_ref(),
                &task.chat_id,
                state,
                self.config.render_mode,
                &self.cache,
                false,
                state.any_event_observed,
            )
            .await
            {
                warn!(session_id = %task.session_id, error = %e, "periodic flush failed");
            }
        }
    }

    /// §4.3.6: the settle condition plus its two escape hatches.
    fn is_complete(&self, state: &StreamingState, started_at: Instant) -> bool {
        let now = Instant::now();
        let idle = state.session_status == SessionStatus::Idle;

        let settled = idle
            && state.saw_idle_after_busy
            && now.duration_since(state.last_event_at) >= SETTLE_GAP
            && state.pending_parts_empty()
            && !state.display_order().is_empty()
            && state.all_displayed_complete();
        if settled {
            return true;
        }

        let idle_no_output_grace_elapsed = state.display_order().is_empty()
            && state.request_observed
            && now.duration_since(started_at) >= NO_OUTPUT_GRACE;
        if idle_no_output_grace_elapsed {
            return true;
        }

        idle
            && state.saw_idle_after_busy
            && now.duration_since(state.last_event_at) >= NO_MARKER_GAP
            && !state.display_order().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use ocrelay_backend::MockBackendClient;

    use crate::registry::ActorConfig;
    use crate::task::Task;
    use crate::test_support::{
        message_info, message_updated, part_updated, text_part, PromptFailingBackend, RecordingChatAdapter,
    };

    use super::*;

    fn config() -> ActorConfig {
        ActorConfig {
            render_mode: ocrelay_render::Mode::Plain,
            configured_timeout: Duration::from_secs(30),
        }
    }

    fn bare_actor(backend: Arc<dyn BackendClient>, chat: Arc<dyn ChatAdapter>) -> SessionActor {
        let (_submit_tx, submit_rx) = mpsc::channel(8);
        let (_event_tx, event_rx) = mpsc::channel(16);
        let (_abort_tx, abort_rx) = mpsc::channel(1);
        SessionActor {
            session_id: "s1".to_string(),
            backend,
            chat,
            cache: Arc::new(RenderCache::new()),
            config: config(),
            submit_rx,
            event_rx,
            abort_rx,
        }
    }

    /// §4.3.2: a user-role update must not be merged into the display —
    /// only assistant/system updates are (comment review finding #8).
    #[test]
    fn apply_event_user_role_only_marks_request_observed() {
        let actor = bare_actor(
            Arc::new(MockBackendClient::new()),
            Arc::new(RecordingChatAdapter::new()),
        );
        let mut state = StreamingState::new(HashSet::new());
        let event = message_updated("s1", message_info("m1", "s1", Role::User));

        actor.apply_event(&mut state, event);

        assert!(state.request_observed);
        assert!(state.any_event_observed);
        assert!(state.message("m1").is_none());
    }

    #[test]
    fn apply_event_assistant_role_merges_info() {
        let actor = bare_actor(
            Arc::new(MockBackendClient::new()),
            Arc::new(RecordingChatAdapter::new()),
        );
        let mut state = StreamingState::new(HashSet::new());
        let event = message_updated("s1", message_info("m1", "s1", Role::Assistant));

        actor.apply_event(&mut state, event);

        assert!(!state.request_observed);
        assert!(state.any_event_observed);
        assert!(state.message("m1").is_some());
    }

    #[test]
    fn apply_event_part_update_sets_any_event_observed() {
        let actor = bare_actor(
            Arc::new(MockBackendClient::new()),
            Arc::new(RecordingChatAdapter::new()),
        );
        let mut state = StreamingState::new(HashSet::new());
        state.upsert_message_info(message_info("m1", "s1", Role::Assistant));

        let event = part_updated("s1", text_part("p1", "m1", "partial"), None);
        actor.apply_event(&mut state, event);

        assert!(state.any_event_observed);
        assert_eq!(state.message("m1").unwrap().part_order.len(), 1);
    }

    /// §8 Scenario 6: replaying the same cumulative snapshot twice through
    /// `reconcile` must not duplicate parts.
    #[tokio::test]
    async fn reconcile_replays_cumulative_snapshot_without_duplication() {
        let backend = Arc::new(MockBackendClient::new());
        backend.seed_messages(
            "s1",
            vec![ocrelay_backend::Message {
                info: message_info("m1", "s1", Role::Assistant),
                parts: vec![text_part("p1", "m1", "hello world")],
            }],
        );
        let actor = bare_actor(backend, Arc::new(RecordingChatAdapter::new()));
        let mut state = StreamingState::new(HashSet::new());

        actor.reconcile(&mut state, "s1").await;
        actor.reconcile(&mut state, "s1").await;

        assert_eq!(state.message("m1").unwrap().part_order.len(), 1);
    }

    /// §4.1/§7: a `prompt_async` dispatch failure must surface as
    /// `SubmitError::Backend` to the `Submit` caller, not be swallowed
    /// (review finding #1).
    #[tokio::test]
    async fn prompt_dispatch_failure_surfaces_to_submit_caller() {
        let handle = SessionActor::spawn(
            "s1".to_string(),
            Arc::new(PromptFailingBackend::new()),
            Arc::new(RecordingChatAdapter::new()),
            Arc::new(RenderCache::new()),
            config(),
        );
        let task = Task {
            trace_id: "t1".to_string(),
            session_id: "s1".to_string(),
            chat_id: "c1".to_string(),
            prompt: "hello".to_string(),
            model: None,
            configured_timeout: Duration::from_secs(30),
        };

        let err = handle.submit(task).await.unwrap_err();
        assert!(matches!(err, SubmitError::Backend(_)));
    }

    /// §5 `/abort`: cancels the in-flight task and resolves `Submit` with
    /// `Ok(())` rather than leaving the caller waiting (review finding #4).
    #[tokio::test]
    async fn abort_cancels_in_flight_task_without_error() {
        let handle = SessionActor::spawn(
            "s1".to_string(),
            Arc::new(MockBackendClient::new()),
            Arc::new(RecordingChatAdapter::new()),
            Arc::new(RenderCache::new()),
            config(),
        );
        let task = Task {
            trace_id: "t1".to_string(),
            session_id: "s1".to_string(),
            chat_id: "c1".to_string(),
            prompt: "hello".to_string(),
            model: None,
            configured_timeout: Duration::from_secs(30),
        };

        let submitter = handle.clone();
        let submit_fut = tokio::spawn(async move { submitter.submit(task).await });
        // Give run_task a moment to dispatch and enter its select loop before
        // the abort signal arrives.
        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.abort();

        let outcome = submit_fut.await.unwrap();
        assert!(outcome.is_ok());
    }

    /// §4.3.1: a second `Submit` while a task is in flight is rejected with
    /// `Busy` rather than queued.
    #[tokio::test]
    async fn second_submit_while_busy_is_rejected() {
        let handle = SessionActor::spawn(
            "s1".to_string(),
            Arc::new(MockBackendClient::new()),
            Arc::new(RecordingChatAdapter::new()),
            Arc::new(RenderCache::new()),
            config(),
        );
        let task = |prompt: &str| Task {
            trace_id: "t1".to_string(),
            session_id: "s1".to_string(),
            chat_id: "c1".to_string(),
            prompt: prompt.to_string(),
            model: None,
            configured_timeout: Duration::from_secs(30),
        };

        let first = handle.clone();
        let first_fut = tokio::spawn(async move { first.submit(task("first")).await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let busy_err = handle.submit(task("second")).await.unwrap_err();
        assert!(matches!(busy_err, SubmitError::Busy));

        handle.abort();
        let _ = first_fut.await;
    }
}
