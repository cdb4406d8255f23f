use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use stagecast_core::{config::QueueConfig, BroadcastSink, Metadata};
use stagecast_protocol::notifications::{EndNotice, StartNotice};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::{
    error::{HandlerError, QueueError, Result},
    presentation::{presentation, Presentation},
    types::{Event, EventKind, HoldDurations, QueueStatus, DEFAULT_PRIORITY},
};

/// Upper bound on one idle wait; producers wake the worker earlier.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

struct QueueState {
    items: VecDeque<Event>,
    next_seq: u64,
    /// Set by `stop()`; enqueues fail from here on.
    closed: bool,
    /// Set once the worker has consumed the sentinel.
    drained: bool,
    processing: bool,
    /// Set by `start()` and cleared by the worker itself on exit.
    running: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    notify: Notify,
    sink: Arc<dyn BroadcastSink>,
    holds: HoldDurations,
    gap: Duration,
    /// Signalled once the worker has cleared `running`.
    exited: Notify,
}

/// Broadcast scheduler: many producers, one consumer, one event on screen at
/// a time.
///
/// Producers call [`enqueue`](Self::enqueue) from any task or thread. A single
/// worker drains the queue strictly in acceptance order; for each event it
/// emits a start notification, holds for the kind's display duration, then
/// emits the end notification. Cloning yields another handle to the same queue.
#[derive(Clone)]
pub struct EventQueue {
    shared: Arc<Shared>,
}

impl EventQueue {
    /// Build a queue paced by `config`. The worker is not running until
    /// [`start`](Self::start).
    pub fn new(config: &QueueConfig, sink: Arc<dyn BroadcastSink>) -> Self {
        Self::with_timings(HoldDurations::from(config), config.inter_event_gap(), sink)
    }

    pub fn with_timings(holds: HoldDurations, gap: Duration, sink: Arc<dyn BroadcastSink>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    items: VecDeque::new(),
                    next_seq: 1,
                    closed: false,
                    drained: false,
                    processing: false,
                    running: false,
                }),
                notify: Notify::new(),
                sink,
                holds,
                gap,
                exited: Notify::new(),
            }),
        }
    }

    /// Append an event with the default priority. Returns its id.
    pub fn enqueue(&self, kind: EventKind, payload: Metadata) -> Result<String> {
        self.enqueue_with_priority(kind, payload, DEFAULT_PRIORITY)
    }

    /// Append an event to the tail. Never blocks; fails only once the queue
    /// is closed.
    ///
    /// `priority` is recorded on the event but does not affect ordering.
    pub fn enqueue_with_priority(
        &self,
        kind: EventKind,
        payload: Metadata,
        priority: i32,
    ) -> Result<String> {
        if kind == EventKind::Stop {
            return Err(QueueError::ReservedKind(kind));
        }
        let id = {
            let mut state = self.shared.lock_state();
            if state.closed {
                return Err(QueueError::Closed);
            }
            let event = state.admit(kind, payload, priority);
            let id = event.id.clone();
            state.items.push_back(event);
            id
        };
        self.shared.notify.notify_one();
        info!(event_id = %id, %kind, priority, "event enqueued");
        Ok(id)
    }

    /// Spawn the worker unless one is already running. Must be called from
    /// within a Tokio runtime.
    pub fn start(&self) {
        {
            let mut state = self.shared.lock_state();
            if state.drained {
                warn!("event queue already drained after stop; worker not restarted");
                return;
            }
            if state.running {
                return;
            }
            state.running = true;
        }
        tokio::spawn(run(Arc::clone(&self.shared)));
        info!("event queue worker spawned");
    }

    /// Close the queue and append the shutdown sentinel behind every event
    /// accepted so far. Idempotent.
    pub fn stop(&self) {
        {
            let mut state = self.shared.lock_state();
            if state.closed {
                return;
            }
            state.closed = true;
            let sentinel = state.admit(EventKind::Stop, Metadata::new(), i32::MAX);
            state.items.push_back(sentinel);
        }
        self.shared.notify.notify_one();
        info!("event queue stop requested");
    }

    /// `stop()`, then wait until the worker has drained through the sentinel.
    pub async fn shutdown(&self) {
        self.stop();
        self.start();
        loop {
            let exited = self.shared.exited.notified();
            tokio::pin!(exited);
            exited.as_mut().enable();
            if !self.shared.lock_state().running {
                return;
            }
            exited.await;
        }
    }

    /// Drop every event still waiting to be dispatched. The shutdown
    /// sentinel, if queued, stays. Returns how many events were dropped.
    pub fn clear(&self) -> usize {
        let dropped = {
            let mut state = self.shared.lock_state();
            let before = state.items.len();
            state.items.retain(|e| e.kind == EventKind::Stop);
            before - state.items.len()
        };
        info!(dropped, "event queue cleared");
        dropped
    }

    pub fn status(&self) -> QueueStatus {
        let state = self.shared.lock_state();
        QueueStatus {
            queue_depth: state.items.len(),
            processing: state.processing,
            worker_alive: state.running,
        }
    }
}

impl QueueState {
    /// Stamp a new event. Must run under the state lock so that `seq`
    /// reflects acceptance order.
    fn admit(&mut self, kind: EventKind, payload: Metadata, priority: i32) -> Event {
        let seq = self.next_seq;
        self.next_seq += 1;
        Event {
            id: format!("{kind}-{seq}"),
            seq,
            kind,
            payload,
            enqueued_at: Utc::now(),
            priority,
        }
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pop(&self) -> Option<Event> {
        let mut state = self.lock_state();
        let event = state.items.pop_front()?;
        match event.kind {
            EventKind::Stop => state.drained = true,
            _ => state.processing = true,
        }
        Some(event)
    }

    /// Next event, waiting at most [`POLL_INTERVAL`] when the queue is empty.
    async fn next_event(&self) -> Option<Event> {
        if let Some(event) = self.pop() {
            return Some(event);
        }
        let _ = tokio::time::timeout(POLL_INTERVAL, self.notify.notified()).await;
        self.pop()
    }

    fn set_processing(&self, processing: bool) {
        self.lock_state().processing = processing;
    }

    /// Put one event on screen and take it down again.
    ///
    /// Errors are logged and never cut the lifecycle short: the hold and the
    /// end notification happen even when the start notification failed.
    async fn present(&self, event: &Event) {
        let Some(presentation) = presentation(event.kind) else {
            return;
        };
        let hold = self.holds.for_kind(event.kind);
        info!(
            event_id = %event.id,
            kind = %event.kind,
            hold_ms = hold.as_millis() as u64,
            "presenting event"
        );

        if let Err(e) = self.announce(event, &presentation, hold) {
            error!(event_id = %event.id, kind = %event.kind, error = %e, "start notification failed");
        }

        if !hold.is_zero() {
            tokio::time::sleep(hold).await;
        }

        if let Some(end) = presentation.end {
            let result = serde_json::to_value(EndNotice { id: event.id.clone() })
                .map_err(HandlerError::from)
                .and_then(|payload| self.emit(end, payload, presentation.room));
            if let Err(e) = result {
                error!(event_id = %event.id, kind = %event.kind, error = %e, "end notification failed");
            }
        }
        debug!(event_id = %event.id, "event presentation finished");
    }

    fn announce(
        &self,
        event: &Event,
        presentation: &Presentation,
        hold: Duration,
    ) -> std::result::Result<(), HandlerError> {
        let notice = StartNotice {
            id: event.id.clone(),
            kind: event.kind.to_string(),
            payload: Value::Object(event.payload.clone()),
            display_duration_ms: hold.as_millis() as u64,
            priority: event.priority,
            enqueued_at: event.enqueued_at,
        };
        self.emit(presentation.start, serde_json::to_value(notice)?, presentation.room)?;

        if let Some(generic) = presentation.generic {
            let mut payload = event.payload.clone();
            payload.insert("id".to_string(), json!(event.id));
            self.emit(generic, Value::Object(payload), None)?;
        }
        Ok(())
    }

    /// Hand one notification to the sink, containing any panic inside it.
    fn emit(
        &self,
        name: &str,
        payload: Value,
        scope: Option<&str>,
    ) -> std::result::Result<(), HandlerError> {
        match std::panic::catch_unwind(AssertUnwindSafe(|| self.sink.emit(name, payload, scope))) {
            Ok(result) => result.map_err(HandlerError::from),
            Err(_) => Err(HandlerError::Panicked {
                event: name.to_string(),
            }),
        }
    }
}

/// Clears `running` when the worker task ends, however it ends.
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("event queue worker terminated abnormally");
        }
        {
            let mut state = self.0.lock_state();
            state.running = false;
            state.processing = false;
        }
        self.0.exited.notify_waiters();
    }
}

/// Worker loop. Exits only after consuming the shutdown sentinel.
async fn run(shared: Arc<Shared>) {
    let _exit = ExitGuard(Arc::clone(&shared));
    info!("event queue worker started");
    loop {
        let Some(event) = shared.next_event().await else {
            continue;
        };
        if event.kind == EventKind::Stop {
            info!(event_id = %event.id, "shutdown sentinel reached");
            break;
        }

        shared.present(&event).await;

        if !shared.gap.is_zero() {
            tokio::time::sleep(shared.gap).await;
        }
        shared.set_processing(false);
    }
    info!("event queue worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use stagecast_core::NullSink;

    fn queue() -> EventQueue {
        EventQueue::with_timings(HoldDurations::ZERO, Duration::ZERO, Arc::new(NullSink))
    }

    #[test]
    fn ids_are_type_prefixed_and_monotonic() {
        let q = queue();
        let a = q.enqueue(EventKind::Message, Metadata::new()).unwrap();
        let b = q.enqueue(EventKind::Poll, Metadata::new()).unwrap();
        let c = q.enqueue(EventKind::Screenshot, Metadata::new()).unwrap();
        assert_eq!(a, "message-1");
        assert_eq!(b, "poll-2");
        assert_eq!(c, "screenshot-3");
    }

    #[test]
    fn status_reports_depth_without_worker() {
        let q = queue();
        q.enqueue(EventKind::Message, Metadata::new()).unwrap();
        q.enqueue(EventKind::Message, Metadata::new()).unwrap();
        assert_eq!(
            q.status(),
            QueueStatus {
                queue_depth: 2,
                processing: false,
                worker_alive: false,
            }
        );
    }

    #[test]
    fn enqueue_after_stop_is_rejected() {
        let q = queue();
        q.stop();
        let err = q.enqueue(EventKind::Message, Metadata::new()).unwrap_err();
        assert!(matches!(err, QueueError::Closed));
        assert_eq!(err.code(), "QUEUE_CLOSED");
    }

    #[test]
    fn producers_cannot_enqueue_the_sentinel() {
        let q = queue();
        let err = q.enqueue(EventKind::Stop, Metadata::new()).unwrap_err();
        assert!(matches!(err, QueueError::ReservedKind(EventKind::Stop)));
        assert_eq!(q.status().queue_depth, 0);
    }

    #[test]
    fn stop_is_idempotent() {
        let q = queue();
        q.enqueue(EventKind::Message, Metadata::new()).unwrap();
        q.stop();
        q.stop();
        // one event plus exactly one sentinel
        assert_eq!(q.status().queue_depth, 2);
    }

    #[test]
    fn clear_drops_pending_events_but_keeps_sentinel() {
        let q = queue();
        for _ in 0..3 {
            q.enqueue(EventKind::Poll, Metadata::new()).unwrap();
        }
        q.stop();
        assert_eq!(q.clear(), 3);
        assert_eq!(q.status().queue_depth, 1);
    }

    #[test]
    fn priority_is_recorded_on_the_event() {
        let q = queue();
        q.enqueue_with_priority(EventKind::Message, Metadata::new(), 7)
            .unwrap();
        let state = q.shared.lock_state();
        assert_eq!(state.items[0].priority, 7);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let q = queue();
        q.start();
        q.start();
        assert!(q.status().worker_alive);
        q.shutdown().await;
        assert!(!q.status().worker_alive);
    }

    #[tokio::test]
    async fn start_after_drain_is_a_no_op() {
        let q = queue();
        q.start();
        q.shutdown().await;
        q.start();
        assert!(!q.status().worker_alive);
    }

    #[tokio::test]
    async fn start_during_drain_keeps_the_single_worker() {
        let q = queue();
        q.start();
        q.stop();
        q.start();
        assert!(q.status().worker_alive);
        q.shutdown().await;
        let state = q.shared.lock_state();
        assert!(!state.running);
        assert!(state.drained);
    }

    #[tokio::test]
    async fn shutdown_without_start_still_drains() {
        let q = queue();
        q.enqueue(EventKind::Message, Metadata::new()).unwrap();
        q.shutdown().await;
        assert_eq!(q.status().queue_depth, 0);
        assert!(!q.status().processing);
    }
}
