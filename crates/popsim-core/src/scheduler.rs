//! Event queue, processor table, and the drain loop.
//!
//! Pending events live in one ordered map keyed by
//! `(scheduled_time, Reverse(priority), insertion_seq)`, so the first entry
//! is always the next event to dispatch and ties resolve in insertion
//! order. [`EventScheduler::process_events`] pops that first entry, runs
//! it through every processor registered for its kind, and then looks at
//! the head again. Because the head is re-read after every dispatch,
//! events scheduled by a processor during the drain are picked up in the
//! same pass when they are already due.
//!
//! # Locking
//!
//! The queue and the processor table each have their own lock, and neither
//! is held while a processor runs. Processors can therefore schedule or
//! cancel events, and other threads can schedule concurrently with an
//! in-progress drain.

use std::any::Any;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use chrono::NaiveDateTime;
use popsim_types::{Event, EventId, EventKind};
use tracing::{debug, error, warn};

use crate::processor::{DispatchContext, EventProcessor};

/// Default cap on events dispatched by a single drain.
pub const DEFAULT_MAX_EVENTS_PER_DRAIN: usize = 100_000;

/// Errors returned synchronously by [`EventScheduler::schedule_event`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulingError {
    /// The event was cancelled before it was scheduled.
    #[error("event {id} is cancelled")]
    Cancelled {
        /// The rejected event.
        id: EventId,
    },

    /// The event has already been dispatched.
    #[error("event {id} was already processed")]
    AlreadyProcessed {
        /// The rejected event.
        id: EventId,
    },

    /// An event with the same id is already pending.
    #[error("event {id} is already scheduled")]
    DuplicateEvent {
        /// The rejected event.
        id: EventId,
    },
}

/// Errors that abort a drain. Individual processor failures never do.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrainError {
    /// More events became due in one drain than the configured cap,
    /// usually a processor scheduling itself in a loop.
    #[error("drain aborted after {dispatched} events (limit {limit}); {remaining} due events left queued")]
    CascadeLimitExceeded {
        /// The configured cap.
        limit: usize,
        /// Events dispatched before the abort.
        dispatched: usize,
        /// Pending events left in the queue.
        remaining: usize,
    },
}

/// Outcome of one drain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Events handed to their processors.
    pub dispatched: usize,
    /// Cancelled events popped and dropped without dispatch.
    pub skipped_cancelled: usize,
    /// Processor invocations that returned an error or panicked.
    pub processor_failures: usize,
    /// Dispatched events per kind.
    pub by_kind: BTreeMap<EventKind, usize>,
}

impl DrainReport {
    /// Whether the drain did nothing at all.
    pub fn is_empty(&self) -> bool {
        self.dispatched == 0 && self.skipped_cancelled == 0
    }
}

/// Ordering key of a pending event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    time: NaiveDateTime,
    priority: Reverse<i32>,
    seq: u64,
}

/// Pending events plus an id index for cancellation.
#[derive(Debug, Default)]
struct EventQueue {
    entries: BTreeMap<QueueKey, Event>,
    index: HashMap<EventId, QueueKey>,
    next_seq: u64,
}

impl EventQueue {
    fn insert(&mut self, event: Event) {
        let key = QueueKey {
            time: event.scheduled_time(),
            priority: Reverse(event.priority()),
            seq: self.next_seq,
        };
        self.next_seq = self.next_seq.wrapping_add(1);
        self.index.insert(event.id(), key);
        self.entries.insert(key, event);
    }

    fn has_due(&self, up_to: NaiveDateTime) -> bool {
        self.entries
            .first_key_value()
            .is_some_and(|(key, _)| key.time <= up_to)
    }

    fn pop_due(&mut self, up_to: NaiveDateTime) -> Option<Event> {
        if !self.has_due(up_to) {
            return None;
        }
        let (_, event) = self.entries.pop_first()?;
        self.index.remove(&event.id());
        Some(event)
    }

    fn clear(&mut self) -> usize {
        let dropped = self.entries.len();
        self.entries.clear();
        self.index.clear();
        dropped
    }
}

type ProcessorTable = BTreeMap<EventKind, Vec<Arc<dyn EventProcessor>>>;

/// Time- and priority-ordered event queue with a per-kind processor table.
pub struct EventScheduler {
    queue: Mutex<EventQueue>,
    processors: RwLock<ProcessorTable>,
    max_events_per_drain: usize,
}

impl Default for EventScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for EventScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventScheduler")
            .field("pending", &self.event_count())
            .field("kinds", &self.registered_kinds())
            .field("max_events_per_drain", &self.max_events_per_drain)
            .finish()
    }
}

impl EventScheduler {
    /// Create an empty scheduler with the default drain cap.
    pub fn new() -> Self {
        Self::with_drain_limit(DEFAULT_MAX_EVENTS_PER_DRAIN)
    }

    /// Create an empty scheduler dispatching at most `max_events_per_drain`
    /// events per drain (clamped to at least 1).
    pub fn with_drain_limit(max_events_per_drain: usize) -> Self {
        Self {
            queue: Mutex::new(EventQueue::default()),
            processors: RwLock::new(BTreeMap::new()),
            max_events_per_drain: max_events_per_drain.max(1),
        }
    }

    fn queue(&self) -> MutexGuard<'_, EventQueue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    /// Queue an event for dispatch.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError`] if the event is cancelled, already
    /// processed, or its id is already pending.
    pub fn schedule_event(&self, event: Event) -> Result<EventId, SchedulingError> {
        let id = event.id();
        if event.is_cancelled() {
            return Err(SchedulingError::Cancelled { id });
        }
        if event.is_processed() {
            return Err(SchedulingError::AlreadyProcessed { id });
        }
        let mut queue = self.queue();
        if queue.index.contains_key(&id) {
            return Err(SchedulingError::DuplicateEvent { id });
        }
        debug!(
            event_id = %id,
            kind = %event.kind(),
            scheduled_time = %event.scheduled_time(),
            priority = event.priority(),
            "Event scheduled"
        );
        queue.insert(event);
        Ok(id)
    }

    /// Flag a pending event cancelled. It stays queued and is dropped
    /// without dispatch when it reaches the head. Returns `true` if the
    /// event was pending.
    pub fn cancel_event(&self, id: EventId) -> bool {
        let mut queue = self.queue();
        let Some(key) = queue.index.get(&id).copied() else {
            return false;
        };
        match queue.entries.get_mut(&key) {
            Some(event) => {
                event.cancel();
                debug!(event_id = %id, "Event cancelled");
                true
            }
            None => false,
        }
    }

    /// Drop every pending event. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = self.queue().clear();
        debug!(dropped, "Event queue cleared");
        dropped
    }

    /// Number of pending events (cancelled ones included until popped).
    pub fn event_count(&self) -> usize {
        self.queue().entries.len()
    }

    /// Scheduled time of the next pending event.
    pub fn next_event_time(&self) -> Option<NaiveDateTime> {
        self.queue()
            .entries
            .first_key_value()
            .map(|(key, _)| key.time)
    }

    /// Snapshot of the pending events in dispatch order.
    pub fn pending_events(&self) -> Vec<Event> {
        self.queue().entries.values().cloned().collect()
    }

    // -----------------------------------------------------------------------
    // Processor table
    // -----------------------------------------------------------------------

    /// Attach a processor to every kind it accepts. A processor with the
    /// same name already attached to a kind is replaced. Returns the kinds
    /// the processor was attached to.
    pub fn register_processor(&self, processor: Arc<dyn EventProcessor>) -> Vec<EventKind> {
        let mut table = self
            .processors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut attached = Vec::new();
        for kind in EventKind::ALL {
            if !processor.accepts(kind) {
                continue;
            }
            let list = table.entry(kind).or_default();
            list.retain(|existing| existing.name() != processor.name());
            list.push(Arc::clone(&processor));
            list.sort_by_key(|p| Reverse(p.priority()));
            attached.push(kind);
        }
        debug!(
            processor = processor.name(),
            priority = processor.priority(),
            kinds = ?attached,
            "Processor registered"
        );
        attached
    }

    /// Detach every processor registered for `kind`. Returns how many were
    /// detached.
    pub fn unregister_processor(&self, kind: EventKind) -> usize {
        let removed = self
            .processors
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&kind)
            .map_or(0, |list| list.len());
        debug!(%kind, removed, "Processors unregistered for kind");
        removed
    }

    /// Detach the processor called `name` from every kind. Returns the
    /// number of kinds it was detached from.
    pub fn unregister_named(&self, name: &str) -> usize {
        let mut table = self
            .processors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut removed: usize = 0;
        for list in table.values_mut() {
            let before = list.len();
            list.retain(|p| p.name() != name);
            removed = removed.saturating_add(before.saturating_sub(list.len()));
        }
        table.retain(|_, list| !list.is_empty());
        removed
    }

    /// Kinds with at least one processor attached.
    pub fn registered_kinds(&self) -> BTreeSet<EventKind> {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(kind, _)| *kind)
            .collect()
    }

    /// Names of the processors for `kind`, in dispatch order.
    pub fn processor_names(&self, kind: EventKind) -> Vec<String> {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|list| list.iter().map(|p| p.name().to_owned()).collect())
            .unwrap_or_default()
    }

    fn processors_for(&self, kind: EventKind) -> Vec<Arc<dyn EventProcessor>> {
        self.processors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .cloned()
            .unwrap_or_default()
    }

    // -----------------------------------------------------------------------
    // Drain
    // -----------------------------------------------------------------------

    /// Dispatch every event due at or before `up_to`, including events that
    /// become due while draining.
    ///
    /// # Errors
    ///
    /// Returns [`DrainError::CascadeLimitExceeded`] if more events are due
    /// than the drain cap allows. Events dispatched before the abort stay
    /// processed; the rest stay queued.
    pub fn process_events(&self, up_to: NaiveDateTime) -> Result<DrainReport, DrainError> {
        let mut report = DrainReport::default();

        loop {
            let next = {
                let mut queue = self.queue();
                if report.dispatched >= self.max_events_per_drain && queue.has_due(up_to) {
                    let remaining = queue.entries.len();
                    drop(queue);
                    error!(
                        limit = self.max_events_per_drain,
                        remaining, "Drain cascade limit exceeded"
                    );
                    return Err(DrainError::CascadeLimitExceeded {
                        limit: self.max_events_per_drain,
                        dispatched: report.dispatched,
                        remaining,
                    });
                }
                queue.pop_due(up_to)
            };
            let Some(mut event) = next else {
                break;
            };

            if event.is_cancelled() {
                debug!(event_id = %event.id(), kind = %event.kind(), "Skipping cancelled event");
                report.skipped_cancelled = report.skipped_cancelled.saturating_add(1);
                continue;
            }

            report.processor_failures = report
                .processor_failures
                .saturating_add(self.dispatch(&event, up_to));
            event.mark_processed();
            report.dispatched = report.dispatched.saturating_add(1);
            let count = report.by_kind.entry(event.kind()).or_default();
            *count = count.saturating_add(1);
        }

        if !report.is_empty() {
            debug!(
                %up_to,
                dispatched = report.dispatched,
                skipped_cancelled = report.skipped_cancelled,
                processor_failures = report.processor_failures,
                "Drain complete"
            );
        }
        Ok(report)
    }

    /// Run one event through its processors. Returns the failure count.
    fn dispatch(&self, event: &Event, up_to: NaiveDateTime) -> usize {
        let processors = self.processors_for(event.kind());
        debug!(
            event_id = %event.id(),
            kind = %event.kind(),
            scheduled_time = %event.scheduled_time(),
            priority = event.priority(),
            processors = processors.len(),
            "Dispatching event"
        );

        let ctx = DispatchContext::new(self, up_to, event.id());
        let mut failures: usize = 0;
        for processor in &processors {
            let outcome = catch_unwind(AssertUnwindSafe(|| processor.process(event, &ctx)));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures = failures.saturating_add(1);
                    warn!(
                        event_id = %event.id(),
                        kind = %event.kind(),
                        processor = processor.name(),
                        error = %err,
                        "Processor failed"
                    );
                }
                Err(payload) => {
                    failures = failures.saturating_add(1);
                    warn!(
                        event_id = %event.id(),
                        kind = %event.kind(),
                        processor = processor.name(),
                        panic = %panic_message(payload.as_ref()),
                        "Processor panicked"
                    );
                }
            }
        }
        failures
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_owned();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "non-string panic payload".to_owned()
}
