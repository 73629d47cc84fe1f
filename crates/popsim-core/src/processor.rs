//! Processor capability: the seam between the kernel and domain logic.
//!
//! Domain collaborators (mortality, partnership, health, ...) implement
//! [`EventProcessor`] and are registered against the event kinds they
//! accept. During a drain the scheduler hands each due event to every
//! matching processor in descending priority order, together with a
//! [`DispatchContext`] through which the processor may schedule follow-up
//! events. Follow-ups that are already due join the same drain.

use chrono::NaiveDateTime;
use popsim_types::{Event, EventId, EventKind, PersonId};

use crate::scheduler::{EventScheduler, SchedulingError};

/// Errors a processor reports for a single event.
///
/// The scheduler logs these and carries on: a failing processor never
/// stops its siblings or the rest of the drain.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    /// The event refers to an individual the processor cannot find.
    #[error("person {0} not found")]
    MissingEntity(PersonId),

    /// The referenced state does not allow the event to apply.
    #[error("invalid state: {reason}")]
    InvalidState {
        /// Description of the conflict.
        reason: String,
    },

    /// The processor received a payload it does not handle.
    #[error("unexpected {kind} payload")]
    UnexpectedPayload {
        /// Kind of the offending event.
        kind: EventKind,
    },

    /// Scheduling a follow-up event failed.
    #[error("follow-up scheduling failed: {source}")]
    Scheduling {
        /// The underlying scheduling error.
        #[from]
        source: SchedulingError,
    },
}

/// A unit of domain logic registered against one or more event kinds.
///
/// Processors take `&self`; any state they keep must be internally
/// synchronized because the engine shares them across threads.
pub trait EventProcessor: Send + Sync {
    /// Stable name. Identifies the processor for de-duplication and logs.
    fn name(&self) -> &str;

    /// Whether this processor handles events of `kind`.
    fn accepts(&self, kind: EventKind) -> bool;

    /// Order among processors of the same kind; higher runs first.
    fn priority(&self) -> i32 {
        0
    }

    /// Handle one due event.
    fn process(&self, event: &Event, ctx: &DispatchContext<'_>) -> Result<(), ProcessingError>;
}

/// Handle given to a processor while it handles one event.
#[derive(Debug, Clone, Copy)]
pub struct DispatchContext<'a> {
    scheduler: &'a EventScheduler,
    up_to: NaiveDateTime,
    event_id: EventId,
}

impl<'a> DispatchContext<'a> {
    pub(crate) const fn new(
        scheduler: &'a EventScheduler,
        up_to: NaiveDateTime,
        event_id: EventId,
    ) -> Self {
        Self {
            scheduler,
            up_to,
            event_id,
        }
    }

    /// Horizon of the running drain. Events scheduled at or before this
    /// time are dispatched within the same drain.
    pub const fn up_to(&self) -> NaiveDateTime {
        self.up_to
    }

    /// Identifier of the event being dispatched.
    pub const fn event_id(&self) -> EventId {
        self.event_id
    }

    /// Schedule a follow-up event.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulingError`] if the event is rejected.
    pub fn schedule(&self, event: Event) -> Result<EventId, SchedulingError> {
        self.scheduler.schedule_event(event)
    }

    /// Cancel a pending event. Returns `true` if it was pending.
    pub fn cancel(&self, id: EventId) -> bool {
        self.scheduler.cancel_event(id)
    }
}
