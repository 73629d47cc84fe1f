//! The single tagged event type dispatched by the kernel.
//!
//! An [`Event`] is a unit of work scheduled at a simulated timestamp. Its
//! domain meaning lives in a typed [`EventPayload`]; the [`EventKind`] tag
//! is derived from the payload, so processors match on `kind()` or on the
//! payload variant and the compiler checks exhaustiveness.
//!
//! Everything except the `processed` and `cancelled` flags is fixed at
//! construction. The builder methods consume `self` and are meant to be
//! chained before the event is handed to the scheduler.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::enums::{DeathCause, DissolutionReason, EventKind, Sex, TimeUnit};
use crate::ids::{EventId, PersonId};

/// Typed, per-kind payload of an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// The clock advanced from `previous` to `current`.
    TimeChange {
        /// Simulated time before the tick.
        previous: NaiveDateTime,
        /// Simulated time after the tick.
        current: NaiveDateTime,
        /// Unit the clock advanced by.
        unit: TimeUnit,
        /// Living population when the tick was built.
        population: Vec<PersonId>,
    },
    /// A child is born into the population.
    Birth {
        /// Identifier assigned to the newborn.
        child: PersonId,
        /// Given name of the newborn.
        name: String,
        /// Sex of the newborn.
        sex: Sex,
        /// Birth mother.
        mother: PersonId,
        /// Father, when known.
        father: Option<PersonId>,
    },
    /// An individual dies.
    Death {
        /// The individual who dies.
        person: PersonId,
        /// Cause of death.
        cause: DeathCause,
    },
    /// An individual's health shifts by `delta` points.
    HealthChange {
        /// The affected individual.
        person: PersonId,
        /// Signed change applied to the health score.
        delta: i16,
    },
    /// Two individuals become partners.
    PartnershipFormed {
        /// First partner.
        first: PersonId,
        /// Second partner.
        second: PersonId,
    },
    /// A partnership between two individuals ends.
    PartnershipDissolved {
        /// First partner.
        first: PersonId,
        /// Second partner.
        second: PersonId,
        /// Why the partnership ended.
        reason: DissolutionReason,
    },
    /// An individual moves to `destination`, or leaves the simulation when
    /// `destination` is `None`.
    Migration {
        /// The migrating individual.
        person: PersonId,
        /// Target region, `None` for emigration out of the simulation.
        destination: Option<String>,
    },
}

impl EventPayload {
    /// The kind tag corresponding to this payload.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::TimeChange { .. } => EventKind::TimeChange,
            Self::Birth { .. } => EventKind::Birth,
            Self::Death { .. } => EventKind::Death,
            Self::HealthChange { .. } => EventKind::HealthChange,
            Self::PartnershipFormed { .. } => EventKind::PartnershipFormed,
            Self::PartnershipDissolved { .. } => EventKind::PartnershipDissolved,
            Self::Migration { .. } => EventKind::Migration,
        }
    }

    /// The individual this payload is primarily about, if any.
    pub const fn subject(&self) -> Option<PersonId> {
        match self {
            Self::TimeChange { .. } => None,
            Self::Birth { child, .. } => Some(*child),
            Self::Death { person, .. }
            | Self::HealthChange { person, .. }
            | Self::Migration { person, .. } => Some(*person),
            Self::PartnershipFormed { first, .. } | Self::PartnershipDissolved { first, .. } => {
                Some(*first)
            }
        }
    }
}

/// A scheduled unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    id: EventId,
    scheduled_time: NaiveDateTime,
    priority: i32,
    target: Option<PersonId>,
    payload: EventPayload,
    attributes: BTreeMap<String, serde_json::Value>,
    processed: bool,
    cancelled: bool,
}

impl Event {
    /// Create an event with priority 0. The target defaults to the
    /// payload's subject.
    pub fn new(payload: EventPayload, scheduled_time: NaiveDateTime) -> Self {
        Self {
            id: EventId::new(),
            scheduled_time,
            priority: 0,
            target: payload.subject(),
            payload,
            attributes: BTreeMap::new(),
            processed: false,
            cancelled: false,
        }
    }

    /// Set the dispatch priority (higher runs first at equal time).
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Override the target entity.
    #[must_use]
    pub const fn with_target(mut self, target: Option<PersonId>) -> Self {
        self.target = target;
        self
    }

    /// Attach an opaque attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Unique identifier.
    pub const fn id(&self) -> EventId {
        self.id
    }

    /// Kind tag derived from the payload.
    pub const fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Simulated time at which the event becomes due.
    pub const fn scheduled_time(&self) -> NaiveDateTime {
        self.scheduled_time
    }

    /// Dispatch priority.
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Target entity, if any.
    pub const fn target(&self) -> Option<PersonId> {
        self.target
    }

    /// Typed payload.
    pub const fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Opaque attribute bag.
    pub const fn attributes(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.attributes
    }

    /// Look up one attribute.
    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }

    /// Whether the event has been dispatched.
    pub const fn is_processed(&self) -> bool {
        self.processed
    }

    /// Whether the event has been cancelled.
    pub const fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Mark the event processed. Returns `false` if it already was.
    pub const fn mark_processed(&mut self) -> bool {
        if self.processed {
            return false;
        }
        self.processed = true;
        true
    }

    /// Cancel the event. A cancelled event is never dispatched.
    pub const fn cancel(&mut self) {
        self.cancelled = true;
    }
}
