//! Enumeration types shared by the kernel and the domain processors.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// The discriminator identifying an event's domain meaning.
///
/// Processors register against kinds; the scheduler looks processors up
/// by the kind of each due event. The kind of an [`Event`] is derived
/// from its payload and can never disagree with it.
///
/// [`Event`]: crate::event::Event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// The simulated clock crossed a tick boundary.
    TimeChange,
    /// A new individual joins the population by birth.
    Birth,
    /// An individual dies.
    Death,
    /// An individual's health changes.
    HealthChange,
    /// Two individuals become partners.
    PartnershipFormed,
    /// A partnership ends.
    PartnershipDissolved,
    /// An individual moves region or leaves the simulation.
    Migration,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::TimeChange,
        Self::Birth,
        Self::Death,
        Self::HealthChange,
        Self::PartnershipFormed,
        Self::PartnershipDissolved,
        Self::Migration,
    ];
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::TimeChange => "time_change",
            Self::Birth => "birth",
            Self::Death => "death",
            Self::HealthChange => "health_change",
            Self::PartnershipFormed => "partnership_formed",
            Self::PartnershipDissolved => "partnership_dissolved",
            Self::Migration => "migration",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Calendar unit the clock advances by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    /// One calendar day.
    Day,
    /// One calendar month (day-of-month clamped at month end).
    Month,
    /// Twelve calendar months.
    Year,
}

// ---------------------------------------------------------------------------
// Engine lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle state of the simulation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// No background loop is running. Initial and terminal state.
    Stopped,
    /// The background loop advances time and drains events.
    Running,
    /// The background loop idles without advancing time.
    Paused,
}

impl core::fmt::Display for EngineState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Stopped => f.write_str("STOPPED"),
            Self::Running => f.write_str("RUNNING"),
            Self::Paused => f.write_str("PAUSED"),
        }
    }
}

// ---------------------------------------------------------------------------
// Demographics
// ---------------------------------------------------------------------------

/// Biological sex of an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sex {
    /// Female.
    Female,
    /// Male.
    Male,
}

/// Why an individual died.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeathCause {
    /// Exceeded the configured lifespan.
    OldAge,
    /// Health reached zero.
    Illness,
    /// External cause injected by a collaborator.
    Accident,
    /// Cause not recorded.
    Unspecified,
}

impl core::fmt::Display for DeathCause {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OldAge => write!(f, "old_age"),
            Self::Illness => write!(f, "illness"),
            Self::Accident => write!(f, "accident"),
            Self::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// Why a partnership ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DissolutionReason {
    /// One of the partners died.
    Death,
    /// The partners separated.
    Separation,
    /// One of the partners left the simulation.
    Emigration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_kinds_are_distinct() {
        let set: std::collections::BTreeSet<EventKind> = EventKind::ALL.into_iter().collect();
        assert_eq!(set.len(), EventKind::ALL.len());
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&EventKind::PartnershipDissolved).ok();
        assert_eq!(json.as_deref(), Some("\"partnership_dissolved\""));
        assert_eq!(EventKind::HealthChange.to_string(), "health_change");
    }

    #[test]
    fn engine_state_display_is_upper_case() {
        assert_eq!(EngineState::Paused.to_string(), "PAUSED");
    }
}
