//! The individual record held by the population store.

use chrono::NaiveDateTime;
use popsim_types::{DeathCause, PersonId, Sex};
use serde::{Deserialize, Serialize};

/// Health of a newly created individual.
pub const MAX_HEALTH: u8 = 100;

/// Date and cause of a death.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deceased {
    /// Simulated time of death.
    pub at: NaiveDateTime,
    /// Recorded cause.
    pub cause: DeathCause,
}

/// One individual in the simulation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    /// Unique identifier.
    pub id: PersonId,
    /// Display name.
    pub name: String,
    /// Biological sex.
    pub sex: Sex,
    /// Simulated time of birth.
    pub born_at: NaiveDateTime,
    /// Health in `0..=MAX_HEALTH`.
    pub health: u8,
    /// Region the individual lives in.
    pub region: String,
    /// Current partner, if any.
    pub partner: Option<PersonId>,
    /// Mother, if born inside the simulation.
    pub mother: Option<PersonId>,
    /// Father, if known.
    pub father: Option<PersonId>,
    /// Set once the individual dies.
    pub deceased: Option<Deceased>,
    /// Set once the individual leaves the simulation.
    pub emigrated_at: Option<NaiveDateTime>,
}

impl Person {
    /// Create a healthy, unpartnered individual with no recorded parents.
    pub fn new(
        name: impl Into<String>,
        sex: Sex,
        born_at: NaiveDateTime,
        region: impl Into<String>,
    ) -> Self {
        Self {
            id: PersonId::new(),
            name: name.into(),
            sex,
            born_at,
            health: MAX_HEALTH,
            region: region.into(),
            partner: None,
            mother: None,
            father: None,
            deceased: None,
            emigrated_at: None,
        }
    }

    /// Whether the individual still counts toward the living population.
    pub const fn is_alive(&self) -> bool {
        self.deceased.is_none() && self.emigrated_at.is_none()
    }

    /// Completed years of age at `at`. Zero before the birth date.
    pub fn age_years(&self, at: NaiveDateTime) -> u32 {
        at.date().years_since(self.born_at.date()).unwrap_or(0)
    }

    /// Apply a signed health change, clamped to `0..=MAX_HEALTH`.
    /// Returns the new health.
    pub fn apply_health_delta(&mut self, delta: i16) -> u8 {
        let updated = i16::from(self.health)
            .saturating_add(delta)
            .clamp(0, i16::from(MAX_HEALTH));
        self.health = u8::try_from(updated).unwrap_or(0);
        self.health
    }
}
