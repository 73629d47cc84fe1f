//! Error types for the popsim-population crate.
//!
//! Store operations return typed errors rather than panicking. Inside a
//! processor they convert into [`ProcessingError`] so the scheduler can log
//! them against the event that caused them.

use popsim_core::processor::ProcessingError;
use popsim_types::PersonId;

/// Errors that can occur during population store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PopulationError {
    /// No individual with the given ID is in the store.
    #[error("person not found: {0}")]
    PersonNotFound(PersonId),

    /// An individual with the given ID is already in the store.
    #[error("duplicate person: {0}")]
    DuplicatePerson(PersonId),

    /// The individual has died or left the simulation.
    #[error("person {0} is no longer alive in the simulation")]
    NotAlive(PersonId),

    /// The individual already has a partner.
    #[error("person {person} is already partnered with {partner}")]
    AlreadyPartnered {
        /// The individual that could not be paired.
        person: PersonId,
        /// Their current partner.
        partner: PersonId,
    },

    /// A partnership was requested between an individual and themself.
    #[error("person {0} cannot partner with themself")]
    SelfPartnership(PersonId),
}

impl From<PopulationError> for ProcessingError {
    fn from(err: PopulationError) -> Self {
        match err {
            PopulationError::PersonNotFound(id) => Self::MissingEntity(id),
            other => Self::InvalidState {
                reason: other.to_string(),
            },
        }
    }
}
