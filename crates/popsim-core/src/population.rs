//! Population provider contract.
//!
//! The kernel never generates or validates population membership. It only
//! needs a snapshot of who is alive when it builds a time-change event, a
//! way to detect extinction, and a way to empty the store on reset. The
//! store itself lives outside the kernel and is handed to the engine (and
//! to every processor) explicitly at construction time.

use std::sync::Mutex;

use popsim_types::PersonId;

/// Source of the currently-alive population.
pub trait PopulationProvider: Send + Sync {
    /// Identifiers of every living individual, in a stable order.
    fn living(&self) -> Vec<PersonId>;

    /// Number of living individuals.
    fn living_count(&self) -> usize {
        self.living().len()
    }

    /// Remove every individual. Called by the engine on reset.
    fn clear(&self);
}

/// A fixed list of identifiers, useful for kernel tests and demos that do
/// not need a full population store.
#[derive(Debug, Default)]
pub struct StaticPopulation {
    people: Mutex<Vec<PersonId>>,
}

impl StaticPopulation {
    /// Create a provider holding `people`.
    pub const fn new(people: Vec<PersonId>) -> Self {
        Self {
            people: Mutex::new(people),
        }
    }

    /// Remove one individual. Returns `true` if it was present.
    pub fn remove(&self, id: PersonId) -> bool {
        let mut people = self
            .people
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = people.len();
        people.retain(|p| *p != id);
        people.len() != before
    }
}

impl PopulationProvider for StaticPopulation {
    fn living(&self) -> Vec<PersonId> {
        self.people
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    fn clear(&self) {
        self.people
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clear();
    }
}
