//! Thread-safe in-memory population store.
//!
//! The [`PopulationStore`] owns every [`Person`] the simulation has seen,
//! living or not. Records of the dead and the emigrated are kept for
//! lineage and census queries; only living individuals are reported to
//! the kernel through [`PopulationProvider`].
//!
//! Every operation takes the lock for a single short critical section and
//! never calls back into the scheduler while holding it.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::NaiveDateTime;
use popsim_core::population::PopulationProvider;
use popsim_types::{DeathCause, PersonId};
use serde::{Deserialize, Serialize};

use crate::error::PopulationError;
use crate::person::{Deceased, Person};

/// Headcount snapshot of the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Census {
    /// Individuals alive in the simulation.
    pub alive: usize,
    /// Individuals who died.
    pub deceased: usize,
    /// Individuals who left the simulation.
    pub emigrated: usize,
    /// Living individuals with a partner.
    pub partnered: usize,
}

/// All individuals, keyed by ID.
#[derive(Debug, Default)]
pub struct PopulationStore {
    people: RwLock<BTreeMap<PersonId, Person>>,
}

impl PopulationStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<PersonId, Person>> {
        self.people.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<PersonId, Person>> {
        self.people.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new individual.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::DuplicatePerson`] if the ID is taken.
    pub fn add_inhabitant(&self, person: Person) -> Result<PersonId, PopulationError> {
        let id = person.id;
        let mut people = self.write();
        if people.contains_key(&id) {
            return Err(PopulationError::DuplicatePerson(id));
        }
        people.insert(id, person);
        Ok(id)
    }

    /// Copy of one record, living or not.
    pub fn get(&self, id: PersonId) -> Option<Person> {
        self.read().get(&id).cloned()
    }

    /// Whether the store holds a record for `id`.
    pub fn contains(&self, id: PersonId) -> bool {
        self.read().contains_key(&id)
    }

    /// Total number of records, living or not.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether the store holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Apply `f` to a living individual.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::PersonNotFound`] or
    /// [`PopulationError::NotAlive`].
    pub fn update_living<R>(
        &self,
        id: PersonId,
        f: impl FnOnce(&mut Person) -> R,
    ) -> Result<R, PopulationError> {
        let mut people = self.write();
        let person = people
            .get_mut(&id)
            .ok_or(PopulationError::PersonNotFound(id))?;
        if !person.is_alive() {
            return Err(PopulationError::NotAlive(id));
        }
        Ok(f(person))
    }

    /// Record a death. Returns the partner the deceased leaves behind; the
    /// partner's own reference is left for the dissolution event to clear.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::PersonNotFound`] or
    /// [`PopulationError::NotAlive`].
    pub fn mark_deceased(
        &self,
        id: PersonId,
        at: NaiveDateTime,
        cause: DeathCause,
    ) -> Result<Option<PersonId>, PopulationError> {
        self.update_living(id, |person| {
            person.deceased = Some(Deceased { at, cause });
            person.partner
        })
    }

    /// Record that an individual left the simulation. Returns their
    /// partner, as [`mark_deceased`](Self::mark_deceased) does.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::PersonNotFound`] or
    /// [`PopulationError::NotAlive`].
    pub fn emigrate(
        &self,
        id: PersonId,
        at: NaiveDateTime,
    ) -> Result<Option<PersonId>, PopulationError> {
        self.update_living(id, |person| {
            person.emigrated_at = Some(at);
            person.partner
        })
    }

    /// Move a living individual to another region.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::PersonNotFound`] or
    /// [`PopulationError::NotAlive`].
    pub fn relocate(&self, id: PersonId, region: &str) -> Result<(), PopulationError> {
        self.update_living(id, |person| region.clone_into(&mut person.region))
    }

    /// Pair two living, unpartnered individuals.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::SelfPartnership`], a lookup error, or
    /// [`PopulationError::AlreadyPartnered`].
    pub fn form_partnership(&self, first: PersonId, second: PersonId) -> Result<(), PopulationError> {
        if first == second {
            return Err(PopulationError::SelfPartnership(first));
        }
        let mut people = self.write();
        for id in [first, second] {
            let person = people
                .get(&id)
                .ok_or(PopulationError::PersonNotFound(id))?;
            if !person.is_alive() {
                return Err(PopulationError::NotAlive(id));
            }
            if let Some(partner) = person.partner {
                return Err(PopulationError::AlreadyPartnered { person: id, partner });
            }
        }
        for (id, partner) in [(first, second), (second, first)] {
            if let Some(person) = people.get_mut(&id) {
                person.partner = Some(partner);
            }
        }
        Ok(())
    }

    /// Clear the partner references `first -> second` and `second -> first`
    /// wherever they still hold. Works on records of the dead and the
    /// emigrated too. Returns the number of references cleared.
    ///
    /// # Errors
    ///
    /// Returns [`PopulationError::PersonNotFound`] if either is unknown.
    pub fn dissolve_partnership(
        &self,
        first: PersonId,
        second: PersonId,
    ) -> Result<usize, PopulationError> {
        let mut people = self.write();
        for id in [first, second] {
            if !people.contains_key(&id) {
                return Err(PopulationError::PersonNotFound(id));
            }
        }
        let mut cleared: usize = 0;
        for (id, partner) in [(first, second), (second, first)] {
            if let Some(person) = people.get_mut(&id) {
                if person.partner == Some(partner) {
                    person.partner = None;
                    cleared = cleared.saturating_add(1);
                }
            }
        }
        Ok(cleared)
    }

    /// Living individuals aged `years` or more at `at`.
    pub fn living_aged_at_least(&self, years: u32, at: NaiveDateTime) -> Vec<PersonId> {
        self.read()
            .values()
            .filter(|p| p.is_alive() && p.age_years(at) >= years)
            .map(|p| p.id)
            .collect()
    }

    /// Current headcounts.
    pub fn census(&self) -> Census {
        self.read()
            .values()
            .fold(Census::default(), |mut census, person| {
                if person.deceased.is_some() {
                    census.deceased = census.deceased.saturating_add(1);
                } else if person.emigrated_at.is_some() {
                    census.emigrated = census.emigrated.saturating_add(1);
                } else {
                    census.alive = census.alive.saturating_add(1);
                    if person.partner.is_some() {
                        census.partnered = census.partnered.saturating_add(1);
                    }
                }
                census
            })
    }
}

impl PopulationProvider for PopulationStore {
    fn living(&self) -> Vec<PersonId> {
        self.read()
            .values()
            .filter(|p| p.is_alive())
            .map(|p| p.id)
            .collect()
    }

    fn living_count(&self) -> usize {
        self.read().values().filter(|p| p.is_alive()).count()
    }

    fn clear(&self) {
        self.write().clear();
    }
}
