//! Births: add the child to the store in the mother's region.

use std::sync::Arc;

use popsim_core::processor::{DispatchContext, EventProcessor, ProcessingError};
use popsim_types::{Event, EventKind, EventPayload};
use tracing::debug;

use crate::error::PopulationError;
use crate::person::Person;
use crate::store::PopulationStore;

/// Handles [`EventKind::Birth`].
#[derive(Debug)]
pub struct BirthProcessor {
    store: Arc<PopulationStore>,
}

impl BirthProcessor {
    /// Create a processor over `store`.
    pub const fn new(store: Arc<PopulationStore>) -> Self {
        Self { store }
    }
}

impl EventProcessor for BirthProcessor {
    fn name(&self) -> &str {
        "birth"
    }

    fn accepts(&self, kind: EventKind) -> bool {
        kind == EventKind::Birth
    }

    fn priority(&self) -> i32 {
        50
    }

    fn process(&self, event: &Event, _ctx: &DispatchContext<'_>) -> Result<(), ProcessingError> {
        let EventPayload::Birth {
            child,
            ref name,
            sex,
            mother,
            father,
        } = *event.payload()
        else {
            return Err(ProcessingError::UnexpectedPayload { kind: event.kind() });
        };

        let mother_record = self
            .store
            .get(mother)
            .ok_or(PopulationError::PersonNotFound(mother))?;
        if !mother_record.is_alive() {
            return Err(PopulationError::NotAlive(mother).into());
        }
        if let Some(father) = father {
            if !self.store.contains(father) {
                return Err(PopulationError::PersonNotFound(father).into());
            }
        }

        let mut person = Person::new(
            name.as_str(),
            sex,
            event.scheduled_time(),
            mother_record.region,
        );
        person.id = child;
        person.mother = Some(mother);
        person.father = father;
        self.store.add_inhabitant(person)?;
        debug!(%child, %mother, "Child born");
        Ok(())
    }
}
