//! Migration between regions, or out of the simulation.

use std::sync::Arc;

use popsim_core::processor::{DispatchContext, EventProcessor, ProcessingError};
use popsim_types::{DissolutionReason, Event, EventKind, EventPayload};
use tracing::debug;

use super::DISSOLUTION_PRIORITY;
use crate::store::PopulationStore;

/// Handles [`EventKind::Migration`]. A migration without a destination
/// removes the individual from the living population.
#[derive(Debug)]
pub struct MigrationProcessor {
    store: Arc<PopulationStore>,
}

impl MigrationProcessor {
    /// Create a processor over `store`.
    pub const fn new(store: Arc<PopulationStore>) -> Self {
        Self { store }
    }
}

impl EventProcessor for MigrationProcessor {
    fn name(&self) -> &str {
        "migration"
    }

    fn accepts(&self, kind: EventKind) -> bool {
        kind == EventKind::Migration
    }

    fn priority(&self) -> i32 {
        50
    }

    fn process(&self, event: &Event, ctx: &DispatchContext<'_>) -> Result<(), ProcessingError> {
        let EventPayload::Migration {
            person,
            ref destination,
        } = *event.payload()
        else {
            return Err(ProcessingError::UnexpectedPayload { kind: event.kind() });
        };

        if let Some(region) = destination {
            self.store.relocate(person, region)?;
            debug!(%person, region, "Person relocated");
            return Ok(());
        }

        let partner = self.store.emigrate(person, event.scheduled_time())?;
        debug!(%person, "Person emigrated");
        if let Some(partner) = partner {
            ctx.schedule(
                Event::new(
                    EventPayload::PartnershipDissolved {
                        first: person,
                        second: partner,
                        reason: DissolutionReason::Emigration,
                    },
                    event.scheduled_time(),
                )
                .with_priority(DISSOLUTION_PRIORITY),
            )?;
        }
        Ok(())
    }
}
