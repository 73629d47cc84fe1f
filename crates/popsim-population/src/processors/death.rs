//! Death: marks the individual deceased and dissolves their partnership.

use std::sync::Arc;

use popsim_core::processor::{DispatchContext, EventProcessor, ProcessingError};
use popsim_types::{DissolutionReason, Event, EventKind, EventPayload};
use tracing::debug;

use super::DISSOLUTION_PRIORITY;
use crate::store::PopulationStore;

/// Handles [`EventKind::Death`]. Runs ahead of every other death handler.
#[derive(Debug)]
pub struct DeathProcessor {
    store: Arc<PopulationStore>,
}

impl DeathProcessor {
    /// Create a processor over `store`.
    pub const fn new(store: Arc<PopulationStore>) -> Self {
        Self { store }
    }
}

impl EventProcessor for DeathProcessor {
    fn name(&self) -> &str {
        "death"
    }

    fn accepts(&self, kind: EventKind) -> bool {
        kind == EventKind::Death
    }

    fn priority(&self) -> i32 {
        100
    }

    fn process(&self, event: &Event, ctx: &DispatchContext<'_>) -> Result<(), ProcessingError> {
        let EventPayload::Death { person, cause } = *event.payload() else {
            return Err(ProcessingError::UnexpectedPayload { kind: event.kind() });
        };

        let partner = self
            .store
            .mark_deceased(person, event.scheduled_time(), cause)?;
        debug!(%person, %cause, at = %event.scheduled_time(), "Person died");

        if let Some(partner) = partner {
            ctx.schedule(
                Event::new(
                    EventPayload::PartnershipDissolved {
                        first: person,
                        second: partner,
                        reason: DissolutionReason::Death,
                    },
                    event.scheduled_time(),
                )
                .with_priority(DISSOLUTION_PRIORITY),
            )?;
        }
        Ok(())
    }
}
