//! Aging: on every tick, individuals past the age limit die of old age.

use std::sync::Arc;

use popsim_core::processor::{DispatchContext, EventProcessor, ProcessingError};
use popsim_types::{DeathCause, Event, EventKind, EventPayload};
use tracing::debug;

use super::CONSEQUENT_DEATH_PRIORITY;
use crate::store::PopulationStore;

/// Handles [`EventKind::TimeChange`].
///
/// The living set is read from the store at dispatch time rather than from
/// the tick's population snapshot, so individuals who died earlier in the
/// same drain are not killed twice.
#[derive(Debug)]
pub struct AgingProcessor {
    store: Arc<PopulationStore>,
    max_age_years: u32,
}

impl AgingProcessor {
    /// Create a processor over `store` with the given age limit.
    pub const fn new(store: Arc<PopulationStore>, max_age_years: u32) -> Self {
        Self {
            store,
            max_age_years,
        }
    }
}

impl EventProcessor for AgingProcessor {
    fn name(&self) -> &str {
        "aging"
    }

    fn accepts(&self, kind: EventKind) -> bool {
        kind == EventKind::TimeChange
    }

    fn process(&self, event: &Event, ctx: &DispatchContext<'_>) -> Result<(), ProcessingError> {
        let EventPayload::TimeChange { current, .. } = *event.payload() else {
            return Err(ProcessingError::UnexpectedPayload { kind: event.kind() });
        };

        let elders = self.store.living_aged_at_least(self.max_age_years, current);
        for person in &elders {
            ctx.schedule(
                Event::new(
                    EventPayload::Death {
                        person: *person,
                        cause: DeathCause::OldAge,
                    },
                    current,
                )
                .with_priority(CONSEQUENT_DEATH_PRIORITY),
            )?;
        }
        if !elders.is_empty() {
            debug!(count = elders.len(), %current, "Old-age deaths scheduled");
        }
        Ok(())
    }
}
