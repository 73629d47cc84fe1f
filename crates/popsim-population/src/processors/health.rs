//! Health changes. Health dropping to zero causes a death from illness.

use std::sync::Arc;

use popsim_core::processor::{DispatchContext, EventProcessor, ProcessingError};
use popsim_types::{DeathCause, Event, EventKind, EventPayload};
use tracing::debug;

use super::CONSEQUENT_DEATH_PRIORITY;
use crate::store::PopulationStore;

/// Handles [`EventKind::HealthChange`].
#[derive(Debug)]
pub struct HealthProcessor {
    store: Arc<PopulationStore>,
}

impl HealthProcessor {
    /// Create a processor over `store`.
    pub const fn new(store: Arc<PopulationStore>) -> Self {
        Self { store }
    }
}

impl EventProcessor for HealthProcessor {
    fn name(&self) -> &str {
        "health"
    }

    fn accepts(&self, kind: EventKind) -> bool {
        kind == EventKind::HealthChange
    }

    fn priority(&self) -> i32 {
        50
    }

    fn process(&self, event: &Event, ctx: &DispatchContext<'_>) -> Result<(), ProcessingError> {
        let EventPayload::HealthChange { person, delta } = *event.payload() else {
            return Err(ProcessingError::UnexpectedPayload { kind: event.kind() });
        };

        let (before, health) = self.store.update_living(person, |p| {
            let before = p.health;
            (before, p.apply_health_delta(delta))
        })?;
        debug!(%person, delta, health, "Health changed");

        // Only the change that crosses into zero is fatal; a later hit on
        // someone already at zero must not queue a second death.
        if before > 0 && health == 0 {
            ctx.schedule(
                Event::new(
                    EventPayload::Death {
                        person,
                        cause: DeathCause::Illness,
                    },
                    event.scheduled_time(),
                )
                .with_priority(CONSEQUENT_DEATH_PRIORITY),
            )?;
        }
        Ok(())
    }
}
