//! Partnership formation and dissolution.

use std::sync::Arc;

use popsim_core::processor::{DispatchContext, EventProcessor, ProcessingError};
use popsim_types::{Event, EventKind, EventPayload};
use tracing::debug;

use crate::store::PopulationStore;

/// Handles [`EventKind::PartnershipFormed`] and
/// [`EventKind::PartnershipDissolved`].
#[derive(Debug)]
pub struct PartnershipProcessor {
    store: Arc<PopulationStore>,
}

impl PartnershipProcessor {
    /// Create a processor over `store`.
    pub const fn new(store: Arc<PopulationStore>) -> Self {
        Self { store }
    }
}

impl EventProcessor for PartnershipProcessor {
    fn name(&self) -> &str {
        "partnership"
    }

    fn accepts(&self, kind: EventKind) -> bool {
        matches!(
            kind,
            EventKind::PartnershipFormed | EventKind::PartnershipDissolved
        )
    }

    fn priority(&self) -> i32 {
        50
    }

    fn process(&self, event: &Event, _ctx: &DispatchContext<'_>) -> Result<(), ProcessingError> {
        match *event.payload() {
            EventPayload::PartnershipFormed { first, second } => {
                self.store.form_partnership(first, second)?;
                debug!(%first, %second, "Partnership formed");
            }
            EventPayload::PartnershipDissolved {
                first,
                second,
                reason,
            } => {
                let cleared = self.store.dissolve_partnership(first, second)?;
                debug!(%first, %second, ?reason, cleared, "Partnership dissolved");
            }
            _ => return Err(ProcessingError::UnexpectedPayload { kind: event.kind() }),
        }
        Ok(())
    }
}
