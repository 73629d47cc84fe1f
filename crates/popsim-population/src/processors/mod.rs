//! Deterministic reference processors.
//!
//! Each processor applies exactly the state change its event describes
//! and schedules the consequences as follow-up events at the same
//! simulated time, so they land in the drain that is already running:
//!
//! - a death dissolves the deceased's partnership,
//! - health reaching zero causes a death,
//! - emigration dissolves the emigrant's partnership,
//! - individuals past the configured age die of old age on the next tick.
//!
//! None of them draw random numbers.

mod aging;
mod birth;
mod death;
mod health;
mod migration;
mod partnership;

use std::sync::Arc;

use popsim_core::config::PopulationConfig;
use popsim_core::processor::EventProcessor;

use crate::store::PopulationStore;

pub use aging::AgingProcessor;
pub use birth::BirthProcessor;
pub use death::DeathProcessor;
pub use health::HealthProcessor;
pub use migration::MigrationProcessor;
pub use partnership::PartnershipProcessor;

/// Event priority of deaths scheduled as a consequence of another event.
pub const CONSEQUENT_DEATH_PRIORITY: i32 = 100;

/// Event priority of dissolutions scheduled by a death or an emigration.
pub const DISSOLUTION_PRIORITY: i32 = 90;

/// The full reference processor set, sharing one store.
pub fn default_processors(
    store: &Arc<PopulationStore>,
    config: &PopulationConfig,
) -> Vec<Arc<dyn EventProcessor>> {
    vec![
        Arc::new(DeathProcessor::new(Arc::clone(store))),
        Arc::new(PartnershipProcessor::new(Arc::clone(store))),
        Arc::new(HealthProcessor::new(Arc::clone(store))),
        Arc::new(BirthProcessor::new(Arc::clone(store))),
        Arc::new(MigrationProcessor::new(Arc::clone(store))),
        Arc::new(AgingProcessor::new(Arc::clone(store), config.max_age_years)),
    ]
}
