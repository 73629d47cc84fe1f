//! Bookkeeping of the processor set attached to a scheduler.
//!
//! The engine tracks every processor it was given so that `reset` can
//! detach the full set and attach it again. Attachment goes through
//! [`EventScheduler::register_processor`], which replaces same-named
//! entries, so repeated register/unregister cycles never duplicate a
//! processor.

use std::collections::BTreeSet;
use std::sync::{Arc, PoisonError, RwLock};

use popsim_types::EventKind;
use tracing::info;

use crate::processor::EventProcessor;
use crate::scheduler::EventScheduler;

/// Tracks the processors the engine owns and attaches them in bulk.
pub struct ProcessorRegistry {
    scheduler: Arc<EventScheduler>,
    tracked: RwLock<Vec<Arc<dyn EventProcessor>>>,
}

impl core::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("tracked", &self.tracked_names())
            .finish_non_exhaustive()
    }
}

impl ProcessorRegistry {
    /// Create a registry over `scheduler` tracking `processors`. Nothing is
    /// attached until [`register_all_processors`](Self::register_all_processors).
    pub fn new(scheduler: Arc<EventScheduler>, processors: Vec<Arc<dyn EventProcessor>>) -> Self {
        Self {
            scheduler,
            tracked: RwLock::new(processors),
        }
    }

    /// Add a processor to the tracked set and attach it immediately. A
    /// tracked processor with the same name is replaced.
    pub fn track(&self, processor: Arc<dyn EventProcessor>) {
        {
            let mut tracked = self.tracked.write().unwrap_or_else(PoisonError::into_inner);
            tracked.retain(|p| p.name() != processor.name());
            tracked.push(Arc::clone(&processor));
        }
        self.scheduler.unregister_named(processor.name());
        self.scheduler.register_processor(processor);
    }

    /// Attach every tracked processor to the scheduler.
    pub fn register_all_processors(&self) {
        let tracked = self.snapshot();
        for processor in &tracked {
            self.scheduler.register_processor(Arc::clone(processor));
        }
        info!(
            processors = tracked.len(),
            kinds = ?self.scheduler.registered_kinds(),
            "Processors registered"
        );
    }

    /// Detach every tracked processor from the scheduler.
    pub fn unregister_all_processors(&self) {
        let tracked = self.snapshot();
        for processor in &tracked {
            self.scheduler.unregister_named(processor.name());
        }
        info!(processors = tracked.len(), "Processors unregistered");
    }

    /// Names of the tracked processors, in tracking order.
    pub fn tracked_names(&self) -> Vec<String> {
        self.tracked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|p| p.name().to_owned())
            .collect()
    }

    /// Kinds covered by the tracked set.
    pub fn tracked_kinds(&self) -> BTreeSet<EventKind> {
        let tracked = self.snapshot();
        EventKind::ALL
            .into_iter()
            .filter(|kind| tracked.iter().any(|p| p.accepts(*kind)))
            .collect()
    }

    fn snapshot(&self) -> Vec<Arc<dyn EventProcessor>> {
        self.tracked
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
