//! Shared type definitions for the popsim simulation kernel.
//!
//! This crate is the single source of truth for the types that flow
//! between the kernel (`popsim-core`) and the domain processors
//! (`popsim-population`).
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for entity identifiers
//! - [`enums`] -- Event kinds, time units, engine state, demographic enums
//! - [`event`] -- The tagged [`Event`] type and its per-kind payloads

pub mod enums;
pub mod event;
pub mod ids;

// Re-export all public types at crate root for convenience.
pub use enums::{DeathCause, DissolutionReason, EngineState, EventKind, Sex, TimeUnit};
pub use event::{Event, EventPayload};
pub use ids::{EventId, PersonId};
