//! Population model for the popsim simulation kernel.
//!
//! Provides the in-memory store the kernel reads its living population
//! from, and a deterministic set of event processors that keep the store
//! consistent as births, deaths, partnerships, health changes, and
//! migrations are dispatched.
//!
//! # Modules
//!
//! - [`error`] -- [`PopulationError`] and its mapping into processor errors.
//! - [`person`] -- The [`Person`] record.
//! - [`processors`] -- Reference processors and [`default_processors`].
//! - [`store`] -- [`PopulationStore`], which implements the kernel's
//!   population provider contract.
//!
//! [`PopulationError`]: error::PopulationError
//! [`Person`]: person::Person
//! [`default_processors`]: processors::default_processors
//! [`PopulationStore`]: store::PopulationStore

pub mod error;
pub mod person;
pub mod processors;
pub mod store;

pub use error::PopulationError;
pub use person::Person;
pub use store::{Census, PopulationStore};
