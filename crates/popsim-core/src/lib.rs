//! Discrete-event simulation kernel for popsim.
//!
//! This crate owns simulated time and the ordering of everything that
//! happens in it. Domain behaviour plugs in through [`EventProcessor`]
//! and [`PopulationProvider`]; the kernel never depends on a concrete
//! population model.
//!
//! # Modules
//!
//! - [`clock`] -- Thread-safe simulated clock with calendar-aware
//!   advancement and a time-scale multiplier.
//! - [`config`] -- Configuration loading from `popsim-config.yaml` into
//!   strongly-typed structs.
//! - [`control`] -- Stop flag and interruptible sleep for the engine loop.
//! - [`engine`] -- [`SimulationEngine`] lifecycle state machine and its
//!   background tick loop.
//! - [`population`] -- [`PopulationProvider`] trait and the minimal
//!   [`StaticPopulation`].
//! - [`processor`] -- [`EventProcessor`] trait and [`DispatchContext`].
//! - [`registry`] -- [`ProcessorRegistry`] bulk attach/detach bookkeeping.
//! - [`scheduler`] -- [`EventScheduler`] priority queue and drain.
//!
//! [`EventProcessor`]: processor::EventProcessor
//! [`DispatchContext`]: processor::DispatchContext
//! [`PopulationProvider`]: population::PopulationProvider
//! [`StaticPopulation`]: population::StaticPopulation
//! [`SimulationEngine`]: engine::SimulationEngine
//! [`ProcessorRegistry`]: registry::ProcessorRegistry
//! [`EventScheduler`]: scheduler::EventScheduler

pub mod clock;
pub mod config;
pub mod control;
pub mod engine;
pub mod population;
pub mod processor;
pub mod registry;
pub mod scheduler;
