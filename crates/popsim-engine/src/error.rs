//! Error types for the demo binary.
//!
//! [`DemoError`] wraps the failures of startup helpers so they can be
//! propagated with `?` up to `main`, which reports them through `anyhow`.

/// Startup failure of the demo binary.
#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: popsim_core::config::ConfigError,
    },

    /// Seeding the population store failed.
    #[error("population error: {source}")]
    Population {
        /// The underlying population error.
        #[from]
        source: popsim_population::PopulationError,
    },

    /// The demo section of the config file could not be read.
    #[error("demo config error: {message}")]
    DemoConfig {
        /// Description of the failure.
        message: String,
    },

    /// A seeded birth date fell outside the representable calendar.
    #[error("seeding error: {message}")]
    Seeding {
        /// Description of the failure.
        message: String,
    },
}
