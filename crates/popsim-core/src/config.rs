//! Configuration loading and typed config structures for popsim.
//!
//! The canonical configuration lives in `popsim-config.yaml` at the project
//! root. This module defines strongly-typed structs mirroring the YAML and a
//! loader that reads, overrides from the environment, and validates it.
//! Every field has a default, so an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime};
use popsim_types::TimeUnit;
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configuration parsed but holds an unusable value.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SimulationConfig {
    /// Simulated clock settings.
    #[serde(default)]
    pub clock: ClockConfig,

    /// Engine loop settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Initial population settings (consumed by the demo binary).
    #[serde(default)]
    pub population: PopulationConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SimulationConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// `POPSIM_LOG_LEVEL` overrides `logging.level` when set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if validation fails.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yml::from_str(yaml)?
        };
        config.logging.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Reject values the kernel cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clock.time_scale == 0 {
            return Err(ConfigError::Invalid {
                reason: "clock.time_scale must be at least 1".to_owned(),
            });
        }
        if self.clock.units_per_tick == 0 {
            return Err(ConfigError::Invalid {
                reason: "clock.units_per_tick must be at least 1".to_owned(),
            });
        }
        if self.engine.max_events_per_drain == 0 {
            return Err(ConfigError::Invalid {
                reason: "engine.max_events_per_drain must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

/// Simulated clock configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClockConfig {
    /// Simulated time the clock starts at and resets to.
    #[serde(default = "default_start_time")]
    pub start_time: NaiveDateTime,

    /// Multiplier applied to every advance.
    #[serde(default = "default_time_scale")]
    pub time_scale: u32,

    /// Calendar unit of one tick.
    #[serde(default = "default_time_unit")]
    pub unit: TimeUnit,

    /// Number of units one tick advances.
    #[serde(default = "default_units_per_tick")]
    pub units_per_tick: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            start_time: default_start_time(),
            time_scale: default_time_scale(),
            unit: default_time_unit(),
            units_per_tick: default_units_per_tick(),
        }
    }
}

/// Engine loop configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Real milliseconds slept between ticks while running.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Real milliseconds slept per idle cycle while paused.
    #[serde(default = "default_paused_interval_ms")]
    pub paused_interval_ms: u64,

    /// Upper bound on how long `stop()` waits for the loop thread.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    /// Maximum ticks before the loop stops itself (0 = unlimited).
    #[serde(default)]
    pub max_ticks: u64,

    /// Stop the loop when the population becomes empty.
    #[serde(default = "default_true")]
    pub stop_on_extinction: bool,

    /// Priority of the time-change event emitted each tick.
    #[serde(default = "default_time_change_priority")]
    pub time_change_priority: i32,

    /// Maximum events one drain may dispatch before it is aborted.
    #[serde(default = "default_max_events_per_drain")]
    pub max_events_per_drain: usize,
}

impl EngineConfig {
    /// Sleep between ticks while running.
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Sleep per idle cycle while paused.
    pub const fn paused_interval(&self) -> Duration {
        Duration::from_millis(self.paused_interval_ms)
    }

    /// Bounded wait for the loop thread on stop.
    pub const fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            paused_interval_ms: default_paused_interval_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            max_ticks: 0,
            stop_on_extinction: true,
            time_change_priority: default_time_change_priority(),
            max_events_per_drain: default_max_events_per_drain(),
        }
    }
}

/// Initial population configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PopulationConfig {
    /// Number of individuals seeded at startup.
    #[serde(default = "default_initial_inhabitants")]
    pub initial_inhabitants: u32,

    /// Random seed for reproducible seeding.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Age in years at which the aging processor schedules a death.
    #[serde(default = "default_max_age_years")]
    pub max_age_years: u32,

    /// Region assigned to seeded individuals.
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for PopulationConfig {
    fn default() -> Self {
        Self {
            initial_inhabitants: default_initial_inhabitants(),
            seed: default_seed(),
            max_age_years: default_max_age_years(),
            region: default_region(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    /// Override the level with `POPSIM_LOG_LEVEL` when set.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("POPSIM_LOG_LEVEL") {
            self.level = val;
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

fn default_start_time() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1900, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

const fn default_time_scale() -> u32 {
    1
}

const fn default_time_unit() -> TimeUnit {
    TimeUnit::Day
}

const fn default_units_per_tick() -> u32 {
    1
}

const fn default_tick_interval_ms() -> u64 {
    10
}

const fn default_paused_interval_ms() -> u64 {
    100
}

const fn default_stop_timeout_ms() -> u64 {
    5_000
}

const fn default_time_change_priority() -> i32 {
    1_000
}

const fn default_max_events_per_drain() -> usize {
    100_000
}

const fn default_initial_inhabitants() -> u32 {
    100
}

const fn default_seed() -> u64 {
    42
}

const fn default_max_age_years() -> u32 {
    90
}

fn default_region() -> String {
    "homeland".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = SimulationConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.clock.unit, TimeUnit::Day);
        assert_eq!(config.clock.time_scale, 1);
        assert_eq!(config.engine.stop_timeout_ms, 5_000);
        assert!(config.engine.stop_on_extinction);
        assert_eq!(config.population.initial_inhabitants, 100);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
clock:
  start_time: "1850-06-01T00:00:00"
  time_scale: 2
  unit: month
  units_per_tick: 3

engine:
  tick_interval_ms: 5
  paused_interval_ms: 50
  stop_timeout_ms: 1000
  max_ticks: 120
  stop_on_extinction: false
  time_change_priority: 500
  max_events_per_drain: 10

population:
  initial_inhabitants: 12
  seed: 7
  max_age_years: 70
  region: "valley"

logging:
  level: "debug"
  json: true
"#;

        let config = SimulationConfig::parse(yaml);
        assert!(config.is_ok(), "{config:?}");
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.clock.unit, TimeUnit::Month);
        assert_eq!(config.clock.units_per_tick, 3);
        assert_eq!(
            config.clock.start_time.date(),
            NaiveDate::from_ymd_opt(1850, 6, 1).unwrap_or_default()
        );
        assert_eq!(config.engine.max_ticks, 120);
        assert!(!config.engine.stop_on_extinction);
        assert_eq!(config.engine.tick_interval(), Duration::from_millis(5));
        assert_eq!(config.population.region, "valley");
        assert!(config.logging.json);
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = "engine:\n  max_ticks: 3\n";
        let config = SimulationConfig::parse(yaml);
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.engine.max_ticks, 3);
        assert_eq!(config.engine.tick_interval_ms, 10);
        assert_eq!(config.clock.units_per_tick, 1);
    }

    #[test]
    fn parse_empty_yaml() {
        assert!(SimulationConfig::parse("").is_ok());
    }

    #[test]
    fn zero_time_scale_is_invalid() {
        let yaml = "clock:\n  time_scale: 0\n";
        let result = SimulationConfig::parse(yaml);
        assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn unknown_unit_is_a_yaml_error() {
        let yaml = "clock:\n  unit: fortnight\n";
        let result = SimulationConfig::parse(yaml);
        assert!(matches!(result, Err(ConfigError::Yaml { .. })));
    }

    #[test]
    fn load_project_config_file() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("popsim-config.yaml");
        if path.exists() {
            let config = SimulationConfig::from_file(&path);
            assert!(config.is_ok(), "Failed to load project config: {config:?}");
        }
    }
}
