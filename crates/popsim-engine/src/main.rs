//! Demo binary for the popsim simulation kernel.
//!
//! Wires a seeded population store and the reference processors into a
//! [`SimulationEngine`], runs it on its background thread, and waits for a
//! termination condition.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `popsim-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Seed the initial population
//! 4. Create the engine with the reference processor set
//! 5. Schedule the opening events
//! 6. Start the engine
//! 7. Wait for Ctrl-C, the configured run duration, or the engine stopping
//!    on its own
//! 8. Stop the engine and log a summary

mod error;
mod seed;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use popsim_core::config::{LoggingConfig, SimulationConfig};
use popsim_core::engine::SimulationEngine;
use popsim_core::population::PopulationProvider;
use popsim_population::PopulationStore;
use popsim_population::processors::default_processors;
use popsim_types::EngineState;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::DemoError;
use crate::seed::DemoConfig;

/// Config file looked up in the working directory.
const CONFIG_PATH: &str = "popsim-config.yaml";

/// How often the waiter checks whether the engine stopped by itself.
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Why the demo stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunEnd {
    /// Ctrl-C was received.
    Interrupted,
    /// The configured run duration elapsed.
    DurationElapsed,
    /// The engine stopped on its own (extinction, tick limit, fatal error).
    EngineStopped,
}

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, seeding, or an engine call fails.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!("popsim-engine starting");
    info!(
        start_time = %config.clock.start_time,
        unit = ?config.clock.unit,
        units_per_tick = config.clock.units_per_tick,
        tick_interval_ms = config.engine.tick_interval_ms,
        max_ticks = config.engine.max_ticks,
        "Configuration loaded"
    );
    let demo = load_demo_config()?;

    // 3. Seed the initial population.
    let store = Arc::new(PopulationStore::new());
    let mut rng = StdRng::seed_from_u64(config.population.seed);
    let people = seed::seed_population(
        &store,
        &config.population,
        config.clock.start_time,
        &mut rng,
    )?;

    // 4. Create the engine.
    let processors = default_processors(&store, &config.population);
    let engine = Arc::new(SimulationEngine::new(
        &config,
        Arc::clone(&store) as Arc<dyn PopulationProvider>,
        processors,
    )?);

    // 5. Schedule the opening events.
    for event in seed::opening_events(&store, &people, config.clock.start_time, &demo, &mut rng)
    {
        engine.schedule_event(event)?;
    }

    // 6. Start.
    engine.start()?;

    // 7. Wait.
    let end = wait_for_end(&engine, Duration::from_secs(demo.run_seconds)).await;
    info!(?end, "Run ending");

    // 8. Stop (joins the loop thread) and summarize.
    let stopper = Arc::clone(&engine);
    tokio::task::spawn_blocking(move || stopper.stop()).await??;

    let stats = engine.stats();
    let census = store.census();
    info!(
        end_reason = ?engine.halt_reason(),
        final_time = %engine.current_time(),
        ticks = stats.ticks,
        events_dispatched = stats.events_dispatched,
        processor_failures = stats.processor_failures,
        pending_events = engine.scheduler().event_count(),
        alive = census.alive,
        deceased = census.deceased,
        emigrated = census.emigrated,
        partnered = census.partnered,
        "Simulation summary"
    );
    if let Some(err) = engine.last_fatal_error() {
        warn!(error = %err, "Run ended on a fatal loop error");
    }

    info!("popsim-engine shutdown complete");
    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` wins over the configured
/// level.
fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Wait until Ctrl-C, `run_for` elapses, or the engine leaves `Running`
/// and `Paused` by itself. A zero `run_for` waits indefinitely.
async fn wait_for_end(engine: &SimulationEngine, run_for: Duration) -> RunEnd {
    let timer = async {
        if run_for.is_zero() {
            std::future::pending::<()>().await;
        } else {
            tokio::time::sleep(run_for).await;
        }
    };
    let stopped = async {
        while engine.state() != EngineState::Stopped {
            tokio::time::sleep(STOP_POLL_INTERVAL).await;
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "failed to listen for Ctrl-C");
            }
            RunEnd::Interrupted
        }
        () = timer => RunEnd::DurationElapsed,
        () = stopped => RunEnd::EngineStopped,
    }
}

/// Load the simulation configuration from `popsim-config.yaml`.
///
/// Looks for the config file relative to the current working directory.
fn load_config() -> Result<SimulationConfig, DemoError> {
    let config_path = Path::new(CONFIG_PATH);
    if config_path.exists() {
        Ok(SimulationConfig::from_file(config_path)?)
    } else {
        Ok(SimulationConfig::parse("")?)
    }
}

/// Load the demo settings from the `demo` section of `popsim-config.yaml`.
///
/// If the file does not exist or lacks the `demo` key, defaults are used.
fn load_demo_config() -> Result<DemoConfig, DemoError> {
    let config_path = Path::new(CONFIG_PATH);
    if !config_path.exists() {
        info!("Config file not found, using default demo settings");
        return Ok(DemoConfig::default());
    }

    let contents = std::fs::read_to_string(config_path).map_err(|e| DemoError::DemoConfig {
        message: format!("failed to read config file: {e}"),
    })?;
    let raw: serde_yml::Value =
        serde_yml::from_str(&contents).map_err(|e| DemoError::DemoConfig {
            message: format!("failed to parse config YAML: {e}"),
        })?;

    match raw.get("demo") {
        Some(section) => {
            serde_yml::from_value(section.clone()).map_err(|e| DemoError::DemoConfig {
                message: format!("failed to parse demo config: {e}"),
            })
        }
        None => Ok(DemoConfig::default()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use popsim_core::population::StaticPopulation;
    use popsim_types::PersonId;

    use super::*;

    fn fast_config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.engine.tick_interval_ms = 1;
        config.engine.stop_timeout_ms = 2_000;
        config
    }

    #[tokio::test]
    async fn wait_returns_when_engine_stops_itself() {
        let engine = SimulationEngine::new(
            &fast_config(),
            Arc::new(StaticPopulation::default()),
            Vec::new(),
        )
        .unwrap();
        engine.start().unwrap();
        let end = wait_for_end(&engine, Duration::from_secs(30)).await;
        assert_eq!(end, RunEnd::EngineStopped);
    }

    #[tokio::test]
    async fn wait_returns_when_duration_elapses() {
        let engine = SimulationEngine::new(
            &fast_config(),
            Arc::new(StaticPopulation::new(vec![PersonId::new()])),
            Vec::new(),
        )
        .unwrap();
        engine.start().unwrap();
        let end = wait_for_end(&engine, Duration::from_millis(100)).await;
        assert_eq!(end, RunEnd::DurationElapsed);
        assert_eq!(engine.state(), EngineState::Running);
        engine.stop().unwrap();
    }

    #[test]
    fn demo_section_parses_with_defaults() {
        let raw: serde_yml::Value =
            serde_yml::from_str("demo:\n  run_seconds: 3\n  births: 0\n").unwrap();
        let demo: DemoConfig = serde_yml::from_value(raw.get("demo").unwrap().clone()).unwrap();
        assert_eq!(demo.run_seconds, 3);
        assert_eq!(demo.births, 0);
        assert_eq!(demo.partnerships, DemoConfig::default().partnerships);
    }
}
