//! Simulation engine: lifecycle state machine and background tick loop.
//!
//! The engine composes the [`SimulationClock`], the [`EventScheduler`], the
//! [`ProcessorRegistry`], and a [`PopulationProvider`]. External callers
//! drive it through `start`, `pause`, `resume`, `stop`, and `reset` from
//! any thread; a single background thread advances simulated time and
//! drains due events.
//!
//! # State machine
//!
//! ```text
//! Stopped --start--> Running --pause--> Paused
//!    ^                  |  ^--resume------|
//!    +------stop--------+-----stop--------+
//! any --reset--> Stopped
//! ```
//!
//! Illegal calls fail with [`EngineError::InvalidTransition`] and leave the
//! state untouched. `stop` from `Stopped` succeeds without doing anything.
//! Lifecycle calls from different threads run one at a time, so a `stop`
//! returns only once the loop it ended has exited.
//!
//! # Loop
//!
//! Each cycle reads the state once. While running it advances the clock by
//! one configured step, schedules a time-change event carrying the living
//! population, drains everything due, and sleeps `tick_interval`. While
//! paused it sleeps `paused_interval`. The loop stops the engine on its
//! own when the population dies out or the tick limit is reached. Errors
//! and panics escaping a tick are fatal to the run: they are logged,
//! recorded, and force the engine to `Stopped`.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use chrono::NaiveDateTime;
use popsim_types::{EngineState, Event, EventId, EventPayload, TimeUnit};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::clock::{ClockError, SimulationClock};
use crate::config::{EngineConfig, SimulationConfig};
use crate::control::LoopSignal;
use crate::population::PopulationProvider;
use crate::processor::EventProcessor;
use crate::registry::ProcessorRegistry;
use crate::scheduler::{self, DrainError, DrainReport, EventScheduler, SchedulingError};

/// Name given to the background loop thread.
const LOOP_THREAD_NAME: &str = "popsim-engine";

/// Poll interval of [`SimulationEngine::wait_until_stopped`].
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Errors returned by engine lifecycle calls.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The call is not legal in the current state.
    #[error("cannot {operation} while {state}")]
    InvalidTransition {
        /// The rejected operation.
        operation: &'static str,
        /// State the engine was in.
        state: EngineState,
    },

    /// A clock operation failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// An event was rejected by the scheduler.
    #[error("scheduling error: {source}")]
    Scheduling {
        /// The underlying scheduling error.
        #[from]
        source: SchedulingError,
    },

    /// The loop thread could not be spawned.
    #[error("failed to spawn engine loop thread: {source}")]
    Spawn {
        /// The underlying I/O error.
        source: std::io::Error,
    },
}

/// An error that escaped a tick and ended the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoopError {
    /// Advancing the clock failed.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// The tick's time-change event was rejected.
    #[error("scheduling error: {source}")]
    Scheduling {
        /// The underlying scheduling error.
        #[from]
        source: SchedulingError,
    },

    /// The drain was aborted.
    #[error("drain error: {source}")]
    Drain {
        /// The underlying drain error.
        #[from]
        source: DrainError,
    },

    /// Code inside the tick panicked.
    #[error("tick panicked: {message}")]
    Panicked {
        /// Panic message, when it was a string.
        message: String,
    },
}

/// Why the most recent run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    /// A caller invoked `stop` or `reset`.
    OperatorStop,
    /// The population became empty.
    Extinction,
    /// The configured tick limit was reached.
    MaxTicksReached,
    /// An error escaped a tick.
    Fatal,
}

/// Counters accumulated since construction or the last reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Completed ticks.
    pub ticks: u64,
    /// Events dispatched across all drains.
    pub events_dispatched: u64,
    /// Processor invocations that failed.
    pub processor_failures: u64,
}

#[derive(Debug, Default)]
struct EngineCounters {
    ticks: AtomicU64,
    events_dispatched: AtomicU64,
    processor_failures: AtomicU64,
}

impl EngineCounters {
    /// Record one completed tick. Returns the new tick count.
    fn record(&self, report: &DrainReport) -> u64 {
        let dispatched = u64::try_from(report.dispatched).unwrap_or(u64::MAX);
        let failures = u64::try_from(report.processor_failures).unwrap_or(u64::MAX);
        self.events_dispatched.fetch_add(dispatched, Ordering::AcqRel);
        self.processor_failures.fetch_add(failures, Ordering::AcqRel);
        self.ticks.fetch_add(1, Ordering::AcqRel).saturating_add(1)
    }

    fn snapshot(&self) -> EngineStats {
        EngineStats {
            ticks: self.ticks.load(Ordering::Acquire),
            events_dispatched: self.events_dispatched.load(Ordering::Acquire),
            processor_failures: self.processor_failures.load(Ordering::Acquire),
        }
    }

    fn reset(&self) {
        self.ticks.store(0, Ordering::Release);
        self.events_dispatched.store(0, Ordering::Release);
        self.processor_failures.store(0, Ordering::Release);
    }
}

/// Outcome of one tick.
enum TickOutcome {
    Continue,
    Halt(HaltReason),
}

/// State shared between the engine handle and its loop thread.
struct EngineShared {
    state: RwLock<EngineState>,
    clock: Arc<SimulationClock>,
    scheduler: Arc<EventScheduler>,
    registry: ProcessorRegistry,
    population: Arc<dyn PopulationProvider>,
    config: EngineConfig,
    unit: TimeUnit,
    units_per_tick: u32,
    counters: EngineCounters,
    halt_reason: Mutex<Option<HaltReason>>,
    last_fatal: Mutex<Option<LoopError>>,
}

impl EngineShared {
    fn state(&self) -> EngineState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_halt_reason(&self, reason: HaltReason) {
        *self
            .halt_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason);
    }

    fn tick(&self) -> Result<TickOutcome, LoopError> {
        let previous = self.clock.current_time();
        let current = self.clock.advance_units(self.units_per_tick, self.unit)?;
        if current == previous {
            // Paused or stopped between the state read and the advance.
            return Ok(TickOutcome::Continue);
        }

        let event = Event::new(
            EventPayload::TimeChange {
                previous,
                current,
                unit: self.unit,
                population: self.population.living(),
            },
            current,
        )
        .with_priority(self.config.time_change_priority);
        self.scheduler.schedule_event(event)?;

        let report = self.scheduler.process_events(current)?;
        let ticks = self.counters.record(&report);
        let alive = self.population.living_count();
        debug!(
            tick = ticks,
            %current,
            dispatched = report.dispatched,
            processor_failures = report.processor_failures,
            alive,
            "Tick complete"
        );

        if self.config.stop_on_extinction && alive == 0 {
            info!(tick = ticks, %current, "Population extinct");
            return Ok(TickOutcome::Halt(HaltReason::Extinction));
        }
        if self.config.max_ticks > 0 && ticks >= self.config.max_ticks {
            info!(tick = ticks, max_ticks = self.config.max_ticks, "Tick limit reached");
            return Ok(TickOutcome::Halt(HaltReason::MaxTicksReached));
        }
        Ok(TickOutcome::Continue)
    }

    /// Stop the engine from inside the loop. Does nothing if a caller has
    /// already requested a stop for this run.
    fn halt(&self, signal: &LoopSignal, reason: HaltReason) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if signal.is_stop_requested() {
            return;
        }
        signal.request_stop();
        self.clock.stop();
        *state = EngineState::Stopped;
        self.set_halt_reason(reason);
        info!(?reason, "Engine stopped by loop");
    }

    fn run_loop(&self, signal: &LoopSignal) {
        info!("Engine loop started");
        while !signal.is_stop_requested() {
            match self.state() {
                EngineState::Stopped => break,
                EngineState::Paused => {
                    signal.sleep(self.config.paused_interval());
                }
                EngineState::Running => {
                    let outcome = catch_unwind(AssertUnwindSafe(|| self.tick())).unwrap_or_else(
                        |payload| {
                            Err(LoopError::Panicked {
                                message: scheduler::panic_message(payload.as_ref()),
                            })
                        },
                    );
                    match outcome {
                        Ok(TickOutcome::Continue) => {
                            signal.sleep(self.config.tick_interval());
                        }
                        Ok(TickOutcome::Halt(reason)) => {
                            self.halt(signal, reason);
                            break;
                        }
                        Err(err) => {
                            error!(error = %err, "Fatal error in engine loop; stopping");
                            *self
                                .last_fatal
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner) = Some(err);
                            self.halt(signal, HaltReason::Fatal);
                            break;
                        }
                    }
                }
            }
        }
        info!("Engine loop exited");
    }
}

/// Handle to a running loop thread.
struct LoopWorker {
    handle: JoinHandle<()>,
    signal: Arc<LoopSignal>,
    /// Disconnects when the loop thread exits.
    exited: Receiver<()>,
    thread_id: ThreadId,
}

impl LoopWorker {
    /// Wait up to `timeout` for the thread to exit, then join it. Detaches
    /// the thread if it does not exit in time.
    fn join(self, timeout: Duration) {
        if std::thread::current().id() == self.thread_id {
            debug!("stop called from the loop thread; not joining");
            return;
        }
        match self.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    warn!("Engine loop thread panicked outside a tick");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Engine loop did not exit in time; detaching"
                );
            }
        }
    }
}

/// The discrete-event simulation engine.
pub struct SimulationEngine {
    shared: Arc<EngineShared>,
    worker: Mutex<Option<LoopWorker>>,
    /// Held for the whole of each lifecycle call so transitions never
    /// interleave.
    lifecycle: Mutex<()>,
    /// Thread running the most recently started loop.
    loop_thread: Mutex<Option<ThreadId>>,
}

impl core::fmt::Debug for SimulationEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SimulationEngine")
            .field("state", &self.state())
            .field("current_time", &self.current_time())
            .field("pending_events", &self.shared.scheduler.event_count())
            .finish_non_exhaustive()
    }
}

impl SimulationEngine {
    /// Build an engine from configuration, a population provider, and the
    /// full processor set. The processors are registered immediately.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Clock`] if the clock configuration is invalid.
    pub fn new(
        config: &SimulationConfig,
        population: Arc<dyn PopulationProvider>,
        processors: Vec<Arc<dyn EventProcessor>>,
    ) -> Result<Self, EngineError> {
        let clock = Arc::new(SimulationClock::from_config(&config.clock)?);
        let scheduler = Arc::new(EventScheduler::with_drain_limit(
            config.engine.max_events_per_drain,
        ));
        let registry = ProcessorRegistry::new(Arc::clone(&scheduler), processors);
        registry.register_all_processors();

        info!(
            start_time = %clock.start_time(),
            unit = ?config.clock.unit,
            units_per_tick = config.clock.units_per_tick,
            time_scale = clock.time_scale(),
            "Engine created"
        );

        Ok(Self {
            shared: Arc::new(EngineShared {
                state: RwLock::new(EngineState::Stopped),
                clock,
                scheduler,
                registry,
                population,
                config: config.engine.clone(),
                unit: config.clock.unit,
                units_per_tick: config.clock.units_per_tick,
                counters: EngineCounters::default(),
                halt_reason: Mutex::new(None),
                last_fatal: Mutex::new(None),
            }),
            worker: Mutex::new(None),
            lifecycle: Mutex::new(()),
            loop_thread: Mutex::new(None),
        })
    }

    fn worker(&self) -> MutexGuard<'_, Option<LoopWorker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_loop_thread(&self) -> bool {
        *self
            .loop_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            == Some(std::thread::current().id())
    }

    /// Serialize a lifecycle call. A processor calling back into the engine
    /// from the loop thread gets no guard: the caller holding the lock may
    /// be waiting for that very thread to exit.
    fn lifecycle(&self) -> Option<MutexGuard<'_, ()>> {
        if self.on_loop_thread() {
            return None;
        }
        Some(self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner))
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Start the background loop. Legal only from `Stopped`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] if not stopped, or
    /// [`EngineError::Spawn`] if the loop thread cannot be created.
    pub fn start(&self) -> Result<(), EngineError> {
        let _lifecycle = self.lifecycle();
        let mut state = self
            .shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if *state != EngineState::Stopped {
            return Err(EngineError::InvalidTransition {
                operation: "start",
                state: *state,
            });
        }

        let mut worker = self.worker();
        if let Some(previous) = worker.take() {
            // A loop that stopped itself leaves its handle behind.
            previous.join(self.shared.config.stop_timeout());
        }

        *state = EngineState::Running;
        self.shared.clock.start();
        *self
            .shared
            .last_fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        *self
            .shared
            .halt_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;

        let signal = Arc::new(LoopSignal::new());
        let (exit_tx, exit_rx) = mpsc::channel::<()>();
        let shared = Arc::clone(&self.shared);
        let loop_signal = Arc::clone(&signal);
        let spawned = std::thread::Builder::new()
            .name(LOOP_THREAD_NAME.to_owned())
            .spawn(move || {
                let _exit = exit_tx;
                shared.run_loop(&loop_signal);
            });

        match spawned {
            Ok(handle) => {
                let thread_id = handle.thread().id();
                *self
                    .loop_thread
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(thread_id);
                *worker = Some(LoopWorker {
                    handle,
                    signal,
                    exited: exit_rx,
                    thread_id,
                });
                info!(current_time = %self.shared.clock.current_time(), "Engine started");
                Ok(())
            }
            Err(source) => {
                *state = EngineState::Stopped;
                self.shared.clock.stop();
                Err(EngineError::Spawn { source })
            }
        }
    }

    /// Stop the loop and wait (bounded) for its thread. A no-op from
    /// `Stopped`. Always ends in `Stopped`, even if the thread does not
    /// exit within the configured timeout.
    ///
    /// # Errors
    ///
    /// Currently infallible; the `Result` keeps the lifecycle surface
    /// uniform.
    pub fn stop(&self) -> Result<(), EngineError> {
        let _lifecycle = self.lifecycle();
        self.stop_locked();
        Ok(())
    }

    /// Body of [`stop`](Self::stop); the caller holds the lifecycle guard.
    fn stop_locked(&self) {
        if self.state() == EngineState::Stopped {
            return;
        }

        let mut slot = self.worker();
        if let Some(worker) = slot.as_ref() {
            worker.signal.request_stop();
        }
        self.shared.clock.stop();
        // From the loop thread the handle stays put: the loop exits after
        // the current dispatch and the next start joins it.
        let worker = if self.on_loop_thread() {
            None
        } else {
            slot.take()
        };
        drop(slot);
        if let Some(worker) = worker {
            worker.join(self.shared.config.stop_timeout());
        }

        *self
            .shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner) = EngineState::Stopped;
        self.shared
            .halt_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_or_insert(HaltReason::OperatorStop);
        info!(current_time = %self.shared.clock.current_time(), "Engine stopped");
    }

    /// Pause time advancement. Legal only from `Running`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] from any other state.
    pub fn pause(&self) -> Result<(), EngineError> {
        let _lifecycle = self.lifecycle();
        let mut state = self
            .shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if *state != EngineState::Running {
            return Err(EngineError::InvalidTransition {
                operation: "pause",
                state: *state,
            });
        }
        *state = EngineState::Paused;
        self.shared.clock.pause();
        info!(current_time = %self.shared.clock.current_time(), "Engine paused");
        Ok(())
    }

    /// Resume time advancement. Legal only from `Paused`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] from any other state.
    pub fn resume(&self) -> Result<(), EngineError> {
        let _lifecycle = self.lifecycle();
        let mut state = self
            .shared
            .state
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if *state != EngineState::Paused {
            return Err(EngineError::InvalidTransition {
                operation: "resume",
                state: *state,
            });
        }
        *state = EngineState::Running;
        self.shared.clock.resume();
        if let Some(worker) = self.worker().as_ref() {
            worker.signal.wake();
        }
        info!(current_time = %self.shared.clock.current_time(), "Engine resumed");
        Ok(())
    }

    /// Stop if needed, then restore the initial condition: clock at its
    /// start time, empty queue, empty population, full processor set
    /// attached exactly once. Ends in `Stopped`.
    ///
    /// # Errors
    ///
    /// Currently infallible, like [`stop`](Self::stop).
    pub fn reset(&self) -> Result<(), EngineError> {
        let _lifecycle = self.lifecycle();
        self.stop_locked();
        self.shared.clock.reset();
        let dropped = self.shared.scheduler.clear();
        self.shared.population.clear();
        self.shared.registry.unregister_all_processors();
        self.shared.registry.register_all_processors();
        self.shared.counters.reset();
        *self
            .shared
            .last_fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        *self
            .shared
            .halt_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
        info!(
            dropped_events = dropped,
            start_time = %self.shared.clock.start_time(),
            "Engine reset"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Time
    // -----------------------------------------------------------------------

    /// Current simulated time.
    pub fn current_time(&self) -> NaiveDateTime {
        self.shared.clock.current_time()
    }

    /// Jump the clock to `time`. Legal only while `Stopped`.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidTransition`] unless stopped.
    pub fn set_current_time(&self, time: NaiveDateTime) -> Result<(), EngineError> {
        let state = self
            .shared
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if *state != EngineState::Stopped {
            return Err(EngineError::InvalidTransition {
                operation: "set the current time",
                state: *state,
            });
        }
        self.shared.clock.set_current_time(time)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Events and processors
    // -----------------------------------------------------------------------

    /// Queue an event.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Scheduling`] if the scheduler rejects it.
    pub fn schedule_event(&self, event: Event) -> Result<EventId, EngineError> {
        Ok(self.shared.scheduler.schedule_event(event)?)
    }

    /// Add a processor to the engine's set. It is attached immediately and
    /// re-attached after every reset.
    pub fn register_event_processor(&self, processor: Arc<dyn EventProcessor>) {
        self.shared.registry.track(processor);
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Current lifecycle state.
    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    /// Counters since construction or the last reset.
    pub fn stats(&self) -> EngineStats {
        self.shared.counters.snapshot()
    }

    /// Why the most recent run ended, if it has.
    pub fn halt_reason(&self) -> Option<HaltReason> {
        *self
            .shared
            .halt_reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// The error that ended the most recent run, if one did.
    pub fn last_fatal_error(&self) -> Option<LoopError> {
        self.shared
            .last_fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The engine's clock.
    pub fn clock(&self) -> &Arc<SimulationClock> {
        &self.shared.clock
    }

    /// The engine's scheduler.
    pub fn scheduler(&self) -> &Arc<EventScheduler> {
        &self.shared.scheduler
    }

    /// The processor set owned by the engine.
    pub fn registry(&self) -> &ProcessorRegistry {
        &self.shared.registry
    }

    /// Block until the engine reaches `Stopped` or `timeout` elapses.
    /// Returns `true` if the engine stopped.
    pub fn wait_until_stopped(&self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if self.state() == EngineState::Stopped {
                return true;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return false;
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }
}

impl Drop for SimulationEngine {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            warn!(error = %err, "Failed to stop engine on drop");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::{NaiveDate, TimeDelta};
    use popsim_types::PersonId;

    use super::*;
    use crate::population::StaticPopulation;

    fn config() -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.clock.start_time = NaiveDate::from_ymd_opt(1900, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        config.engine.tick_interval_ms = 1;
        config.engine.paused_interval_ms = 5;
        config.engine.stop_timeout_ms = 2_000;
        config
    }

    fn engine_with(config: &SimulationConfig, people: usize) -> SimulationEngine {
        let population = Arc::new(StaticPopulation::new(
            (0..people).map(|_| PersonId::new()).collect(),
        ));
        SimulationEngine::new(config, population, Vec::new()).unwrap()
    }

    #[test]
    fn new_engine_is_stopped_at_start_time() {
        let config = config();
        let engine = engine_with(&config, 1);
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.current_time(), config.clock.start_time);
        assert_eq!(engine.stats(), EngineStats::default());
    }

    #[test]
    fn start_twice_fails_without_changing_state() {
        let engine = engine_with(&config(), 1);
        engine.start().unwrap();
        let second = engine.start();
        assert!(matches!(
            second,
            Err(EngineError::InvalidTransition {
                operation: "start",
                state: EngineState::Running
            })
        ));
        assert_eq!(engine.state(), EngineState::Running);
        engine.stop().unwrap();
    }

    #[test]
    fn illegal_pause_and_resume_fail() {
        let engine = engine_with(&config(), 1);
        assert!(engine.pause().is_err());
        assert!(engine.resume().is_err());
        assert_eq!(engine.state(), EngineState::Stopped);

        engine.start().unwrap();
        assert!(engine.resume().is_err());
        assert_eq!(engine.state(), EngineState::Running);
        engine.stop().unwrap();
    }

    #[test]
    fn stop_from_stopped_is_a_noop() {
        let engine = engine_with(&config(), 1);
        assert!(engine.stop().is_ok());
        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.halt_reason(), None);
    }

    #[test]
    fn running_engine_advances_time() {
        let engine = engine_with(&config(), 3);
        let start = engine.current_time();
        engine.start().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.stats().ticks < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        engine.stop().unwrap();

        let stats = engine.stats();
        assert!(stats.ticks >= 3);
        // One time-change event per tick, no processors attached.
        assert_eq!(stats.events_dispatched, stats.ticks);
        let elapsed = engine.current_time().signed_duration_since(start);
        assert_eq!(elapsed, TimeDelta::days(i64::try_from(stats.ticks).unwrap()));
        assert_eq!(engine.halt_reason(), Some(HaltReason::OperatorStop));
    }

    #[test]
    fn pause_freezes_time_until_resume() {
        let engine = engine_with(&config(), 1);
        engine.start().unwrap();
        engine.pause().unwrap();
        assert!(engine.clock().is_paused());
        let frozen = engine.current_time();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(engine.current_time(), frozen);
        assert!(engine.set_current_time(frozen).is_err());

        engine.resume().unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while engine.current_time() == frozen && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(2));
        }
        assert!(engine.current_time() > frozen);
        engine.stop().unwrap();
        assert!(!engine.clock().is_running());
    }

    #[test]
    fn extinction_stops_the_loop() {
        let engine = engine_with(&config(), 0);
        engine.start().unwrap();
        assert!(engine.wait_until_stopped(Duration::from_secs(5)));
        assert_eq!(engine.halt_reason(), Some(HaltReason::Extinction));
        assert_eq!(engine.stats().ticks, 1);
        assert!(!engine.clock().is_running());
        // The engine can be started again afterwards.
        engine.start().unwrap();
        assert!(engine.wait_until_stopped(Duration::from_secs(5)));
    }

    #[test]
    fn tick_limit_stops_the_loop() {
        let mut config = config();
        config.engine.max_ticks = 4;
        let engine = engine_with(&config, 2);
        engine.start().unwrap();
        assert!(engine.wait_until_stopped(Duration::from_secs(5)));
        assert_eq!(engine.halt_reason(), Some(HaltReason::MaxTicksReached));
        assert_eq!(engine.stats().ticks, 4);
        assert_eq!(
            engine.current_time(),
            config.clock.start_time + TimeDelta::days(4)
        );
    }

    /// Provider whose snapshot panics, to force a fatal loop error.
    struct Exploding;

    impl PopulationProvider for Exploding {
        #[allow(clippy::panic)]
        fn living(&self) -> Vec<PersonId> {
            panic!("population store unavailable");
        }
        fn living_count(&self) -> usize {
            1
        }
        fn clear(&self) {}
    }

    #[test]
    fn panic_inside_a_tick_is_fatal_but_contained() {
        let engine = SimulationEngine::new(&config(), Arc::new(Exploding), Vec::new()).unwrap();
        engine.start().unwrap();
        assert!(engine.wait_until_stopped(Duration::from_secs(5)));
        assert_eq!(engine.halt_reason(), Some(HaltReason::Fatal));
        assert!(matches!(
            engine.last_fatal_error(),
            Some(LoopError::Panicked { .. })
        ));
        assert!(!engine.clock().is_running());
    }

    #[test]
    fn set_current_time_only_while_stopped() {
        let engine = engine_with(&config(), 1);
        let target = engine.current_time() + TimeDelta::days(365);
        engine.set_current_time(target).unwrap();
        assert_eq!(engine.current_time(), target);

        engine.start().unwrap();
        assert!(matches!(
            engine.set_current_time(target),
            Err(EngineError::InvalidTransition { .. })
        ));
        engine.stop().unwrap();
    }

    #[test]
    fn reset_restores_initial_condition() {
        let config = config();
        let engine = engine_with(&config, 2);
        engine.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        engine
            .schedule_event(Event::new(
                EventPayload::HealthChange {
                    person: PersonId::new(),
                    delta: 1,
                },
                config.clock.start_time + TimeDelta::days(10_000),
            ))
            .unwrap();
        engine.reset().unwrap();

        assert_eq!(engine.state(), EngineState::Stopped);
        assert_eq!(engine.current_time(), config.clock.start_time);
        assert_eq!(engine.scheduler().event_count(), 0);
        assert_eq!(engine.stats(), EngineStats::default());
        assert!(!engine.clock().is_running());
    }
}
