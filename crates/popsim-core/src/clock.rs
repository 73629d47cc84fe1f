//! Simulated clock for the popsim kernel.
//!
//! The clock is the single source of truth for simulated time. It owns
//! the current timestamp, the start timestamp it resets to, an integer
//! time scale, and the run/pause flags that gate advancement.
//!
//! # Design Principles
//!
//! - Time only moves while the clock is running and not paused. Advancing
//!   a stopped or paused clock is a no-op that reports the unchanged time.
//! - All calendar arithmetic is checked; leaving chrono's representable
//!   range is a [`ClockError::Overflow`], never a panic.
//! - Every method takes `&self`. State sits behind a reader-writer lock so
//!   the engine loop and external callers can share one clock: readers do
//!   not block each other, writers are exclusive.

use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{Days, Months, NaiveDateTime, TimeDelta};
use popsim_types::TimeUnit;

use crate::config::ClockConfig;

/// Months in one calendar year.
const MONTHS_PER_YEAR: u32 = 12;

/// Errors that can occur during clock operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClockError {
    /// The current time cannot be set while the clock is running.
    #[error("cannot set the current time while the clock is running")]
    Running,

    /// Advancing would leave the representable calendar range.
    #[error("clock overflow advancing {amount} {unit:?} from {from}")]
    Overflow {
        /// Time the advance started from.
        from: NaiveDateTime,
        /// Scaled number of units requested.
        amount: i64,
        /// Unit of the requested advance.
        unit: TimeUnit,
    },

    /// Invalid clock configuration (e.g. a zero time scale).
    #[error("invalid clock configuration: {reason}")]
    InvalidConfig {
        /// Explanation of what is wrong with the configuration.
        reason: String,
    },
}

/// Lock-protected clock fields.
#[derive(Debug, Clone, Copy)]
struct ClockState {
    start_time: NaiveDateTime,
    current_time: NaiveDateTime,
    time_scale: u32,
    running: bool,
    paused: bool,
}

impl ClockState {
    const fn can_advance(&self) -> bool {
        self.running && !self.paused
    }
}

/// Thread-safe simulated clock.
#[derive(Debug)]
pub struct SimulationClock {
    state: RwLock<ClockState>,
}

impl SimulationClock {
    /// Create a stopped clock positioned at `start_time`.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if `time_scale` is 0.
    pub fn new(start_time: NaiveDateTime, time_scale: u32) -> Result<Self, ClockError> {
        validate_scale(time_scale)?;
        Ok(Self {
            state: RwLock::new(ClockState {
                start_time,
                current_time: start_time,
                time_scale,
                running: false,
                paused: false,
            }),
        })
    }

    /// Create a clock from the `clock` configuration section.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if the configured scale is 0.
    pub fn from_config(config: &ClockConfig) -> Result<Self, ClockError> {
        Self::new(config.start_time, config.time_scale)
    }

    // The guarded state is plain `Copy` data that is written in a single
    // assignment, so a poisoned lock still holds a consistent value.
    fn read(&self) -> RwLockReadGuard<'_, ClockState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, ClockState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Run flags
    // -----------------------------------------------------------------------

    /// Mark the clock running and unpaused.
    pub fn start(&self) {
        let mut state = self.write();
        state.running = true;
        state.paused = false;
    }

    /// Mark the clock stopped. Also clears the pause flag.
    pub fn stop(&self) {
        let mut state = self.write();
        state.running = false;
        state.paused = false;
    }

    /// Pause advancement.
    pub fn pause(&self) {
        self.write().paused = true;
    }

    /// Resume advancement.
    pub fn resume(&self) {
        self.write().paused = false;
    }

    /// Whether the clock is running (paused or not).
    pub fn is_running(&self) -> bool {
        self.read().running
    }

    /// Whether the clock is paused.
    pub fn is_paused(&self) -> bool {
        self.read().paused
    }

    // -----------------------------------------------------------------------
    // Time accessors
    // -----------------------------------------------------------------------

    /// Current simulated time.
    pub fn current_time(&self) -> NaiveDateTime {
        self.read().current_time
    }

    /// Time the clock was created at and resets to.
    pub fn start_time(&self) -> NaiveDateTime {
        self.read().start_time
    }

    /// Simulated time elapsed since the start time.
    pub fn elapsed(&self) -> TimeDelta {
        let state = self.read();
        state.current_time.signed_duration_since(state.start_time)
    }

    /// Current time scale multiplier.
    pub fn time_scale(&self) -> u32 {
        self.read().time_scale
    }

    /// Replace the time scale multiplier.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidConfig`] if `time_scale` is 0.
    pub fn set_time_scale(&self, time_scale: u32) -> Result<(), ClockError> {
        validate_scale(time_scale)?;
        self.write().time_scale = time_scale;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Advance by `duration` multiplied by the time scale.
    ///
    /// Returns the (possibly unchanged) current time. Does nothing unless
    /// the clock is running and not paused; negative durations are ignored
    /// so time never moves backwards.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Overflow`] if the result is out of range.
    pub fn advance(&self, duration: TimeDelta) -> Result<NaiveDateTime, ClockError> {
        let mut state = self.write();
        if !state.can_advance() || duration <= TimeDelta::zero() {
            return Ok(state.current_time);
        }
        let overflow = || ClockError::Overflow {
            from: state.current_time,
            amount: duration.num_seconds(),
            unit: TimeUnit::Day,
        };
        let scale = i32::try_from(state.time_scale).map_err(|_err| overflow())?;
        let scaled = duration.checked_mul(scale).ok_or_else(overflow)?;
        let next = state
            .current_time
            .checked_add_signed(scaled)
            .ok_or_else(overflow)?;
        state.current_time = next;
        Ok(next)
    }

    /// Advance by `units` calendar units multiplied by the time scale.
    ///
    /// Same gating as [`advance`](Self::advance).
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Overflow`] if the result is out of range.
    pub fn advance_units(&self, units: u32, unit: TimeUnit) -> Result<NaiveDateTime, ClockError> {
        let mut state = self.write();
        if !state.can_advance() || units == 0 {
            return Ok(state.current_time);
        }
        let from = state.current_time;
        let overflow = || ClockError::Overflow {
            from,
            amount: i64::from(units).saturating_mul(i64::from(state.time_scale)),
            unit,
        };
        let amount = units.checked_mul(state.time_scale).ok_or_else(overflow)?;
        let next = match unit {
            TimeUnit::Day => from.checked_add_days(Days::new(u64::from(amount))),
            TimeUnit::Month => from.checked_add_months(Months::new(amount)),
            TimeUnit::Year => amount
                .checked_mul(MONTHS_PER_YEAR)
                .and_then(|months| from.checked_add_months(Months::new(months))),
        }
        .ok_or_else(overflow)?;
        state.current_time = next;
        Ok(next)
    }

    /// Jump to `time`. Only legal while the clock is not running.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::Running`] if the clock is running.
    pub fn set_current_time(&self, time: NaiveDateTime) -> Result<(), ClockError> {
        let mut state = self.write();
        if state.running {
            return Err(ClockError::Running);
        }
        state.current_time = time;
        Ok(())
    }

    /// Return to the start time and clear the run/pause flags.
    pub fn reset(&self) {
        let mut state = self.write();
        state.current_time = state.start_time;
        state.running = false;
        state.paused = false;
    }
}

fn validate_scale(time_scale: u32) -> Result<(), ClockError> {
    if time_scale == 0 {
        return Err(ClockError::InvalidConfig {
            reason: "time_scale must be at least 1".to_owned(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use chrono::NaiveDate;

    use super::*;

    fn t0() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(1900, 1, 31)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn running_clock() -> SimulationClock {
        let clock = SimulationClock::new(t0(), 1).unwrap();
        clock.start();
        clock
    }

    #[test]
    fn clock_starts_stopped_at_start_time() {
        let clock = SimulationClock::new(t0(), 1).unwrap();
        assert_eq!(clock.current_time(), t0());
        assert!(!clock.is_running());
        assert!(!clock.is_paused());
    }

    #[test]
    fn zero_scale_is_rejected() {
        assert!(SimulationClock::new(t0(), 0).is_err());
        let clock = SimulationClock::new(t0(), 1).unwrap();
        assert!(clock.set_time_scale(0).is_err());
        assert_eq!(clock.time_scale(), 1);
    }

    #[test]
    fn advance_is_noop_while_stopped() {
        let clock = SimulationClock::new(t0(), 1).unwrap();
        let now = clock.advance_units(3, TimeUnit::Day).unwrap();
        assert_eq!(now, t0());
        let now = clock.advance(TimeDelta::days(1)).unwrap();
        assert_eq!(now, t0());
    }

    #[test]
    fn advance_is_noop_while_paused() {
        let clock = running_clock();
        clock.pause();
        assert_eq!(clock.advance_units(1, TimeUnit::Year).unwrap(), t0());
        clock.resume();
        assert_eq!(
            clock.advance_units(1, TimeUnit::Day).unwrap(),
            t0() + TimeDelta::days(1)
        );
    }

    #[test]
    fn month_advance_clamps_to_month_end() {
        let clock = running_clock();
        let now = clock.advance_units(1, TimeUnit::Month).unwrap();
        assert_eq!(now.date(), NaiveDate::from_ymd_opt(1900, 2, 28).unwrap());
    }

    #[test]
    fn year_advance_adds_twelve_months() {
        let clock = running_clock();
        let now = clock.advance_units(2, TimeUnit::Year).unwrap();
        assert_eq!(now.date(), NaiveDate::from_ymd_opt(1902, 1, 31).unwrap());
    }

    #[test]
    fn time_scale_multiplies_advances() {
        let clock = SimulationClock::new(t0(), 7).unwrap();
        clock.start();
        let now = clock.advance_units(1, TimeUnit::Day).unwrap();
        assert_eq!(now, t0() + TimeDelta::days(7));
        let now = clock.advance(TimeDelta::hours(1)).unwrap();
        assert_eq!(now, t0() + TimeDelta::days(7) + TimeDelta::hours(7));
        assert_eq!(clock.elapsed(), TimeDelta::days(7) + TimeDelta::hours(7));
    }

    #[test]
    fn time_is_monotonic_under_mixed_advances() {
        let clock = running_clock();
        let mut last = clock.current_time();
        for step in 0..50_u32 {
            let now = match step % 4 {
                0 => clock.advance_units(1, TimeUnit::Day).unwrap(),
                1 => clock.advance(TimeDelta::hours(-3)).unwrap(),
                2 => clock.advance_units(0, TimeUnit::Month).unwrap(),
                _ => clock.advance_units(1, TimeUnit::Month).unwrap(),
            };
            assert!(now >= last);
            last = now;
        }
    }

    #[test]
    fn set_current_time_fails_while_running() {
        let clock = running_clock();
        let later = t0() + TimeDelta::days(10);
        assert_eq!(clock.set_current_time(later), Err(ClockError::Running));
        clock.pause();
        assert_eq!(clock.set_current_time(later), Err(ClockError::Running));
        clock.stop();
        assert!(clock.set_current_time(later).is_ok());
        assert_eq!(clock.current_time(), later);
    }

    #[test]
    fn stop_clears_pause() {
        let clock = running_clock();
        clock.pause();
        clock.stop();
        assert!(!clock.is_paused());
        assert!(!clock.is_running());
    }

    #[test]
    fn reset_restores_start_time() {
        let clock = running_clock();
        let _ = clock.advance_units(5, TimeUnit::Year).unwrap();
        clock.pause();
        clock.reset();
        assert_eq!(clock.current_time(), t0());
        assert!(!clock.is_running());
        assert!(!clock.is_paused());
    }

    #[test]
    fn overflow_is_an_error() {
        let clock = SimulationClock::new(NaiveDateTime::MAX, 1).unwrap();
        clock.start();
        let result = clock.advance_units(1, TimeUnit::Day);
        assert!(matches!(result, Err(ClockError::Overflow { .. })));
        assert_eq!(clock.current_time(), NaiveDateTime::MAX);
    }

    #[test]
    fn concurrent_readers_see_monotonic_time() {
        let clock = Arc::new(running_clock());
        let reader = {
            let clock = Arc::clone(&clock);
            std::thread::spawn(move || {
                let mut last = clock.current_time();
                for _ in 0..1_000 {
                    let now = clock.current_time();
                    assert!(now >= last);
                    last = now;
                }
            })
        };
        for _ in 0..1_000 {
            let _ = clock.advance_units(1, TimeUnit::Day).unwrap();
        }
        reader.join().unwrap();
        assert_eq!(clock.current_time(), t0() + TimeDelta::days(1_000));
    }
}
