//! Cancellation and wake-up signal shared by the engine and its loop.
//!
//! The loop checks an atomic stop flag once per cycle and sleeps between
//! cycles on a condition variable. `request_stop` and `wake` both notify
//! the condition variable, so a sleeping loop reacts to `stop()` or
//! `resume()` immediately instead of finishing its sleep.
//!
//! The engine creates a fresh signal for every run. A loop thread that
//! outlives a timed-out `stop()` keeps observing its own raised flag and
//! cannot be revived by a later `start()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Stop flag plus an interruptible sleep.
#[derive(Debug, Default)]
pub struct LoopSignal {
    stop_requested: AtomicBool,
    /// Wake generation, bumped by every notification.
    generation: Mutex<u64>,
    condvar: Condvar,
}

impl LoopSignal {
    /// Create a signal with the stop flag lowered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the stop flag and wake the loop.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.notify();
    }

    /// Whether a stop has been requested.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Wake a sleeping loop without stopping it.
    pub fn wake(&self) {
        self.notify();
    }

    /// Sleep up to `duration`. Returns early on [`wake`](Self::wake) or
    /// [`request_stop`](Self::request_stop). Returns `true` if the sleep
    /// was interrupted.
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_stop_requested() {
            return true;
        }
        let guard = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let started = *guard;
        let (_guard, timeout) = self
            .condvar
            .wait_timeout_while(guard, duration, |generation| {
                *generation == started && !self.is_stop_requested()
            })
            .unwrap_or_else(PoisonError::into_inner);
        !timeout.timed_out()
    }

    fn notify(&self) {
        let mut generation = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
        self.condvar.notify_all();
    }
}
