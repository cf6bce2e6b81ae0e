// CLASSIFICATION: COMMUNITY
// Filename: timer.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Millisecond clocks and the non-blocking dwell timer.
//!
//! Time is a wrapping 32-bit millisecond counter, so elapsed time is always
//! computed with `wrapping_sub` and stays correct across the wrap.

use core::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

/// Source of the millisecond tick.
pub trait Clock: Send + Sync {
    /// Current tick in milliseconds. Wraps after about 49 days.
    fn now_millis(&self) -> u32;
}

/// Wall clock measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u32 {
        // truncation is the wrap
        self.origin.elapsed().as_millis() as u32
    }
}

/// Clock advanced by hand, for tests and simulation.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU32,
}

impl ManualClock {
    /// Clock reading `start`.
    pub fn new(start: u32) -> Self {
        Self {
            now: AtomicU32::new(start),
        }
    }

    /// Move time forward by `millis`.
    pub fn advance(&self, millis: u32) {
        let now = self.now.load(Ordering::Relaxed);
        self.now.store(now.wrapping_add(millis), Ordering::Relaxed);
    }

    /// Jump to `millis`.
    pub fn set(&self, millis: u32) {
        self.now.store(millis, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u32 {
        self.now.load(Ordering::Relaxed)
    }
}

/// One-shot timer behind `dwell`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DwellTimer {
    started_at: Option<u32>,
}

impl DwellTimer {
    pub const fn new() -> Self {
        Self { started_at: None }
    }

    /// Poll the timer. The first call starts it and returns false; later
    /// calls return true once `duration_ms` has elapsed, resetting the timer
    /// for the next dwell.
    pub fn poll(&mut self, now: u32, duration_ms: u32) -> bool {
        match self.started_at {
            None => {
                self.started_at = Some(now);
                false
            }
            Some(start) if now.wrapping_sub(start) >= duration_ms => {
                self.started_at = None;
                true
            }
            Some(_) => false,
        }
    }

    /// A dwell is in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Abandon any dwell in progress.
    pub fn cancel(&mut self) {
        self.started_at = None;
    }
}
