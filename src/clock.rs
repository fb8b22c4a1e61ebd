//! Millisecond counter used for the input and retransmit timeouts
//!
//! The engine only ever compares two readings of a free-running 16-bit
//! millisecond counter, the same width a small MCU timer gives. The counter
//! wraps every 65536 ms, so differences are taken with wrapping subtraction.
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of the 16-bit millisecond counter
pub trait Clock {
    /// Current counter value in milliseconds, modulo 65536
    fn now_ms(&self) -> u16;
}

/// Milliseconds elapsed between `since` and `now`, correct across one wrap.
pub fn elapsed_ms(now: u16, since: u16) -> u16 {
    now.wrapping_sub(since)
}

/// Monotonic wall clock
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u16 {
        // truncation is the wrap
        self.origin.elapsed().as_millis() as u16
    }
}

/// Manually advanced clock
///
/// Clones share the same counter, so two engines in one simulation can run
/// on a single time base.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU16>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(ms: u16) -> Self {
        let clock = Self::new();
        clock.set(ms);
        clock
    }

    pub fn set(&self, ms: u16) {
        self.now.store(ms, Ordering::SeqCst);
    }

    /// Advance by `ms`, wrapping like the hardware counter.
    pub fn advance(&self, ms: u16) {
        // fetch_add wraps on overflow
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u16 {
        self.now.load(Ordering::SeqCst)
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u16 {
        (**self).now_ms()
    }
}
