//! Deterministic host for tests.
//!
//! `MockHal` runs the emulator against a virtual clock: sleeps return
//! immediately (advancing the clock instead of blocking) and the random
//! stream is seeded, so batch generation and timestamps are repeatable.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crate::{xorshift64star, Hal};

/// In-memory host for testing.
pub struct MockHal {
    /// Virtual monotonic clock, in milliseconds.
    now: AtomicU64,
    /// Virtual wall clock, milliseconds since the Unix epoch.
    wallclock: AtomicU64,
    /// Seeded xorshift64* state.
    rng_state: AtomicU64,
    /// Every `sleep_ms` request, in call order.
    sleeps: Mutex<Vec<u64>>,
}

impl MockHal {
    /// Create a mock host with a fixed default seed and epoch.
    pub fn new() -> Self {
        Self::with_seed(12345)
    }

    /// Create a mock host with a chosen random seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            now: AtomicU64::new(0),
            // 2025-01-22 00:00:00 UTC, same fixed epoch the kernel mocks use
            wallclock: AtomicU64::new(1_737_504_000_000),
            rng_state: AtomicU64::new(seed | 1),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Set the virtual monotonic clock.
    pub fn set_now(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    /// Set the virtual wall clock (ms since epoch).
    pub fn set_wallclock(&self, ms: u64) {
        self.wallclock.store(ms, Ordering::SeqCst);
    }

    /// All sleep durations requested so far, in call order.
    pub fn recorded_sleeps(&self) -> Vec<u64> {
        self.sleeps.lock().unwrap().clone()
    }

    /// Sum of all sleep durations requested so far.
    pub fn total_slept_ms(&self) -> u64 {
        self.sleeps.lock().unwrap().iter().sum()
    }
}

impl Default for MockHal {
    fn default() -> Self {
        Self::new()
    }
}

impl Hal for MockHal {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }

    fn wallclock_ms(&self) -> u64 {
        self.wallclock.load(Ordering::SeqCst)
    }

    fn sleep_ms(&self, ms: u64) {
        self.sleeps.lock().unwrap().push(ms);
        self.now.fetch_add(ms, Ordering::SeqCst);
        self.wallclock.fetch_add(ms, Ordering::SeqCst);
    }

    fn random_u64(&self) -> u64 {
        xorshift64star(&self.rng_state)
    }
}
