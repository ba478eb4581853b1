//! Host Abstraction Layer for the eos emulator
//!
//! This crate defines the `Hal` trait that lets the emulator core run
//! against different hosts by abstracting the operations that touch the
//! outside world:
//!
//! - Time measurement (monotonic and wall-clock)
//! - Blocking sleeps (per-instruction delays, batch intervals)
//! - Entropy (dummy-instruction generation, memory sizing)
//!
//! # Host Implementations
//!
//! - **Native**: `std::time` for clocks, `std::thread::sleep` for delays,
//!   a time-seeded xorshift64* stream for entropy
//! - **Mock** (`testing::MockHal`): settable clock, recorded sleeps,
//!   seeded entropy for deterministic tests

pub mod testing;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Host abstraction trait.
///
/// Implementations provide host-specific functionality for:
/// - Monotonic time (tick accounting, test assertions)
/// - Wall-clock time (log and process timestamps)
/// - Sleeping (instruction delays, SLEEP/FOR instructions, batch cadence)
/// - Random numbers (batch process synthesis)
///
/// All emulator randomness and timing flows through this trait so that
/// tests can substitute a deterministic host.
pub trait Hal: Send + Sync + 'static {
    /// Milliseconds elapsed on a monotonic clock of unspecified origin.
    fn now_millis(&self) -> u64;

    /// Wall-clock time in milliseconds since the Unix epoch.
    ///
    /// This is real time-of-day, not monotonic (can jump due to NTP sync).
    fn wallclock_ms(&self) -> u64;

    /// Block the calling thread for `ms` milliseconds.
    fn sleep_ms(&self, ms: u64);

    /// Produce the next value of the host's random stream.
    fn random_u64(&self) -> u64;

    /// Uniform random value in `[lo, hi]` (inclusive).
    ///
    /// Returns `lo` when the range is empty or inverted.
    fn random_range(&self, lo: u64, hi: u64) -> u64 {
        if hi <= lo {
            return lo;
        }
        let span = hi - lo + 1;
        lo + self.random_u64() % span
    }
}

/// Advance a xorshift64* state and return the next output.
///
/// Shared by the native and mock hosts; no `rand` dependency is needed
/// for the quality of randomness the emulator requires.
pub(crate) fn xorshift64star(state: &AtomicU64) -> u64 {
    let mut x = state.load(Ordering::Relaxed);
    loop {
        let mut n = x;
        n ^= n << 13;
        n ^= n >> 7;
        n ^= n << 17;
        match state.compare_exchange_weak(x, n, Ordering::Relaxed, Ordering::Relaxed) {
            Ok(_) => return n.wrapping_mul(0x2545_f491_4f6c_dd1d),
            Err(cur) => x = cur,
        }
    }
}

/// Native host implementation over `std`.
pub struct NativeHal {
    /// Origin for the monotonic clock.
    start: Instant,
    /// xorshift64* state, seeded from the wall clock at construction.
    rng_state: AtomicU64,
}

impl NativeHal {
    /// Create a native host seeded from the current time.
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9e37_79b9_7f4a_7c15);
        Self {
            start: Instant::now(),
            // xorshift state must be non-zero
            rng_state: AtomicU64::new(seed | 1),
        }
    }
}

impl Default for NativeHal {
    fn default() -> Self {
        Self::new()
    }
}

impl Hal for NativeHal {
    fn now_millis(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }

    fn wallclock_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }

    fn random_u64(&self) -> u64 {
        xorshift64star(&self.rng_state)
    }
}
