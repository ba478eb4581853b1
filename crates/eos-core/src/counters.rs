//! Process-wide atomic counters.
//!
//! Every subsystem updates these without further locking: workers tick
//! them on each pass, the memory manager counts paging activity, and the
//! batch generator and completion paths move bytes between the used and
//! free pools. Reports read a `CounterSnapshot`; individual loads are
//! eventually consistent across threads.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// System-wide counters shared by the scheduler, memory manager and shell.
#[derive(Debug, Default)]
pub struct SystemCounters {
    /// Cores currently executing a process.
    pub active_cores: AtomicI64,
    /// Worker passes that found the ready queue empty.
    pub idle_ticks: AtomicU64,
    /// Worker passes that picked up a process.
    pub active_ticks: AtomicU64,
    /// All worker passes.
    pub total_ticks: AtomicU64,
    /// Pages loaded from the backing store.
    pub num_paged_in: AtomicU64,
    /// Pages written back on eviction.
    pub num_paged_out: AtomicU64,
    /// Bytes reserved by admitted processes.
    pub used_memory: AtomicU64,
    /// Bytes still available for admission.
    pub free_memory: AtomicU64,
    /// Total physical memory in bytes.
    pub total_memory: AtomicU64,
}

/// Point-in-time copy of the counters, for reports.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub active_cores: i64,
    pub idle_ticks: u64,
    pub active_ticks: u64,
    pub total_ticks: u64,
    pub num_paged_in: u64,
    pub num_paged_out: u64,
    pub used_memory: u64,
    pub free_memory: u64,
    pub total_memory: u64,
}

impl SystemCounters {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set total memory and reset the used/free pools to empty/full.
    pub fn reset_memory(&self, total_bytes: u64) {
        self.total_memory.store(total_bytes, Ordering::SeqCst);
        self.used_memory.store(0, Ordering::SeqCst);
        self.free_memory.store(total_bytes, Ordering::SeqCst);
    }

    /// Move `bytes` from the free pool to the used pool.
    ///
    /// Returns false (and changes nothing) when the free pool is smaller
    /// than `bytes`.
    pub fn reserve_memory(&self, bytes: u64) -> bool {
        let mut free = self.free_memory.load(Ordering::SeqCst);
        loop {
            if free < bytes {
                return false;
            }
            match self.free_memory.compare_exchange(
                free,
                free - bytes,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => {
                    self.used_memory.fetch_add(bytes, Ordering::SeqCst);
                    return true;
                }
                Err(cur) => free = cur,
            }
        }
    }

    /// Return `bytes` from the used pool to the free pool.
    pub fn release_memory(&self, bytes: u64) {
        self.used_memory.fetch_sub(bytes, Ordering::SeqCst);
        self.free_memory.fetch_add(bytes, Ordering::SeqCst);
    }

    /// Copy all counters.
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            active_cores: self.active_cores.load(Ordering::SeqCst),
            idle_ticks: self.idle_ticks.load(Ordering::SeqCst),
            active_ticks: self.active_ticks.load(Ordering::SeqCst),
            total_ticks: self.total_ticks.load(Ordering::SeqCst),
            num_paged_in: self.num_paged_in.load(Ordering::SeqCst),
            num_paged_out: self.num_paged_out.load(Ordering::SeqCst),
            used_memory: self.used_memory.load(Ordering::SeqCst),
            free_memory: self.free_memory.load(Ordering::SeqCst),
            total_memory: self.total_memory.load(Ordering::SeqCst),
        }
    }
}
