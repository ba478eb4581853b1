//! Memory manager for the eos emulator
//!
//! Implements the paged virtual-memory subsystem:
//!
//! - **Frame pool**: `frames_count` fixed-size byte buffers shared by
//!   all processes
//! - **Demand paging**: touching an unmapped virtual address faults the
//!   page in from the backing store, evicting the oldest-resident frame
//!   (FIFO across all processes) when the pool is full
//! - **Backing store**: every allocated page has a persistent byte
//!   buffer, rewritten to `csopesy-backing-store.txt` on each change
//! - **Invariants**: runtime-checkable consistency conditions over the
//!   frame pool, free list, FIFO queue and page tables
//!
//! # Lock order
//!
//! The memory-manager mutex is taken first, the repository mutex second
//! (only during eviction, to resolve a frame's owner by name), and a
//! per-process mutex last. `read_u16`/`write_u16` release the manager
//! mutex around their `ensure_page_loaded` call and re-check the page
//! table after re-acquiring it.

pub mod backing;
pub mod error;
pub mod invariants;
pub mod manager;

pub use backing::BackingStore;
pub use error::MemoryError;
pub use invariants::InvariantViolation;
pub use manager::{MemoryManager, MemoryStats, PageKey};
