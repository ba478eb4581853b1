//! Error types for the memory manager.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Errors from memory-manager operations.
///
/// The shell maps `AccessViolation` to process termination; the batch
/// generator treats `AllocationRefused` as "skip this cycle".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryError {
    /// A virtual address fell outside the process's address space, or a
    /// 16-bit access would cross a page boundary.
    AccessViolation {
        /// The offending virtual address.
        addr: u32,
    },
    /// An allocation request with a bad size (zero, or not a multiple of
    /// the frame size), or against an uninitialized manager.
    AllocationRefused {
        /// Requested size in bytes.
        requested: u32,
    },
    /// No free frame and no eviction victim; cannot happen unless the
    /// pool has zero frames.
    OutOfFrames,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AccessViolation { addr } => {
                write!(f, "Memory access violation at 0x{:X}", addr)
            }
            MemoryError::AllocationRefused { requested } => {
                write!(f, "invalid memory allocation ({} bytes)", requested)
            }
            MemoryError::OutOfFrames => f.write_str("no frames available"),
        }
    }
}

impl std::error::Error for MemoryError {}
