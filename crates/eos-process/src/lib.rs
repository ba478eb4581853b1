//! Process records and the process repository
//!
//! A `Process` is the unit the scheduler and the memory manager share:
//! identity, page table, instruction list, symbol table and log live
//! behind one per-process mutex, while the progress fields the reporter
//! polls (`finished`, `current_instruction`, `assigned_core`) are
//! atomics readable without taking it.
//!
//! The `Repository` is the name → record mapping both subsystems use as
//! their indirection layer: frames refer to their owner by name, and an
//! eviction resolves the name back to the record here.

pub mod process;
pub mod repository;

pub use process::{LogEntry, Process, ProcessBody, ProcessSnapshot, MAX_SYMBOLS};
pub use repository::Repository;
