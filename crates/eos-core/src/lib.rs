//! Shared types for the eos emulator
//!
//! This crate holds the state every subsystem needs a view of:
//!
//! - **Config**: emulator configuration parsed from `config.txt`
//! - **Counters**: the process-wide atomic counters (ticks, paging
//!   activity, memory accounting, active cores)
//! - **Timestamp**: wall-clock formatting for log entries and reports
//!
//! It deliberately has no emulator logic of its own; the memory manager,
//! scheduler and shell all depend on it without depending on each other.

pub mod config;
pub mod counters;
pub mod timestamp;

pub use config::{Config, ConfigError, SchedulerPolicy};
pub use counters::{CounterSnapshot, SystemCounters};
pub use timestamp::format_timestamp;
