//! Scheduler for the eos emulator
//!
//! Runs synthetic processes over the paged memory subsystem:
//!
//! - **Worker pool**: one thread per configured core, draining a shared
//!   FIFO ready queue under a condition variable
//! - **Policies**: FCFS (run to completion) and round-robin (pre-empt
//!   after `quantum_cycles` instructions, re-enqueue at the tail)
//! - **Batch generator**: synthesizes a process with randomized
//!   instructions and memory every `batch_process_freq` seconds
//! - **Interpreter**: the restricted instruction subset workers execute
//!   on behalf of a process
//!
//! Tick accounting: every worker pass counts toward `total_ticks` and
//! toward either `idle_ticks` or `active_ticks`.

pub mod codegen;
pub mod interpreter;
pub mod scheduler;

pub use scheduler::Scheduler;
