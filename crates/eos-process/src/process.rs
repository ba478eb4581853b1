//! The per-process record.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

/// Upper bound on per-process symbol-table entries.
pub const MAX_SYMBOLS: usize = 32;

/// One timestamped line of a process's log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Wall-clock timestamp, `MM/DD/YYYY HH:MM:SSAM`.
    pub timestamp: String,
    /// Log text, prefixed with `Core <n>: ` when executed on a core.
    pub message: String,
}

/// Mutable process state guarded by the per-process mutex.
///
/// Everything here requires the lock; progress counters the reporter
/// polls live on `Process` as atomics instead.
#[derive(Debug, Default)]
pub struct ProcessBody {
    /// Memory requirement in bytes; zero until allocation.
    pub mem_bytes: u32,
    /// Whether this process's bytes are counted in `used_memory`.
    pub mem_reserved: bool,
    /// Pages in the virtual address space.
    pub num_pages: usize,
    /// Frame index per page; `-1` means not resident.
    pub page_table: Vec<i32>,
    /// Instruction count the scheduler runs to.
    pub total_instructions: usize,
    /// Local 16-bit variables, bounded at `MAX_SYMBOLS`.
    pub symbols: BTreeMap<String, u16>,
    /// Instruction lines, in program order.
    pub lines: Vec<String>,
    /// Timestamped log entries, in append order.
    pub logs: Vec<LogEntry>,
}

impl ProcessBody {
    /// Set `name` to `value`.
    ///
    /// Returns false when the table is full and `name` is not already
    /// present; the table is left unchanged in that case.
    pub fn set_symbol(&mut self, name: &str, value: u16) -> bool {
        if !self.symbols.contains_key(name) && self.symbols.len() >= MAX_SYMBOLS {
            return false;
        }
        self.symbols.insert(name.to_string(), value);
        true
    }

    /// Resolve an operand token to a 16-bit value.
    ///
    /// Numeric tokens are clamped into `[0, 65535]`. Anything else is a
    /// variable name: its current value, inserting a zero entry when
    /// absent (and the table has room).
    pub fn resolve_token(&mut self, token: &str) -> u16 {
        if let Ok(v) = token.parse::<i64>() {
            return v.clamp(0, 65_535) as u16;
        }
        if let Some(v) = self.symbols.get(token) {
            return *v;
        }
        self.set_symbol(token, 0);
        0
    }
}

/// A process record.
///
/// Shared between its owning worker, the shell (when attached), the
/// batch generator and the reporter as an `Arc<Process>`.
#[derive(Debug)]
pub struct Process {
    /// Unique name; primary key in the repository.
    pub name: String,
    /// Numeric id, assigned in creation order.
    pub id: u32,
    /// Creation timestamp.
    pub created: String,
    /// Set exactly once, when execution completes or is terminated.
    pub finished: AtomicBool,
    /// Next instruction index, in `[0, total_instructions]`.
    pub current_instruction: AtomicUsize,
    /// Core currently executing this process, `-1` when not running.
    pub assigned_core: AtomicI32,
    body: Mutex<ProcessBody>,
}

/// Point-in-time copy of a process for reports.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessSnapshot {
    pub name: String,
    pub id: u32,
    pub created: String,
    pub finished: bool,
    pub current_instruction: usize,
    pub total_instructions: usize,
    pub assigned_core: i32,
    pub mem_bytes: u32,
    pub num_pages: usize,
}

impl Process {
    /// Create a fresh record with no allocation and no instructions.
    pub fn new(name: impl Into<String>, id: u32, created: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id,
            created: created.into(),
            finished: AtomicBool::new(false),
            current_instruction: AtomicUsize::new(0),
            assigned_core: AtomicI32::new(-1),
            body: Mutex::new(ProcessBody::default()),
        }
    }

    /// Lock and return the mutable state.
    ///
    /// Per the global lock order this is the innermost lock: never take
    /// the scheduler, memory-manager or repository mutex while holding it.
    pub fn body(&self) -> MutexGuard<'_, ProcessBody> {
        self.body.lock().unwrap()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// Append a log entry.
    ///
    /// When `core` is non-negative and the message does not already name
    /// a core, it is prefixed with `Core <core>: `.
    pub fn push_log(&self, timestamp: impl Into<String>, core: i32, message: impl Into<String>) {
        let message = message.into();
        let message = if core >= 0 && !message.contains("Core") {
            format!("Core {}: {}", core, message)
        } else {
            message
        };
        self.body.lock().unwrap().logs.push(LogEntry {
            timestamp: timestamp.into(),
            message,
        });
    }

    /// Copy the fields reports need.
    pub fn snapshot(&self) -> ProcessSnapshot {
        let body = self.body.lock().unwrap();
        ProcessSnapshot {
            name: self.name.clone(),
            id: self.id,
            created: self.created.clone(),
            finished: self.finished.load(Ordering::SeqCst),
            current_instruction: self.current_instruction.load(Ordering::SeqCst),
            total_instructions: body.total_instructions,
            assigned_core: self.assigned_core.load(Ordering::SeqCst),
            mem_bytes: body.mem_bytes,
            num_pages: body.num_pages,
        }
    }
}
