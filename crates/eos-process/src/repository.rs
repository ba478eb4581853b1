//! The name → process mapping.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::process::{Process, ProcessSnapshot};

/// Process repository.
///
/// Records stay here for reporting after they finish; nothing is ever
/// removed. The repository mutex sits below the memory-manager mutex in
/// the global lock order and above the per-process mutexes.
#[derive(Debug, Default)]
pub struct Repository {
    inner: Mutex<BTreeMap<String, Arc<Process>>>,
    next_id: AtomicU32,
}

impl Repository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a process, or return the existing record for a duplicate
    /// name.
    ///
    /// `created` is the creation timestamp; the record's first log entry
    /// greets with its own name.
    pub fn create(&self, name: &str, created: &str) -> Arc<Process> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.get(name) {
            return Arc::clone(existing);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let p = Arc::new(Process::new(name, id, created));
        p.push_log(created, -1, format!("Hello world from {}!", name));
        inner.insert(name.to_string(), Arc::clone(&p));
        p
    }

    /// Look up a process by name.
    pub fn get(&self, name: &str) -> Option<Arc<Process>> {
        self.inner.lock().unwrap().get(name).map(Arc::clone)
    }

    /// Whether `name` is taken.
    pub fn contains(&self, name: &str) -> bool {
        self.inner.lock().unwrap().contains_key(name)
    }

    /// Records created so far.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }

    /// Next auto-generated name, `processNN` (zero-padded).
    pub fn auto_name(&self) -> String {
        format!("process{:02}", self.next_id.load(Ordering::SeqCst) + 1)
    }

    /// All records, in name order.
    pub fn all(&self) -> Vec<Arc<Process>> {
        self.inner.lock().unwrap().values().map(Arc::clone).collect()
    }

    /// Snapshots of all records, in name order.
    pub fn snapshots(&self) -> Vec<ProcessSnapshot> {
        self.all().iter().map(|p| p.snapshot()).collect()
    }
}
