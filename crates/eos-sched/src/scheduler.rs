//! Worker pool, ready queue and batch generation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{info, warn};

use eos_core::{format_timestamp, Config, SchedulerPolicy, SystemCounters};
use eos_hal::Hal;
use eos_memory::MemoryManager;
use eos_process::{Process, ProcessSnapshot, Repository};

use crate::codegen;
use crate::interpreter;

/// How long a worker waits on the ready queue before ticking idle.
const TICK_WAIT_MS: u64 = 100;

/// Outcome of one scheduling slice of a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SliceOutcome {
    /// All instructions executed.
    Completed,
    /// Quantum expired with instructions remaining.
    Preempted,
    /// The scheduler is shutting down.
    Shutdown,
}

/// State shared between the scheduler handle and its threads.
struct Shared<H: Hal> {
    config: Config,
    hal: Arc<H>,
    repo: Arc<Repository>,
    memory: Arc<MemoryManager>,
    counters: Arc<SystemCounters>,
    running: AtomicBool,
    queue: Mutex<VecDeque<Arc<Process>>>,
    queue_cv: Condvar,
    /// Process currently executing per core, for reporting.
    core_slots: Mutex<Vec<Option<Arc<Process>>>>,
}

/// The scheduler: worker pool plus batch generator.
pub struct Scheduler<H: Hal> {
    shared: Arc<Shared<H>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl<H: Hal> Scheduler<H> {
    pub fn new(
        config: Config,
        hal: Arc<H>,
        repo: Arc<Repository>,
        memory: Arc<MemoryManager>,
        counters: Arc<SystemCounters>,
    ) -> Self {
        let cores = config.num_cpu as usize;
        Self {
            shared: Arc::new(Shared {
                config,
                hal,
                repo,
                memory,
                counters,
                running: AtomicBool::new(false),
                queue: Mutex::new(VecDeque::new()),
                queue_cv: Condvar::new(),
                core_slots: Mutex::new(vec![None; cores]),
            }),
            threads: Mutex::new(Vec::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Enqueue `p` on the ready queue.
    ///
    /// Derives the total instruction count from the line count first,
    /// under `p`'s mutex, before the queue mutex is taken.
    pub fn add_process(&self, p: &Arc<Process>) {
        {
            let mut body = p.body();
            if !body.lines.is_empty() {
                body.total_instructions = body.lines.len();
            }
        }
        self.shared.enqueue(Arc::clone(p));
    }

    /// Spawn the worker and batch threads. Idempotent while running.
    pub fn start(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(
            "Scheduler started ({}) with {} cores.",
            self.shared.config.scheduler, self.shared.config.num_cpu
        );

        let mut threads = self.threads.lock().unwrap();
        for core in 0..self.shared.config.num_cpu as usize {
            let shared = Arc::clone(&self.shared);
            threads.push(std::thread::spawn(move || worker_loop(&shared, core)));
        }
        let shared = Arc::clone(&self.shared);
        threads.push(std::thread::spawn(move || batch_loop(&shared)));
    }

    /// Stop all threads and join them. Idempotent while stopped.
    ///
    /// Workers finish the instruction in flight, then exit.
    pub fn stop(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.shared.queue_cv.notify_all();
        for t in self.threads.lock().unwrap().drain(..) {
            let _ = t.join();
        }
        info!("Scheduler stopped.");
    }

    /// Ready-queue length.
    pub fn queue_len(&self) -> usize {
        self.shared.queue.lock().unwrap().len()
    }

    /// Snapshot of what each core is executing.
    pub fn core_snapshots(&self) -> Vec<Option<ProcessSnapshot>> {
        self.shared
            .core_slots
            .lock()
            .unwrap()
            .iter()
            .map(|slot| slot.as_ref().map(|p| p.snapshot()))
            .collect()
    }

    /// Run one batch-generation cycle immediately.
    ///
    /// This is the body the batch thread runs every
    /// `batch_process_freq` seconds; exposed so callers (and tests) can
    /// drive generation without the timing loop.
    pub fn generate_batch_process(&self) -> Option<Arc<Process>> {
        spawn_batch_process(&self.shared)
    }
}

impl<H: Hal> Shared<H> {
    /// Push onto the ready-queue tail and wake one worker.
    fn enqueue(&self, p: Arc<Process>) {
        let mut queue = self.queue.lock().unwrap();
        queue.push_back(p);
        self.queue_cv.notify_one();
    }

    fn now(&self) -> String {
        format_timestamp(self.hal.wallclock_ms())
    }
}

/// Periodically synthesize and enqueue a process.
fn batch_loop<H: Hal>(shared: &Shared<H>) {
    while shared.running.load(Ordering::SeqCst) {
        // sleep the configured period in short slices so stop() is not
        // held up by a long in-flight sleep
        let period_ms = shared.config.batch_process_freq as u64 * 1000;
        let mut slept = 0;
        while slept < period_ms && shared.running.load(Ordering::SeqCst) {
            let slice = TICK_WAIT_MS.min(period_ms - slept);
            shared.hal.sleep_ms(slice);
            slept += slice;
        }
        if !shared.running.load(Ordering::SeqCst) {
            break;
        }
        spawn_batch_process(shared);
    }
}

/// One batch-generation cycle: create, codegen, allocate, enqueue.
///
/// Returns the process on success. When the memory manager refuses the
/// allocation the record is left in the repository for reporting but is
/// not enqueued, and `None` is returned.
fn spawn_batch_process<H: Hal>(shared: &Shared<H>) -> Option<Arc<Process>> {
    let name = shared.repo.auto_name();
    let ts = shared.now();
    let p = shared.repo.create(&name, &ts);

    let num_ins = shared
        .hal
        .random_range(shared.config.min_ins as u64, shared.config.max_ins as u64);
    codegen::generate_dummy_instructions(shared.hal.as_ref(), &p, num_ins as usize);
    p.push_log(
        shared.now(),
        -1,
        format!("Generated {} randomized instructions", num_ins),
    );

    let mem = pick_memory_size(
        shared.hal.as_ref(),
        shared.config.min_mem_per_proc,
        shared.config.max_mem_per_proc,
    );
    if let Err(e) = shared.memory.allocate_process(&p, mem) {
        warn!("batch: allocation refused for {} ({} bytes): {}", name, mem, e);
        return None;
    }
    if shared.counters.reserve_memory(mem as u64) {
        p.body().mem_reserved = true;
    }

    {
        let mut body = p.body();
        if !body.lines.is_empty() {
            body.total_instructions = body.lines.len();
        }
    }
    shared.enqueue(Arc::clone(&p));
    Some(p)
}

/// Pick a power-of-two memory size in `[min_mem, max_mem]`.
fn pick_memory_size<H: Hal>(hal: &H, min_mem: u32, max_mem: u32) -> u32 {
    let candidates: Vec<u32> = (6..=16)
        .map(|k| 1u32 << k)
        .filter(|m| (min_mem..=max_mem).contains(m))
        .collect();
    if candidates.is_empty() {
        return min_mem;
    }
    candidates[hal.random_range(0, candidates.len() as u64 - 1) as usize]
}

/// One worker core. Each loop pass is one tick.
fn worker_loop<H: Hal>(shared: &Shared<H>, core_id: usize) {
    while shared.running.load(Ordering::SeqCst) {
        shared.counters.total_ticks.fetch_add(1, Ordering::SeqCst);

        let p = {
            let queue = shared.queue.lock().unwrap();
            let (mut queue, _) = shared
                .queue_cv
                .wait_timeout_while(queue, Duration::from_millis(TICK_WAIT_MS), |q| {
                    q.is_empty() && shared.running.load(Ordering::SeqCst)
                })
                .unwrap();

            if !shared.running.load(Ordering::SeqCst) {
                break;
            }
            let Some(p) = queue.pop_front() else {
                shared.counters.idle_ticks.fetch_add(1, Ordering::SeqCst);
                continue;
            };
            shared.counters.active_ticks.fetch_add(1, Ordering::SeqCst);
            shared.core_slots.lock().unwrap()[core_id] = Some(Arc::clone(&p));
            shared.counters.active_cores.fetch_add(1, Ordering::SeqCst);
            p
        };

        run_process(shared, core_id, &p);

        shared.core_slots.lock().unwrap()[core_id] = None;
        shared.counters.active_cores.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Execute `p` on `core_id` under the configured policy.
fn run_process<H: Hal>(shared: &Shared<H>, core_id: usize, p: &Arc<Process>) {
    let core = core_id as i32;
    p.assigned_core.store(core, Ordering::SeqCst);
    p.push_log(shared.now(), core, format!("Picked process {}", p.name));

    prefault_pages(shared, p);

    let limit = match shared.config.scheduler {
        SchedulerPolicy::Fcfs => None,
        SchedulerPolicy::Rr => Some(shared.config.quantum_cycles),
    };

    match execute_slice(shared, core, p, limit) {
        SliceOutcome::Completed => {
            p.finished.store(true, Ordering::SeqCst);
            p.assigned_core.store(-1, Ordering::SeqCst);
            let label = match shared.config.scheduler {
                SchedulerPolicy::Fcfs => "FCFS job finished",
                SchedulerPolicy::Rr => "RR job finished",
            };
            p.push_log(shared.now(), core, label);
            release_memory(shared, p);
        }
        SliceOutcome::Preempted => {
            p.assigned_core.store(-1, Ordering::SeqCst);
            shared.enqueue(Arc::clone(p));
        }
        SliceOutcome::Shutdown => {
            // leave the process runnable; a later scheduler-start resumes it
            p.assigned_core.store(-1, Ordering::SeqCst);
            shared.enqueue(Arc::clone(p));
        }
    }
}

/// Make every page of `p` resident before execution.
fn prefault_pages<H: Hal>(shared: &Shared<H>, p: &Arc<Process>) {
    let num_pages = p.body().num_pages;
    let frame_bytes = shared.memory.frame_size();
    for page in 0..num_pages {
        if let Err(e) = shared.memory.ensure_page_loaded(p, page as u32 * frame_bytes) {
            warn!("prefault of {} page {} failed: {}", p.name, page, e);
        }
    }
}

/// Run instructions until completion, quantum expiry or shutdown.
fn execute_slice<H: Hal>(
    shared: &Shared<H>,
    core: i32,
    p: &Arc<Process>,
    limit: Option<u32>,
) -> SliceOutcome {
    let mut executed = 0u32;
    loop {
        if !shared.running.load(Ordering::SeqCst) {
            return SliceOutcome::Shutdown;
        }
        let cur = p.current_instruction.load(Ordering::SeqCst);
        let line = {
            let body = p.body();
            if cur >= body.total_instructions {
                return SliceOutcome::Completed;
            }
            body.lines.get(cur).cloned()
        };
        if let Some(quantum) = limit {
            if executed >= quantum {
                return SliceOutcome::Preempted;
            }
        }

        if let Some(line) = line {
            interpreter::execute(shared.hal.as_ref(), p, &line, core);
        }
        shared
            .hal
            .sleep_ms(shared.config.delay_per_exec.max(1) as u64);
        p.current_instruction.fetch_add(1, Ordering::SeqCst);
        executed += 1;
    }
}

/// Return a finished process's memory and reservation.
fn release_memory<H: Hal>(shared: &Shared<H>, p: &Arc<Process>) {
    shared.memory.free_process(p);
    let (reserved, mem) = {
        let mut body = p.body();
        let reserved = body.mem_reserved;
        body.mem_reserved = false;
        (reserved, body.mem_bytes)
    };
    if reserved {
        shared.counters.release_memory(mem as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eos_hal::testing::MockHal;
    use eos_memory::BackingStore;

    fn fixture(config: Config) -> (Arc<Shared<MockHal>>, Scheduler<MockHal>) {
        let hal = Arc::new(MockHal::with_seed(1));
        let repo = Arc::new(Repository::new());
        let counters = Arc::new(SystemCounters::new());
        let memory = Arc::new(MemoryManager::new(
            config.max_overall_mem,
            config.mem_per_frame,
            BackingStore::in_memory(),
            Arc::clone(&repo),
            Arc::clone(&counters),
        ));
        let sched = Scheduler::new(config, hal, repo, memory, counters);
        (Arc::clone(&sched.shared), sched)
    }

    fn process_with_prints(shared: &Shared<MockHal>, name: &str, count: usize) -> Arc<Process> {
        let p = shared.repo.create(name, "ts");
        {
            let mut body = p.body();
            for i in 0..count {
                body.lines.push(format!("PRINT \"line {}\"", i));
            }
            body.total_instructions = count;
        }
        p
    }

    #[test]
    fn rr_slice_stops_at_the_quantum() {
        let config = Config {
            quantum_cycles: 3,
            ..Config::default()
        };
        let (shared, _sched) = fixture(config);
        shared.running.store(true, Ordering::SeqCst);
        let p = process_with_prints(&shared, "p", 10);

        let outcome = execute_slice(&shared, 0, &p, Some(3));
        assert_eq!(outcome, SliceOutcome::Preempted);
        assert_eq!(p.current_instruction.load(Ordering::SeqCst), 3);
        assert!(!p.is_finished());
    }

    #[test]
    fn fcfs_slice_runs_to_completion() {
        let (shared, _sched) = fixture(Config::default());
        shared.running.store(true, Ordering::SeqCst);
        let p = process_with_prints(&shared, "p", 5);

        let outcome = execute_slice(&shared, 0, &p, None);
        assert_eq!(outcome, SliceOutcome::Completed);
        assert_eq!(p.current_instruction.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn slice_observes_shutdown() {
        let (shared, _sched) = fixture(Config::default());
        let p = process_with_prints(&shared, "p", 5);
        // running never set
        assert_eq!(execute_slice(&shared, 0, &p, None), SliceOutcome::Shutdown);
        assert_eq!(p.current_instruction.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn add_process_derives_total_from_lines() {
        let (shared, sched) = fixture(Config::default());
        let p = shared.repo.create("p", "ts");
        p.body().lines.push("PRINT \"x\"".to_string());
        p.body().lines.push("PRINT \"y\"".to_string());

        sched.add_process(&p);
        assert_eq!(p.body().total_instructions, 2);
        assert_eq!(sched.queue_len(), 1);
    }

    #[test]
    fn batch_cycle_creates_allocates_and_enqueues() {
        let config = Config {
            min_ins: 4,
            max_ins: 8,
            min_mem_per_proc: 256,
            max_mem_per_proc: 512,
            ..Config::default()
        };
        let (shared, sched) = fixture(config);

        let p = sched.generate_batch_process().expect("batch process");
        assert_eq!(p.name, "process01");
        assert!(p.body().num_pages > 0);
        assert!(p.body().total_instructions >= 4);
        assert_eq!(sched.queue_len(), 1);
        assert!(shared.repo.contains("process01"));

        // one process per cycle
        for _ in 0..4 {
            sched.generate_batch_process();
        }
        assert_eq!(shared.repo.len(), 5);
        assert_eq!(sched.queue_len(), 5);
    }

    #[test]
    fn batch_cycle_skips_enqueue_when_allocation_is_refused() {
        // frame size larger than any candidate process size
        let config = Config {
            max_overall_mem: 65536,
            mem_per_frame: 65536,
            min_mem_per_proc: 256,
            max_mem_per_proc: 256,
            ..Config::default()
        };
        let (shared, sched) = fixture(config);

        assert!(sched.generate_batch_process().is_none());
        assert_eq!(sched.queue_len(), 0);
        // the record still exists for reporting
        assert!(shared.repo.contains("process01"));
    }

    #[test]
    fn memory_sizes_are_powers_of_two_in_range() {
        let hal = MockHal::with_seed(3);
        for _ in 0..100 {
            let m = pick_memory_size(&hal, 256, 4096);
            assert!(m.is_power_of_two());
            assert!((256..=4096).contains(&m));
        }
    }

    #[test]
    fn completed_process_releases_its_reservation() {
        let config = Config {
            min_mem_per_proc: 256,
            max_mem_per_proc: 256,
            ..Config::default()
        };
        let (shared, sched) = fixture(config);
        let p = sched.generate_batch_process().unwrap();
        let used_before = shared.counters.snapshot().used_memory;
        assert_eq!(used_before, 256);

        shared.running.store(true, Ordering::SeqCst);
        run_process(&shared, 0, &p);
        assert!(p.is_finished());
        assert_eq!(p.assigned_core.load(Ordering::SeqCst), -1);
        let snap = shared.counters.snapshot();
        assert_eq!(snap.used_memory, 0);
        assert_eq!(snap.free_memory, snap.total_memory);
        assert!(shared.memory.check_invariants().is_empty());
    }
}
