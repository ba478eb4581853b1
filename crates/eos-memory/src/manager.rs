//! The frame pool and demand-paging fault handler.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use serde::{Deserialize, Serialize};

use eos_core::SystemCounters;
use eos_process::{Process, Repository};

use crate::backing::BackingStore;
use crate::error::MemoryError;
use crate::invariants::{self, InvariantViolation};

/// Owner of a resident frame: one page of one process.
///
/// The frame pool refers to processes by name rather than by reference;
/// eviction resolves the name through the repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageKey {
    /// Owning process name.
    pub process: String,
    /// Page index within the owner's address space.
    pub page: usize,
}

impl PageKey {
    pub fn new(process: impl Into<String>, page: usize) -> Self {
        Self {
            process: process.into(),
            page,
        }
    }

    /// The backing-store key, `"<process>:<page>"`.
    pub fn backing_key(&self) -> String {
        format!("{}:{}", self.process, self.page)
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.process, self.page)
    }
}

/// Everything behind the memory-manager mutex.
pub(crate) struct MemState {
    pub(crate) frame_bytes: u32,
    pub(crate) frames_count: u32,
    /// Owner per frame; `None` means free.
    pub(crate) frame_owner: Vec<Option<PageKey>>,
    /// Byte contents per frame, each `frame_bytes` long.
    pub(crate) frame_content: Vec<Vec<u8>>,
    /// Unowned frames, claimed front-first.
    pub(crate) free_frames: VecDeque<usize>,
    /// Owned frames in fault-in order; the front is the eviction victim.
    pub(crate) fifo_queue: VecDeque<usize>,
    pub(crate) backing: BackingStore,
}

/// Point-in-time view of the frame pool, for `vmstat` and tests.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_memory_bytes: u32,
    pub frame_bytes: u32,
    pub frames_count: u32,
    pub free_frames: usize,
    pub resident_frames: usize,
    pub backing_entries: usize,
}

/// The memory manager.
///
/// Owns the frame pool and the backing store; shares the process
/// repository (to resolve frame owners) and the global counters (paging
/// activity).
pub struct MemoryManager {
    total_memory_bytes: u32,
    repo: Arc<Repository>,
    counters: Arc<SystemCounters>,
    state: Mutex<MemState>,
}

impl MemoryManager {
    /// Create a manager over `total_mem` bytes split into `frame_size`
    /// frames, persisting pages through `backing`.
    ///
    /// All frames start free and zeroed. Resets the global memory pools
    /// to empty/full.
    pub fn new(
        total_mem: u32,
        frame_size: u32,
        backing: BackingStore,
        repo: Arc<Repository>,
        counters: Arc<SystemCounters>,
    ) -> Self {
        let frames_count = if frame_size == 0 { 0 } else { total_mem / frame_size };
        counters.reset_memory(total_mem as u64);
        Self {
            total_memory_bytes: total_mem,
            repo,
            counters,
            state: Mutex::new(MemState {
                frame_bytes: frame_size,
                frames_count,
                frame_owner: vec![None; frames_count as usize],
                frame_content: vec![vec![0; frame_size as usize]; frames_count as usize],
                free_frames: (0..frames_count as usize).collect(),
                fifo_queue: VecDeque::new(),
                backing,
            }),
        }
    }

    pub fn frame_size(&self) -> u32 {
        self.state.lock().unwrap().frame_bytes
    }

    pub fn frame_count(&self) -> u32 {
        self.state.lock().unwrap().frames_count
    }

    pub fn total_memory(&self) -> u32 {
        self.total_memory_bytes
    }

    /// Set up `p`'s page table and zero-filled backing entries.
    ///
    /// `mem_bytes` must be positive and a multiple of the frame size.
    /// No frames are claimed; pages fault in on first touch.
    pub fn allocate_process(&self, p: &Arc<Process>, mem_bytes: u32) -> Result<(), MemoryError> {
        let mut state = self.state.lock().unwrap();
        if state.frame_bytes == 0 || mem_bytes == 0 || mem_bytes % state.frame_bytes != 0 {
            return Err(MemoryError::AllocationRefused {
                requested: mem_bytes,
            });
        }
        let pages = (mem_bytes / state.frame_bytes) as usize;

        {
            let mut body = p.body();
            body.page_table = vec![-1; pages];
            body.num_pages = pages;
            body.mem_bytes = mem_bytes;
        }

        let zeros = vec![0u8; state.frame_bytes as usize];
        for i in 0..pages {
            state
                .backing
                .insert(PageKey::new(&p.name, i).backing_key(), zeros.clone());
        }
        state.backing.persist();
        Ok(())
    }

    /// Release every frame `p` owns and drop its backing entries.
    ///
    /// Frame contents are written back first, so a re-allocation under
    /// the same name starts from zeroed pages, not stale ones.
    pub fn free_process(&self, p: &Arc<Process>) {
        let mut state = self.state.lock().unwrap();

        let num_pages = {
            let mut body = p.body();
            for entry in body.page_table.iter_mut() {
                *entry = -1;
            }
            body.num_pages
        };

        for fi in 0..state.frame_owner.len() {
            let Some(owner) = state.frame_owner[fi].clone() else {
                continue;
            };
            if owner.process != p.name {
                continue;
            }
            let bytes = state.frame_content[fi].clone();
            state.backing.insert(owner.backing_key(), bytes);
            state.frame_owner[fi] = None;
            state.frame_content[fi].fill(0);
            state.free_frames.push_back(fi);
            state.fifo_queue.retain(|&f| f != fi);
        }

        for i in 0..num_pages {
            state.backing.remove(&PageKey::new(&p.name, i).backing_key());
        }
        state.backing.persist();
    }

    /// Write frame `frame` back to the backing store and free it.
    ///
    /// Caller holds the state lock. Acquires the repository lock and the
    /// victim's mutex, in that order, to invalidate its page table.
    fn evict_frame(&self, state: &mut MemState, frame: usize) {
        let Some(owner) = state.frame_owner[frame].clone() else {
            return;
        };
        debug!("evicting frame {} ({})", frame, owner);

        let bytes = state.frame_content[frame].clone();
        state.backing.insert(owner.backing_key(), bytes);
        self.counters.num_paged_out.fetch_add(1, Ordering::SeqCst);

        if let Some(victim) = self.repo.get(&owner.process) {
            let mut body = victim.body();
            if owner.page < body.page_table.len() {
                body.page_table[owner.page] = -1;
            }
        }

        state.frame_owner[frame] = None;
        state.frame_content[frame].fill(0);
        state.fifo_queue.retain(|&f| f != frame);
    }

    /// Make the page containing `virtual_address` resident.
    ///
    /// Fails with an access violation when the address is outside `p`'s
    /// address space. A miss claims a free frame (or evicts the FIFO
    /// victim), loads the page's backing bytes and maps it.
    pub fn ensure_page_loaded(&self, p: &Arc<Process>, virtual_address: u32) -> Result<(), MemoryError> {
        let mut state = self.state.lock().unwrap();
        if state.frame_bytes == 0 {
            return Err(MemoryError::AccessViolation {
                addr: virtual_address,
            });
        }

        let page_idx = (virtual_address / state.frame_bytes) as usize;
        {
            let body = p.body();
            if page_idx >= body.num_pages {
                return Err(MemoryError::AccessViolation {
                    addr: virtual_address,
                });
            }
            if body.page_table[page_idx] != -1 {
                return Ok(()); // already resident
            }
        }

        // Page fault.
        let frame = match state.free_frames.pop_front() {
            Some(f) => f,
            None => {
                let Some(victim) = state.fifo_queue.pop_front() else {
                    return Err(MemoryError::OutOfFrames);
                };
                self.evict_frame(&mut state, victim);
                victim
            }
        };

        let key = PageKey::new(&p.name, page_idx);
        debug!("page fault: {} -> frame {}", key, frame);

        let frame_len = state.frame_content[frame].len();
        match state.backing.get(&key.backing_key()).cloned() {
            Some(bytes) => {
                let copylen = bytes.len().min(frame_len);
                state.frame_content[frame][..copylen].copy_from_slice(&bytes[..copylen]);
                state.frame_content[frame][copylen..].fill(0);
            }
            None => state.frame_content[frame].fill(0),
        }

        state.frame_owner[frame] = Some(key);
        state.fifo_queue.push_back(frame);
        p.body().page_table[page_idx] = frame as i32;
        self.counters.num_paged_in.fetch_add(1, Ordering::SeqCst);

        state.backing.persist();
        Ok(())
    }

    /// Validate a 16-bit access and return `(page_idx, offset)`.
    fn check_access(
        state: &MemState,
        p: &Arc<Process>,
        virtual_address: u32,
    ) -> Result<(usize, usize), MemoryError> {
        let violation = MemoryError::AccessViolation {
            addr: virtual_address,
        };
        if state.frame_bytes == 0 {
            return Err(violation);
        }
        let page_idx = (virtual_address / state.frame_bytes) as usize;
        let offset = (virtual_address % state.frame_bytes) as usize;
        if page_idx >= p.body().num_pages {
            return Err(violation);
        }
        if offset + 2 > state.frame_bytes as usize {
            return Err(violation); // cannot cross a page boundary
        }
        Ok((page_idx, offset))
    }

    /// Resolve the resident frame for `page_idx`, faulting it in if
    /// needed.
    ///
    /// Releases and re-acquires the state lock around the fault; the
    /// page table is re-checked afterwards because another thread may
    /// have evicted the page in between.
    fn resident_frame<'a>(
        &'a self,
        mut state: MutexGuard<'a, MemState>,
        p: &Arc<Process>,
        page_idx: usize,
        virtual_address: u32,
    ) -> Result<(MutexGuard<'a, MemState>, usize), MemoryError> {
        let mut frame = p.body().page_table[page_idx];
        if frame == -1 {
            drop(state);
            self.ensure_page_loaded(p, virtual_address)?;
            state = self.state.lock().unwrap();
            frame = p.body().page_table[page_idx];
            if frame == -1 {
                return Err(MemoryError::AccessViolation {
                    addr: virtual_address,
                });
            }
        }
        Ok((state, frame as usize))
    }

    /// Read the little-endian 16-bit value at `virtual_address`.
    pub fn read_u16(&self, p: &Arc<Process>, virtual_address: u32) -> Result<u16, MemoryError> {
        let state = self.state.lock().unwrap();
        let (page_idx, offset) = Self::check_access(&state, p, virtual_address)?;
        let (state, frame) = self.resident_frame(state, p, page_idx, virtual_address)?;

        let content = &state.frame_content[frame];
        Ok(u16::from_le_bytes([content[offset], content[offset + 1]]))
    }

    /// Write a little-endian 16-bit value at `virtual_address`.
    ///
    /// The in-memory backing copy is updated too, so a later eviction of
    /// this page is a no-op for its contents.
    pub fn write_u16(
        &self,
        p: &Arc<Process>,
        virtual_address: u32,
        value: u16,
    ) -> Result<(), MemoryError> {
        let state = self.state.lock().unwrap();
        let (page_idx, offset) = Self::check_access(&state, p, virtual_address)?;
        let (mut state, frame) = self.resident_frame(state, p, page_idx, virtual_address)?;

        let bytes = value.to_le_bytes();
        state.frame_content[frame][offset] = bytes[0];
        state.frame_content[frame][offset + 1] = bytes[1];

        if let Some(owner) = state.frame_owner[frame].clone() {
            let content = state.frame_content[frame].clone();
            state.backing.insert(owner.backing_key(), content);
        }
        Ok(())
    }

    /// Rewrite the backing file. Called on shutdown.
    pub fn persist(&self) {
        self.state.lock().unwrap().backing.persist();
    }

    /// Copy the pool-level numbers.
    pub fn stats(&self) -> MemoryStats {
        let state = self.state.lock().unwrap();
        MemoryStats {
            total_memory_bytes: self.total_memory_bytes,
            frame_bytes: state.frame_bytes,
            frames_count: state.frames_count,
            free_frames: state.free_frames.len(),
            resident_frames: state.frame_owner.iter().filter(|o| o.is_some()).count(),
            backing_entries: state.backing.len(),
        }
    }

    /// Check every frame-pool invariant; empty means consistent.
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        let state = self.state.lock().unwrap();
        invariants::check(&state, &self.repo)
    }

    /// Bytes of a frame, for tests and reports.
    pub fn frame_bytes_of(&self, frame: usize) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.frame_content.get(frame).cloned()
    }

    /// Backing bytes for `key`, for tests and reports.
    pub fn backing_bytes_of(&self, key: &str) -> Option<Vec<u8>> {
        let state = self.state.lock().unwrap();
        state.backing.get(key).cloned()
    }
}

impl Drop for MemoryManager {
    fn drop(&mut self) {
        self.persist();
    }
}
