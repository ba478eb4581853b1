//! Runtime-checkable invariants over the frame pool.
//!
//! These should always hold between operations. They are used for:
//! 1. Runtime assertion checking during development
//! 2. Exercising the paging paths in tests after every mutation
//!
//! # Invariants
//!
//! 1. **Frame accounting**: resident frames plus free frames equals the
//!    pool size
//! 2. **Owner mapping**: every owned frame is pointed back at by its
//!    owner's page table, and every valid page-table entry points at a
//!    frame owned by that process and page
//! 3. **Queue membership**: the FIFO queue holds exactly the owned
//!    frames and the free list exactly the unowned ones, disjointly

use std::collections::BTreeSet;

use eos_process::Repository;

use crate::manager::MemState;

/// An invariant violation with details.
#[derive(Clone, Debug)]
pub struct InvariantViolation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub description: String,
}

/// Check all frame-pool invariants.
///
/// Returns a list of violations (empty if all invariants hold). The
/// caller holds the memory-manager lock; the repository and process
/// locks are taken below it, per the global order.
pub(crate) fn check(state: &MemState, repo: &Repository) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    violations.extend(check_frame_accounting(state));
    violations.extend(check_owner_mapping(state, repo));
    violations.extend(check_queue_membership(state));
    violations
}

/// Invariant 1: resident + free == total.
fn check_frame_accounting(state: &MemState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let resident = state.frame_owner.iter().filter(|o| o.is_some()).count();
    let free = state.free_frames.len();
    if resident + free != state.frames_count as usize {
        violations.push(InvariantViolation {
            invariant: "frame_accounting",
            description: format!(
                "{} resident + {} free != {} frames",
                resident, free, state.frames_count
            ),
        });
    }
    violations
}

/// Invariant 2: frame owners and page tables point at each other.
fn check_owner_mapping(state: &MemState, repo: &Repository) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (fi, owner) in state.frame_owner.iter().enumerate() {
        let Some(owner) = owner else { continue };
        let Some(p) = repo.get(&owner.process) else {
            violations.push(InvariantViolation {
                invariant: "owner_mapping",
                description: format!("frame {} owned by unknown process {}", fi, owner.process),
            });
            continue;
        };
        let body = p.body();
        if body.page_table.get(owner.page) != Some(&(fi as i32)) {
            violations.push(InvariantViolation {
                invariant: "owner_mapping",
                description: format!(
                    "frame {} owned by {} but its page table does not point back",
                    fi, owner
                ),
            });
        }
    }

    for p in repo.all() {
        let body = p.body();
        for (page, &entry) in body.page_table.iter().enumerate() {
            if entry < 0 {
                continue;
            }
            let fi = entry as usize;
            let expected = state
                .frame_owner
                .get(fi)
                .and_then(|o| o.as_ref())
                .map(|o| o.process == p.name && o.page == page)
                .unwrap_or(false);
            if !expected {
                violations.push(InvariantViolation {
                    invariant: "owner_mapping",
                    description: format!(
                        "{} page {} maps frame {} which it does not own",
                        p.name, page, fi
                    ),
                });
            }
        }
    }

    violations
}

/// Invariant 3: FIFO queue == owned frames, free list == unowned frames.
fn check_queue_membership(state: &MemState) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    let owned: BTreeSet<usize> = state
        .frame_owner
        .iter()
        .enumerate()
        .filter_map(|(fi, o)| o.as_ref().map(|_| fi))
        .collect();
    let fifo: BTreeSet<usize> = state.fifo_queue.iter().copied().collect();
    let free: BTreeSet<usize> = state.free_frames.iter().copied().collect();

    if fifo.len() != state.fifo_queue.len() {
        violations.push(InvariantViolation {
            invariant: "queue_membership",
            description: "FIFO queue contains duplicate frames".to_string(),
        });
    }
    if free.len() != state.free_frames.len() {
        violations.push(InvariantViolation {
            invariant: "queue_membership",
            description: "free list contains duplicate frames".to_string(),
        });
    }
    if fifo != owned {
        violations.push(InvariantViolation {
            invariant: "queue_membership",
            description: format!("FIFO queue {:?} != owned frames {:?}", fifo, owned),
        });
    }
    if !fifo.is_disjoint(&free) {
        violations.push(InvariantViolation {
            invariant: "queue_membership",
            description: "FIFO queue and free list overlap".to_string(),
        });
    }
    let expected_free: BTreeSet<usize> = (0..state.frames_count as usize)
        .filter(|fi| !owned.contains(fi))
        .collect();
    if free != expected_free {
        violations.push(InvariantViolation {
            invariant: "queue_membership",
            description: format!("free list {:?} != unowned frames {:?}", free, expected_free),
        });
    }

    violations
}
