//! Runtime-checkable invariants of the wait core
//!
//! Used by tests after every interesting transition, and by the kernel in
//! debug builds.
//!
//! # Invariants
//!
//! 1. **Wait Queue Consistency**: Every queued thread exists, is blocked,
//!    appears once, and the queue is ordered by priority
//! 2. **Blocked Threads Queued**: Every blocked thread is on the wait queue
//!    and associated with a live wait set
//! 3. **Pending Registry Integrity**: The registry links exactly the wait
//!    sets flagged as pending, each once
//! 4. **Wait Set Shape**: Configured length fits the capacity, which fits
//!    the hard limit, and the kinds bitmap matches the slots
//! 5. **Wait Set Ownership**: A thread is only ever associated with a wait
//!    set it owns

use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;

use crate::scheduler::Scheduler;
use crate::types::MAX_WAIT_SET_CAPACITY;

/// An invariant violation with details
#[derive(Clone, Debug)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: &'static str,
    /// Description of what went wrong
    pub description: String,
}

/// Check all wait-core invariants.
///
/// Returns a list of violations (empty if all invariants hold).
pub fn check_all_invariants(sched: &Scheduler) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    violations.extend(check_wait_queue_consistency(sched));
    violations.extend(check_blocked_threads_queued(sched));
    violations.extend(check_pending_registry_integrity(sched));
    violations.extend(check_wait_set_shape(sched));
    violations.extend(check_wait_set_ownership(sched));

    violations
}

/// Invariant 1: queued threads are blocked, unique, and priority-ordered
fn check_wait_queue_consistency(sched: &Scheduler) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let mut seen = BTreeSet::new();

    for &(priority, tid) in sched.wait_queue.entries() {
        if !seen.insert(tid) {
            violations.push(InvariantViolation {
                invariant: "wait_queue_consistency",
                description: alloc::format!("Thread {} queued more than once", tid.0),
            });
        }
        match sched.threads.get(tid) {
            None => violations.push(InvariantViolation {
                invariant: "wait_queue_consistency",
                description: alloc::format!("Queued thread {} does not exist", tid.0),
            }),
            Some(thread) => {
                if !thread.is_blocked() {
                    violations.push(InvariantViolation {
                        invariant: "wait_queue_consistency",
                        description: alloc::format!(
                            "Queued thread {} is {:?}, not blocked",
                            tid.0,
                            thread.state
                        ),
                    });
                }
                if thread.priority != priority {
                    violations.push(InvariantViolation {
                        invariant: "wait_queue_consistency",
                        description: alloc::format!(
                            "Thread {} queued at priority {} but has priority {}",
                            tid.0,
                            priority.0,
                            thread.priority.0
                        ),
                    });
                }
            }
        }
    }

    for pair in sched.wait_queue.entries().windows(2) {
        if pair[0].0 < pair[1].0 {
            violations.push(InvariantViolation {
                invariant: "wait_queue_consistency",
                description: alloc::format!(
                    "Thread {} (priority {}) queued ahead of thread {} (priority {})",
                    pair[0].1 .0,
                    pair[0].0 .0,
                    pair[1].1 .0,
                    pair[1].0 .0
                ),
            });
        }
    }

    violations
}

/// Invariant 2: blocked threads are queued on a live wait set
fn check_blocked_threads_queued(sched: &Scheduler) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for thread in sched.threads.iter().filter(|t| t.is_blocked()) {
        if !sched.wait_queue.contains(thread.id) {
            violations.push(InvariantViolation {
                invariant: "blocked_threads_queued",
                description: alloc::format!("Blocked thread {} is not queued", thread.id.0),
            });
        }
        match thread.active_wait_set {
            Some(id) if sched.wait_sets.contains(id) => {}
            Some(id) => violations.push(InvariantViolation {
                invariant: "blocked_threads_queued",
                description: alloc::format!(
                    "Blocked thread {} waits on dead wait set {:?}",
                    thread.id.0,
                    id
                ),
            }),
            None => violations.push(InvariantViolation {
                invariant: "blocked_threads_queued",
                description: alloc::format!(
                    "Blocked thread {} has no wait set",
                    thread.id.0
                ),
            }),
        }
    }

    violations
}

/// Invariant 3: registry links exactly the pending-flagged sets, once each
fn check_pending_registry_integrity(sched: &Scheduler) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let linked = sched.pending.ids(&sched.wait_sets);
    let mut seen = BTreeSet::new();

    for &id in &linked {
        if !seen.insert((id.index, id.generation)) {
            violations.push(InvariantViolation {
                invariant: "pending_registry_integrity",
                description: alloc::format!("Wait set {:?} linked more than once", id),
            });
            continue;
        }
        match sched.wait_sets.get(id) {
            Some(ws) if ws.is_pending() => {}
            Some(_) => violations.push(InvariantViolation {
                invariant: "pending_registry_integrity",
                description: alloc::format!("Linked wait set {:?} is not flagged pending", id),
            }),
            None => violations.push(InvariantViolation {
                invariant: "pending_registry_integrity",
                description: alloc::format!("Linked wait set {:?} does not exist", id),
            }),
        }
    }

    for (id, ws) in sched.wait_sets.iter() {
        if ws.is_pending() && !seen.contains(&(id.index, id.generation)) {
            violations.push(InvariantViolation {
                invariant: "pending_registry_integrity",
                description: alloc::format!("Wait set {:?} flagged pending but not linked", id),
            });
        }
    }

    if linked.len() != sched.pending.len() {
        violations.push(InvariantViolation {
            invariant: "pending_registry_integrity",
            description: alloc::format!(
                "Registry counts {} entries but links {}",
                sched.pending.len(),
                linked.len()
            ),
        });
    }

    violations
}

/// Invariant 4: length, capacity and kinds bitmap agree
fn check_wait_set_shape(sched: &Scheduler) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for (id, ws) in sched.wait_sets.iter() {
        if ws.capacity() > MAX_WAIT_SET_CAPACITY || ws.len() > ws.capacity() {
            violations.push(InvariantViolation {
                invariant: "wait_set_shape",
                description: alloc::format!(
                    "Wait set {:?} has {} of {} slots configured",
                    id,
                    ws.len(),
                    ws.capacity()
                ),
            });
        }

        let kinds = ws
            .slots()
            .iter()
            .filter_map(|slot| slot.kind())
            .fold(0u8, |acc, kind| acc | kind.mask_bit());
        if kinds != ws.contained_kinds() {
            violations.push(InvariantViolation {
                invariant: "wait_set_shape",
                description: alloc::format!(
                    "Wait set {:?} kinds bitmap {:#b} does not match slots {:#b}",
                    id,
                    ws.contained_kinds(),
                    kinds
                ),
            });
        }
    }

    violations
}

/// Invariant 5: associations never cross owners
fn check_wait_set_ownership(sched: &Scheduler) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();

    for thread in sched.threads.iter() {
        let Some(id) = thread.active_wait_set else {
            continue;
        };
        if let Some(ws) = sched.wait_sets.get(id) {
            if ws.owner() != thread.id {
                violations.push(InvariantViolation {
                    invariant: "wait_set_ownership",
                    description: alloc::format!(
                        "Thread {} associated with {:?} owned by thread {}",
                        thread.id.0,
                        id,
                        ws.owner().0
                    ),
                });
            }
        }
    }

    violations
}
