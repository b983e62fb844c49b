//! Thread table
//!
//! The wait core only needs a small view of a thread: its priority, whether
//! it is runnable, and which wait set (if any) it is blocked on.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};

use crate::types::{Priority, ThreadId, ThreadState, Ticks, WaitSetId, WakeReason};

/// Thread descriptor
#[derive(Clone, Debug)]
pub struct Thread {
    /// Thread ID
    pub id: ThreadId,
    /// Thread name
    pub name: String,
    /// Scheduling priority
    pub priority: Priority,
    /// Current state
    pub state: ThreadState,
    /// Wait set this thread is blocked on, for the duration of a multi-wait
    pub active_wait_set: Option<WaitSetId>,
    /// Why the thread last became ready, until it resumes
    pub wake_reason: Option<WakeReason>,
    /// Absolute tick at which a blocked thread times out
    pub deadline: Option<Ticks>,
    /// Order in which the thread last became ready (FIFO among equals)
    pub ready_seq: u64,
}

impl Thread {
    /// Check if the thread can be scheduled
    pub fn is_ready(&self) -> bool {
        self.state == ThreadState::Ready
    }

    /// Check if the thread is suspended on a wait set
    pub fn is_blocked(&self) -> bool {
        self.state == ThreadState::Blocked
    }
}

/// All threads known to one scheduler.
#[derive(Debug)]
pub struct ThreadTable {
    threads: BTreeMap<ThreadId, Thread>,
    next_id: u32,
}

impl ThreadTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self {
            threads: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register a new ready thread
    pub fn spawn(&mut self, name: &str, priority: Priority, ready_seq: u64) -> ThreadId {
        let id = ThreadId(self.next_id);
        self.next_id += 1;
        self.threads.insert(
            id,
            Thread {
                id,
                name: name.to_string(),
                priority,
                state: ThreadState::Ready,
                active_wait_set: None,
                wake_reason: None,
                deadline: None,
                ready_seq,
            },
        );
        id
    }

    /// Get thread by ID
    pub fn get(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.get(&id)
    }

    /// Get mutable thread by ID
    pub fn get_mut(&mut self, id: ThreadId) -> Option<&mut Thread> {
        self.threads.get_mut(&id)
    }

    /// Remove an exited thread. Its id is never handed out again.
    pub fn remove(&mut self, id: ThreadId) -> Option<Thread> {
        self.threads.remove(&id)
    }

    /// Iterate over all threads
    pub fn iter(&self) -> impl Iterator<Item = &Thread> + '_ {
        self.threads.values()
    }

    /// Iterate mutably over all threads
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Thread> + '_ {
        self.threads.values_mut()
    }

    /// Number of threads
    pub fn len(&self) -> usize {
        self.threads.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}
