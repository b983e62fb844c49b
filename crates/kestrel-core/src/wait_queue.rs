//! Priority-ordered queue of threads blocked on wait sets
//!
//! Producers walk this queue front to back, so the most urgent waiter is
//! always offered an event first. Threads of equal priority keep the order
//! in which they went to sleep.

use alloc::vec::Vec;

use crate::types::{Priority, ThreadId};

/// Blocked threads, most urgent first.
#[derive(Clone, Debug, Default)]
pub struct WaitQueue {
    entries: Vec<(Priority, ThreadId)>,
}

impl WaitQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `thread` behind every queued thread of equal or higher priority
    pub fn insert(&mut self, thread: ThreadId, priority: Priority) {
        let position = self
            .entries
            .iter()
            .position(|&(p, _)| p < priority)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, (priority, thread));
    }

    /// Remove `thread` if queued
    pub fn remove(&mut self, thread: ThreadId) -> bool {
        match self.entries.iter().position(|&(_, t)| t == thread) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Remove the entry at `index`
    pub fn remove_at(&mut self, index: usize) -> ThreadId {
        self.entries.remove(index).1
    }

    /// Thread at `index`
    pub fn get(&self, index: usize) -> Option<ThreadId> {
        self.entries.get(index).map(|&(_, t)| t)
    }

    /// Check if `thread` is queued
    pub fn contains(&self, thread: ThreadId) -> bool {
        self.entries.iter().any(|&(_, t)| t == thread)
    }

    /// Queued threads in wake order
    pub fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.entries.iter().map(|&(_, t)| t)
    }

    /// Queued (priority, thread) pairs in wake order
    pub fn entries(&self) -> &[(Priority, ThreadId)] {
        &self.entries
    }

    /// Number of queued threads
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    #[test]
    fn test_priority_order() {
        let mut queue = WaitQueue::new();
        queue.insert(ThreadId(1), Priority::LOW);
        queue.insert(ThreadId(2), Priority::HIGH);
        queue.insert(ThreadId(3), Priority::NORMAL);

        let order: Vec<_> = queue.iter().collect();
        assert_eq!(order, vec![ThreadId(2), ThreadId(3), ThreadId(1)]);
    }

    #[test]
    fn test_equal_priority_is_fifo() {
        let mut queue = WaitQueue::new();
        queue.insert(ThreadId(1), Priority::NORMAL);
        queue.insert(ThreadId(2), Priority::NORMAL);
        queue.insert(ThreadId(3), Priority::HIGH);
        queue.insert(ThreadId(4), Priority::NORMAL);

        let order: Vec<_> = queue.iter().collect();
        assert_eq!(order, vec![ThreadId(3), ThreadId(1), ThreadId(2), ThreadId(4)]);
    }

    #[test]
    fn test_remove() {
        let mut queue = WaitQueue::new();
        queue.insert(ThreadId(1), Priority::NORMAL);
        queue.insert(ThreadId(2), Priority::NORMAL);

        assert!(queue.remove(ThreadId(1)));
        assert!(!queue.remove(ThreadId(1)));
        assert!(!queue.contains(ThreadId(1)));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.remove_at(0), ThreadId(2));
        assert!(queue.is_empty());
    }
}
