//! Pending-wake registry
//!
//! Holds the wait sets whose thread has been marked ready by a notification
//! but has not yet resumed and collected its results. Producers re-deliver
//! every notification to these sets first, so an event arriving between
//! "thread readied" and "thread collects" is still recorded.
//!
//! The list is intrusive: each wait set stores the id of the next entry.

use alloc::vec::Vec;

use crate::table::WaitSetTable;
use crate::types::{Notification, WaitSetId};

/// Singly-linked list of readied-but-not-resumed wait sets.
#[derive(Debug, Default)]
pub struct PendingWakeRegistry {
    head: Option<WaitSetId>,
    len: usize,
}

impl PendingWakeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of linked wait sets
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Link `id` at the head of the list.
    ///
    /// Returns false if the wait set does not exist or is already linked.
    pub fn push(&mut self, table: &mut WaitSetTable, id: WaitSetId) -> bool {
        let Some(wait_set) = table.get_mut(id) else {
            return false;
        };
        if wait_set.pending {
            return false;
        }
        wait_set.pending = true;
        wait_set.pending_next = self.head;
        self.head = Some(id);
        self.len += 1;
        true
    }

    /// Unlink `id` if present. Safe to call for sets that were never linked.
    pub fn remove(&mut self, table: &mut WaitSetTable, id: WaitSetId) -> bool {
        match table.get(id) {
            Some(wait_set) if wait_set.pending => {}
            _ => return false,
        }

        let mut prev: Option<WaitSetId> = None;
        let mut cursor = self.head;
        while let Some(current) = cursor {
            let next = table.get(current).and_then(|ws| ws.pending_next);
            if current == id {
                match prev.and_then(|p| table.get_mut(p)) {
                    Some(prev_set) => prev_set.pending_next = next,
                    None => self.head = next,
                }
                if let Some(wait_set) = table.get_mut(id) {
                    wait_set.pending = false;
                    wait_set.pending_next = None;
                }
                self.len -= 1;
                return true;
            }
            prev = Some(current);
            cursor = next;
        }
        false
    }

    /// Deliver `notification` to every linked wait set.
    pub fn deliver(&self, table: &mut WaitSetTable, notification: &Notification) {
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let Some(wait_set) = table.get_mut(id) else {
                break;
            };
            wait_set.trigger(notification);
            cursor = wait_set.pending_next;
        }
    }

    /// Linked ids, head first
    pub fn ids(&self, table: &WaitSetTable) -> Vec<WaitSetId> {
        let mut ids = Vec::with_capacity(self.len);
        let mut cursor = self.head;
        // Bounded by the table size so a corrupted link cannot spin forever.
        while let Some(id) = cursor {
            if ids.len() > table.len() {
                break;
            }
            ids.push(id);
            cursor = table.get(id).and_then(|ws| ws.pending_next);
        }
        ids
    }
}
