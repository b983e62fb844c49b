//! Index-stable wait-set table
//!
//! Wait sets are referenced from three places: the owning handle, the
//! blocked thread's back-reference, and the pending-wake registry links.
//! All three hold a `WaitSetId`, so removal on destroy is a checked table
//! operation and a stale id simply fails to resolve.

use alloc::vec::Vec;

use crate::types::WaitSetId;
use crate::waitset::WaitSet;

struct Entry {
    generation: u32,
    wait_set: Option<WaitSet>,
}

/// Generational slot map of wait sets.
#[derive(Default)]
pub struct WaitSetTable {
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
}

impl WaitSetTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a wait set, returning its id
    pub fn insert(&mut self, wait_set: WaitSet) -> WaitSetId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let entry = &mut self.entries[index as usize];
            entry.wait_set = Some(wait_set);
            return WaitSetId {
                index,
                generation: entry.generation,
            };
        }
        let index = self.entries.len() as u32;
        self.entries.push(Entry {
            generation: 0,
            wait_set: Some(wait_set),
        });
        WaitSetId {
            index,
            generation: 0,
        }
    }

    /// Get a wait set by id
    pub fn get(&self, id: WaitSetId) -> Option<&WaitSet> {
        self.entries
            .get(id.index as usize)
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.wait_set.as_ref())
    }

    /// Get a mutable wait set by id
    pub fn get_mut(&mut self, id: WaitSetId) -> Option<&mut WaitSet> {
        self.entries
            .get_mut(id.index as usize)
            .filter(|e| e.generation == id.generation)
            .and_then(|e| e.wait_set.as_mut())
    }

    /// Remove a wait set; its id and every copy of it become stale
    pub fn remove(&mut self, id: WaitSetId) -> Option<WaitSet> {
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation {
            return None;
        }
        let wait_set = entry.wait_set.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(wait_set)
    }

    /// Check if an id is live
    pub fn contains(&self, id: WaitSetId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live wait sets
    pub fn len(&self) -> usize {
        self.live
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterate over live wait sets
    pub fn iter(&self) -> impl Iterator<Item = (WaitSetId, &WaitSet)> + '_ {
        self.entries.iter().enumerate().filter_map(|(index, e)| {
            e.wait_set.as_ref().map(|ws| {
                (
                    WaitSetId {
                        index: index as u32,
                        generation: e.generation,
                    },
                    ws,
                )
            })
        })
    }
}
