//! Wait-primitive audit trail
//!
//! Records wait-set lifecycle and wake events with monotonic ids. Unlike
//! the `log` output this is structured and can be exported as JSON for
//! offline inspection.

use alloc::string::String;
use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use kestrel_core::{SourceKind, ThreadId, Ticks, Timeout, WaitSetId, WakeReason};

/// Audit event id (monotonic)
pub type AuditId = u64;

/// One recorded event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID (monotonic)
    pub id: AuditId,
    /// Tick at which the event happened
    pub timestamp: Ticks,
    pub kind: AuditEventKind,
}

/// What happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventKind {
    WaitSetCreated {
        owner: ThreadId,
        wait_set: WaitSetId,
        capacity: usize,
    },
    WaitSetDestroyed {
        wait_set: WaitSetId,
    },
    Configured {
        wait_set: WaitSetId,
        sources: usize,
        immediate: bool,
    },
    Slept {
        thread: ThreadId,
        wait_set: WaitSetId,
        timeout: Timeout,
    },
    Woken {
        thread: ThreadId,
        reason: WakeReason,
    },
    Notified {
        kind: SourceKind,
        woken: u32,
    },
    Collected {
        wait_set: WaitSetId,
        fired: bool,
    },
}

/// Bounded, append-only audit log.
pub struct AuditLog {
    events: Vec<AuditEvent>,
    next_id: AuditId,
    capacity: usize,
}

impl AuditLog {
    /// Create a log keeping at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Vec::new(),
            next_id: 0,
            capacity,
        }
    }

    /// Append an event, returning its id.
    pub fn record(&mut self, timestamp: Ticks, kind: AuditEventKind) -> AuditId {
        let id = self.next_id;
        self.next_id += 1;
        self.events.push(AuditEvent {
            id,
            timestamp,
            kind,
        });
        self.trim_if_needed();
        id
    }

    pub fn events(&self) -> &[AuditEvent] {
        &self.events
    }

    /// Most recent `count` events, newest first
    pub fn recent(&self, count: usize) -> Vec<&AuditEvent> {
        self.events.iter().rev().take(count).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn next_id(&self) -> AuditId {
        self.next_id
    }

    /// Serialize the retained events as a JSON array.
    pub fn export_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.events)
    }

    fn trim_if_needed(&mut self) {
        if self.events.len() > self.capacity {
            let drain_count = self.events.len() - self.capacity;
            self.events.drain(0..drain_count);
        }
    }
}
