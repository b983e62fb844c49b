//! Core kernel types
//!
//! This module contains the fundamental types used throughout the wait core.
//! All types here are pure data - no behavior that depends on HAL.

use serde::{Deserialize, Serialize};

/// Maximum number of event slots a wait set may hold.
///
/// Bounds the time a producer spends scanning one wait set.
pub const MAX_WAIT_SET_CAPACITY: usize = 8;

/// Number of bits available in an event slot's ready bitmap.
pub const READY_BITS: u32 = 24;

/// Mask of the valid ready-bitmap bits.
pub const READY_MASK: u32 = (1 << READY_BITS) - 1;

/// Scheduler time, in ticks since boot
pub type Ticks = u64;

/// Thread identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub u32);

/// Kernel object identifier (queues and event channels)
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub u64);

/// Handle to a wait set in the scheduler's wait-set table.
///
/// The generation makes stale handles fail closed once the wait set has been
/// destroyed and its slot reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WaitSetId {
    /// Slot index in the table
    pub index: u32,
    /// Generation of the slot when this handle was issued
    pub generation: u32,
}

/// Thread priority. Numerically higher priorities are more urgent.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Priority(pub u8);

impl Priority {
    pub const IDLE: Priority = Priority(0);
    pub const LOW: Priority = Priority(64);
    pub const NORMAL: Priority = Priority(128);
    pub const HIGH: Priority = Priority(192);
    pub const CRITICAL: Priority = Priority(255);
}

impl Default for Priority {
    fn default() -> Self {
        Priority::NORMAL
    }
}

/// How long a thread is prepared to block.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeout {
    /// Never block: report immediately if nothing is already satisfied
    NonBlocking,
    /// Block for at most this many ticks
    Ticks(Ticks),
    /// Block with no deadline
    Unbounded,
}

impl Timeout {
    /// Returns true if this timeout permits suspending at all.
    pub fn may_block(&self) -> bool {
        !matches!(self, Timeout::NonBlocking | Timeout::Ticks(0))
    }

    /// Absolute deadline for a wait starting at `now`, if any.
    pub fn deadline(&self, now: Ticks) -> Option<Ticks> {
        match self {
            Timeout::NonBlocking => Some(now),
            Timeout::Ticks(n) => Some(now.saturating_add(*n)),
            Timeout::Unbounded => None,
        }
    }
}

/// Kind of event source an event slot monitors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SourceKind {
    /// Message queue readiness
    Queue = 0,
    /// Event channel bit pattern
    EventChannel = 1,
    /// Memory word value change
    Futex = 2,
}

impl SourceKind {
    /// Convert from u8
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(SourceKind::Queue),
            1 => Some(SourceKind::EventChannel),
            2 => Some(SourceKind::Futex),
            _ => None,
        }
    }

    /// Bit for this kind in a wait set's contained-kinds mask.
    pub const fn mask_bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Why a blocked thread became ready again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WakeReason {
    /// One of the armed sources fired
    Event,
    /// The wait deadline expired
    Timer,
    /// The wait set was destroyed underneath the sleeping thread
    Destroyed,
}

/// Scheduling state of a thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadState {
    /// Runnable
    Ready,
    /// Suspended on a wait set
    Blocked,
}

/// A caller-supplied wait request for one source, as it crosses the
/// syscall boundary.
///
/// `kind` is kept raw so that malformed values can be rejected during
/// configuration instead of at decode time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDescriptor {
    /// Raw `SourceKind` discriminant
    pub kind: u8,
    /// Sealed token bits (Queue / EventChannel) or word address (Futex)
    pub source: u64,
    /// Kind-specific arm condition
    pub value: u32,
}

impl EventDescriptor {
    /// Wait for queue readiness.
    pub fn queue(token: u64, conditions: u32) -> Self {
        Self {
            kind: SourceKind::Queue as u8,
            source: token,
            value: conditions,
        }
    }

    /// Wait for event channel bits.
    pub fn event_channel(token: u64, bits: u32) -> Self {
        Self {
            kind: SourceKind::EventChannel as u8,
            source: token,
            value: bits,
        }
    }

    /// Wait for the word at `address` to differ from `expected`.
    pub fn futex(address: u64, expected: u32) -> Self {
        Self {
            kind: SourceKind::Futex as u8,
            source: address,
            value: expected,
        }
    }
}

/// A source after unsealing / permission checks, with a snapshot of its
/// current state for the already-satisfied check at arm time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolvedSource {
    /// A message queue and its current readiness bits
    Queue { id: ObjectId, readiness: u32 },
    /// An event channel and its current flag word
    EventChannel { id: ObjectId, bits: u32 },
    /// A readable memory word and its current value
    Futex { address: u64, current: u32 },
}

impl ResolvedSource {
    /// Kind of this source
    pub fn kind(&self) -> SourceKind {
        match self {
            ResolvedSource::Queue { .. } => SourceKind::Queue,
            ResolvedSource::EventChannel { .. } => SourceKind::EventChannel,
            ResolvedSource::Futex { .. } => SourceKind::Futex,
        }
    }
}

/// A producer-side notification: one domain event on one source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    /// Queue state changed; `readiness` is the queue's readiness after the change
    Queue { id: ObjectId, readiness: u32 },
    /// Bits were raised on an event channel
    EventChannel { id: ObjectId, bits: u32 },
    /// The word at `address` may have changed
    Futex { address: u64 },
}

impl Notification {
    /// Kind of source this notification targets
    pub fn kind(&self) -> SourceKind {
        match self {
            Notification::Queue { .. } => SourceKind::Queue,
            Notification::EventChannel { .. } => SourceKind::EventChannel,
            Notification::Futex { .. } => SourceKind::Futex,
        }
    }
}

/// Result of arming a wait set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArmOutcome {
    /// At least one source was already satisfied; do not sleep
    ImmediateWake,
    /// Nothing fired yet; the caller should wait
    MustSleep,
}

/// Result of asking to wait on a configured wait set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitStatus {
    /// The thread is suspended on the wait queue
    Blocked,
    /// The timeout did not permit blocking; the thread was never queued
    TimedOut,
}

// ============================================================================
// Source-specific condition bits
// ============================================================================

/// Queue condition: wake when the queue has room to send
pub const QUEUE_SEND_READY: u32 = 1 << 0;
/// Queue condition: wake when the queue has a message to receive
pub const QUEUE_RECEIVE_READY: u32 = 1 << 1;

/// Event channel condition: clear the fired bits from the channel on collect
pub const EVENT_CLEAR_ON_EXIT: u32 = 1 << 24;
/// Event channel condition: fire only once every masked bit is set
pub const EVENT_WAIT_ALL: u32 = 1 << 25;
