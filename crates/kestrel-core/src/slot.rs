//! Per-source wait state
//!
//! An `EventSlot` is the knote of the wait core: it records which source is
//! being watched, the condition it was armed with, and the events that have
//! been delivered since it was armed.
//!
//! # Layout
//!
//! A slot is exactly two 64-bit words: the source reference, then the arm
//! condition followed by a packed status word:
//!
//! ```text
//!  31 30 29        24 23                          0
//! ┌─────┬────────────┬─────────────────────────────┐
//! │kind │   flags    │        ready events         │
//! └─────┴────────────┴─────────────────────────────┘
//! ```
//!
//! Wait sets are arrays of slots, so the size is checked at compile time.

use crate::types::{
    Notification, ObjectId, ResolvedSource, SourceKind, EVENT_CLEAR_ON_EXIT, EVENT_WAIT_ALL,
    QUEUE_RECEIVE_READY, QUEUE_SEND_READY, READY_BITS, READY_MASK,
};

const FLAGS_SHIFT: u32 = READY_BITS;
const FLAGS_MASK: u32 = 0x3f;
const KIND_SHIFT: u32 = 30;
const KIND_UNARMED: u32 = 0b11;

/// Event channel slot flag: clear fired bits from the channel on collect
pub const SLOT_FLAG_CLEAR_ON_EXIT: u8 = 1 << 0;
/// Event channel slot flag: require every masked bit
pub const SLOT_FLAG_WAIT_ALL: u8 = 1 << 1;

/// Packed kind / flags / ready-events word.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
struct SlotStatus(u32);

impl SlotStatus {
    const UNARMED: SlotStatus = SlotStatus(KIND_UNARMED << KIND_SHIFT);

    fn armed(kind: SourceKind, flags: u8) -> Self {
        let flags = u32::from(flags) & FLAGS_MASK;
        SlotStatus(((kind as u32) << KIND_SHIFT) | (flags << FLAGS_SHIFT))
    }

    fn kind(self) -> Option<SourceKind> {
        SourceKind::from_u8((self.0 >> KIND_SHIFT) as u8)
    }

    fn flags(self) -> u8 {
        ((self.0 >> FLAGS_SHIFT) & FLAGS_MASK) as u8
    }

    fn ready(self) -> u32 {
        self.0 & READY_MASK
    }

    fn add_ready(&mut self, value: u32) {
        assert!(
            value & !READY_MASK == 0,
            "{:#x} is out of range for a delivered event",
            value
        );
        self.0 |= value;
    }
}

/// State for waiting on a single event source.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct EventSlot {
    /// Object id (Queue / EventChannel) or word address (Futex)
    source: u64,
    /// Kind-specific arm condition
    condition: u32,
    status: SlotStatus,
}

const _: () = assert!(
    core::mem::size_of::<EventSlot>() == 2 * core::mem::size_of::<u64>(),
    "Each waited event should consume only two words of memory"
);

impl EventSlot {
    /// A slot that matches no notification.
    pub const fn unarmed() -> Self {
        Self {
            source: 0,
            condition: 0,
            status: SlotStatus::UNARMED,
        }
    }

    /// Arm this slot against `source` with the caller's `value`.
    ///
    /// Clears any previous state. Returns true if the condition is already
    /// satisfied by the source's current state.
    pub fn arm(&mut self, source: ResolvedSource, value: u32) -> bool {
        match source {
            ResolvedSource::Queue { id, readiness } => {
                self.source = id.0;
                self.condition = value & (QUEUE_SEND_READY | QUEUE_RECEIVE_READY);
                self.status = SlotStatus::armed(SourceKind::Queue, 0);
                self.status.add_ready(readiness & self.condition);
            }
            ResolvedSource::EventChannel { id, bits } => {
                let mut flags = 0;
                if value & EVENT_CLEAR_ON_EXIT != 0 {
                    flags |= SLOT_FLAG_CLEAR_ON_EXIT;
                }
                if value & EVENT_WAIT_ALL != 0 {
                    flags |= SLOT_FLAG_WAIT_ALL;
                }
                self.source = id.0;
                self.condition = value & READY_MASK;
                self.status = SlotStatus::armed(SourceKind::EventChannel, flags);
                let matched = self.channel_match(bits);
                self.status.add_ready(matched);
            }
            ResolvedSource::Futex { address, current } => {
                self.source = address;
                self.condition = value;
                self.status = SlotStatus::armed(SourceKind::Futex, 0);
                if current != value {
                    self.status.add_ready(1);
                }
            }
        }
        self.is_fired()
    }

    /// Deliver a notification to this slot.
    ///
    /// Does nothing and returns false if the notification is for another
    /// kind or another source. Otherwise merges the ready information and
    /// returns whether the slot has fired.
    pub fn notify(&mut self, notification: &Notification) -> bool {
        if self.status.kind() != Some(notification.kind()) {
            return false;
        }
        match *notification {
            Notification::Queue { id, readiness } => {
                if id.0 != self.source {
                    return false;
                }
                self.status.add_ready(readiness & self.condition);
            }
            Notification::EventChannel { id, bits } => {
                if id.0 != self.source {
                    return false;
                }
                let matched = self.channel_match(bits);
                self.status.add_ready(matched);
            }
            Notification::Futex { address } => {
                if address != self.source {
                    return false;
                }
                self.status.add_ready(1);
            }
        }
        self.is_fired()
    }

    /// Returns true if this slot has fired.
    pub fn is_fired(&self) -> bool {
        self.status.ready() != 0
    }

    /// Kind this slot is armed for, or `None` if unarmed.
    pub fn kind(&self) -> Option<SourceKind> {
        self.status.kind()
    }

    /// Raw source reference.
    pub fn source(&self) -> u64 {
        self.source
    }

    /// Arm condition (mask for event channels).
    pub fn condition(&self) -> u32 {
        self.condition
    }

    /// Kind-specific flags.
    pub fn flags(&self) -> u8 {
        self.status.flags()
    }

    /// Events delivered since the slot was armed.
    pub fn ready_events(&self) -> u32 {
        self.status.ready()
    }

    /// For a fired event-channel slot armed with clear-on-exit, the channel
    /// and the bits that should be cleared from it.
    pub fn clear_on_exit(&self) -> Option<(ObjectId, u32)> {
        if self.kind() == Some(SourceKind::EventChannel)
            && self.flags() & SLOT_FLAG_CLEAR_ON_EXIT != 0
            && self.is_fired()
        {
            Some((ObjectId(self.source), self.ready_events()))
        } else {
            None
        }
    }

    fn channel_match(&self, bits: u32) -> u32 {
        let matched = bits & self.condition;
        if self.flags() & SLOT_FLAG_WAIT_ALL != 0 && matched != self.condition {
            0
        } else {
            matched
        }
    }
}

impl Default for EventSlot {
    fn default() -> Self {
        Self::unarmed()
    }
}

impl core::fmt::Debug for EventSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventSlot")
            .field("kind", &self.kind())
            .field("source", &format_args!("{:#x}", self.source))
            .field("condition", &format_args!("{:#x}", self.condition))
            .field("flags", &self.flags())
            .field("ready", &format_args!("{:#x}", self.ready_events()))
            .finish()
    }
}

// ============================================================================
// Kani Proofs for slot delivery
// ============================================================================

#[cfg(kani)]
mod proofs {
    use super::*;

    /// Proof: delivery only ever adds ready bits
    #[kani::proof]
    fn ready_bits_monotonic() {
        let mut slot = EventSlot::unarmed();
        let mask: u32 = kani::any();
        kani::assume(mask & READY_MASK != 0 && mask & !READY_MASK == 0);
        slot.arm(
            ResolvedSource::EventChannel {
                id: ObjectId(1),
                bits: 0,
            },
            mask,
        );
        let before = slot.ready_events();
        let bits: u32 = kani::any();
        kani::assume(bits & !READY_MASK == 0);
        slot.notify(&Notification::EventChannel {
            id: ObjectId(1),
            bits,
        });
        kani::assert(
            slot.ready_events() & before == before,
            "Delivered events must never be cleared",
        );
    }

    /// Proof: a notification for another source never changes the slot
    #[kani::proof]
    fn mismatched_source_is_noop() {
        let mut slot = EventSlot::unarmed();
        let address: u64 = kani::any();
        let other: u64 = kani::any();
        kani::assume(address != other);
        slot.arm(ResolvedSource::Futex { address, current: 0 }, 0);
        let before = slot;
        let fired = slot.notify(&Notification::Futex { address: other });
        kani::assert(!fired, "Mismatched notification must not fire");
        kani::assert(slot == before, "Mismatched notification must not mutate");
    }
}
