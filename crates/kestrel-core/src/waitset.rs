//! Wait sets: one thread's "wait on any of these" request
//!
//! A wait set owns a fixed-capacity buffer of event slots. The heap is
//! charged for the header and every slot in one non-blocking allocation when
//! the set is created, so multi-wait setup never blocks on memory.

use alloc::boxed::Box;
use alloc::vec;

use crate::env::{Heap, WaitEnvironment};
use crate::error::MultiwaitError;
use crate::slot::EventSlot;
use crate::types::{
    ArmOutcome, EventDescriptor, Notification, ObjectId, ResolvedSource, SourceKind, ThreadId,
    Timeout, WaitSetId, MAX_WAIT_SET_CAPACITY, READY_MASK,
};

/// Bytes charged for a wait set's fixed header.
pub const WAIT_SET_HEADER_BYTES: usize = 2 * core::mem::size_of::<u64>();

/// Total heap charge for a wait set of `capacity` slots.
pub const fn allocation_size(capacity: usize) -> usize {
    WAIT_SET_HEADER_BYTES + capacity * core::mem::size_of::<EventSlot>()
}

/// A bounded set of armed event slots.
pub struct WaitSet {
    /// Thread that created the set; the only one allowed to configure,
    /// wait on, or collect from it
    owner: ThreadId,
    /// Number of configured slots
    len: u8,
    /// Bitmap of `SourceKind::mask_bit` for the configured slots
    contained_kinds: u8,
    /// Next entry in the pending-wake registry
    pub(crate) pending_next: Option<WaitSetId>,
    /// Whether this set is currently linked into the pending-wake registry
    pub(crate) pending: bool,
    /// Slot storage; its length is the capacity
    slots: Box<[EventSlot]>,
}

impl WaitSet {
    /// Create a wait set with room for `capacity` sources.
    ///
    /// # Errors
    /// - `InvalidArgument` if `capacity` exceeds `MAX_WAIT_SET_CAPACITY`
    /// - `OutOfMemory` if the heap cannot satisfy the request immediately
    pub fn new<H: Heap + ?Sized>(
        owner: ThreadId,
        capacity: usize,
        heap: &H,
    ) -> Result<Self, MultiwaitError> {
        if capacity > MAX_WAIT_SET_CAPACITY {
            return Err(MultiwaitError::InvalidArgument);
        }
        heap.allocate(allocation_size(capacity), Timeout::NonBlocking)?;
        Ok(Self {
            owner,
            len: 0,
            contained_kinds: 0,
            pending_next: None,
            pending: false,
            slots: vec![EventSlot::unarmed(); capacity].into_boxed_slice(),
        })
    }

    /// Return this set's heap charge.
    pub fn release<H: Heap + ?Sized>(self, heap: &H) {
        heap.free(allocation_size(self.capacity()));
    }

    /// Maximum number of sources
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of configured sources
    pub fn len(&self) -> usize {
        usize::from(self.len)
    }

    /// Check if no sources are configured
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Creating thread
    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    /// Contained-kinds bitmap
    pub fn contained_kinds(&self) -> u8 {
        self.contained_kinds
    }

    /// Whether any configured slot watches a source of `kind`
    pub fn contains_kind(&self, kind: SourceKind) -> bool {
        self.contained_kinds & kind.mask_bit() != 0
    }

    /// Whether this set is linked into the pending-wake registry
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Configured slots
    pub fn slots(&self) -> &[EventSlot] {
        &self.slots[..self.len()]
    }

    /// Replace the configured sources with `descriptors` and arm them.
    ///
    /// Every descriptor is resolved through `env`. Any invalid descriptor
    /// aborts the whole call and leaves the set empty until it is
    /// successfully reconfigured.
    pub fn configure<E: WaitEnvironment + ?Sized>(
        &mut self,
        env: &E,
        descriptors: &[EventDescriptor],
    ) -> Result<ArmOutcome, MultiwaitError> {
        self.len = 0;
        self.contained_kinds = 0;

        if descriptors.len() > self.capacity() {
            return Err(MultiwaitError::InvalidArgument);
        }

        let mut fired = false;
        let mut kinds = 0u8;
        for (slot, descriptor) in self.slots.iter_mut().zip(descriptors) {
            let source = resolve(env, descriptor)?;
            fired |= slot.arm(source, descriptor.value);
            kinds |= source.kind().mask_bit();
        }

        // Only a fully armed set becomes visible to producers.
        self.len = descriptors.len() as u8;
        self.contained_kinds = kinds;

        Ok(if fired {
            ArmOutcome::ImmediateWake
        } else {
            ArmOutcome::MustSleep
        })
    }

    /// Deliver a notification to every configured slot.
    ///
    /// Returns true if any slot matched and has fired, meaning the owning
    /// thread should be woken.
    pub fn trigger(&mut self, notification: &Notification) -> bool {
        if !self.contains_kind(notification.kind()) {
            return false;
        }
        let len = self.len();
        let mut should_wake = false;
        for slot in &mut self.slots[..len] {
            should_wake |= slot.notify(notification);
        }
        should_wake
    }

    /// Copy each slot's ready bitmap into `out`.
    ///
    /// Entries past the configured length are written as zero. Returns true
    /// if any slot fired.
    ///
    /// # Panics
    /// If `out` is longer than the capacity; that is a caller contract
    /// violation.
    pub fn collect(&self, out: &mut [u32]) -> bool {
        assert!(
            out.len() <= self.capacity(),
            "Invalid length {} > {}",
            out.len(),
            self.capacity()
        );
        let mut found = false;
        for (i, result) in out.iter_mut().enumerate() {
            *result = if i < self.len() {
                self.slots[i].ready_events()
            } else {
                0
            };
            found |= *result != 0;
        }
        found
    }

    /// Whether any configured slot has fired
    pub fn any_fired(&self) -> bool {
        self.slots().iter().any(EventSlot::is_fired)
    }

    /// Channel bits to clear for fired clear-on-exit slots.
    pub fn clear_on_exit_requests(&self) -> impl Iterator<Item = (ObjectId, u32)> + '_ {
        self.slots().iter().filter_map(EventSlot::clear_on_exit)
    }
}

impl core::fmt::Debug for WaitSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WaitSet")
            .field("owner", &self.owner)
            .field("capacity", &self.capacity())
            .field("contained_kinds", &self.contained_kinds)
            .field("pending", &self.pending)
            .field("slots", &self.slots())
            .finish()
    }
}

/// Resolve one descriptor into an armable source.
fn resolve<E: WaitEnvironment + ?Sized>(
    env: &E,
    descriptor: &EventDescriptor,
) -> Result<ResolvedSource, MultiwaitError> {
    let kind = SourceKind::from_u8(descriptor.kind).ok_or(MultiwaitError::InvalidArgument)?;
    match kind {
        SourceKind::Queue => {
            let source = env
                .unseal(kind, descriptor.source)
                .ok_or(MultiwaitError::InvalidHandle)?;
            if source.kind() != kind {
                return Err(MultiwaitError::InvalidHandle);
            }
            Ok(source)
        }
        SourceKind::EventChannel => {
            let source = env
                .unseal(kind, descriptor.source)
                .ok_or(MultiwaitError::InvalidHandle)?;
            if source.kind() != kind {
                return Err(MultiwaitError::InvalidHandle);
            }
            if descriptor.value & READY_MASK == 0 {
                return Err(MultiwaitError::InvalidArgument);
            }
            Ok(source)
        }
        SourceKind::Futex => {
            let current = env
                .load_word(descriptor.source)
                .ok_or(MultiwaitError::PermissionDenied)?;
            Ok(ResolvedSource::Futex {
                address: descriptor.source,
                current,
            })
        }
    }
}
