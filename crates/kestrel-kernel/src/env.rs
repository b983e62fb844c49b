//! HAL-backed implementations of the core's collaborator traits

use kestrel_core::{
    Heap, HeapError, ObjectId, ResolvedSource, SourceKind, Timeout, WaitEnvironment,
};
use kestrel_hal::{HeapQuota, HAL};

use crate::objects::KernelObject;
use crate::sealing::{ObjectTable, ObjectType};

/// Heap charged against the kernel quota first, then the platform.
///
/// Reservation never blocks: a `Timeout` that would allow waiting is
/// treated as a single attempt.
pub struct KernelHeap<'a, H: HAL> {
    pub quota: &'a HeapQuota,
    pub hal: &'a H,
}

impl<H: HAL> Heap for KernelHeap<'_, H> {
    fn allocate(&self, bytes: usize, _timeout: Timeout) -> Result<(), HeapError> {
        if !self.quota.try_reserve(bytes) {
            return Err(HeapError::Exhausted);
        }
        if self.hal.heap_reserve(bytes).is_err() {
            self.quota.release(bytes);
            return Err(HeapError::Exhausted);
        }
        Ok(())
    }

    fn free(&self, bytes: usize) {
        self.hal.heap_release(bytes);
        self.quota.release(bytes);
    }
}

/// Source resolution over the sealed object table and HAL memory.
pub struct KernelEnv<'a, H: HAL> {
    pub objects: &'a ObjectTable,
    pub hal: &'a H,
}

impl<H: HAL> WaitEnvironment for KernelEnv<'_, H> {
    fn unseal(&self, kind: SourceKind, token: u64) -> Option<ResolvedSource> {
        let expected = match kind {
            SourceKind::Queue => ObjectType::Queue,
            SourceKind::EventChannel => ObjectType::EventChannel,
            SourceKind::Futex => return None,
        };
        match self.objects.unseal_checked(token, expected) {
            Ok((sealed, KernelObject::Queue(queue))) => Some(ResolvedSource::Queue {
                id: ObjectId(sealed.to_raw()),
                readiness: queue.readiness(),
            }),
            Ok((sealed, KernelObject::EventChannel(channel))) => {
                Some(ResolvedSource::EventChannel {
                    id: ObjectId(sealed.to_raw()),
                    bits: channel.bits(),
                })
            }
            Err(e) => {
                log::trace!("unseal {:#x} as {:?} failed: {:?}", token, expected, e);
                None
            }
        }
    }

    fn load_word(&self, address: u64) -> Option<u32> {
        self.hal.load_word(address).ok()
    }
}
