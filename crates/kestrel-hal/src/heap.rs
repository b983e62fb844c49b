//! Lock-free heap quota
//!
//! Kernel objects are charged against a fixed byte budget. Reservation is a
//! single compare-exchange loop so it can be called from any context without
//! blocking.
//!
//! # Invariants
//!
//! 1. **Never over budget**: `used() <= limit()` at every observable point
//! 2. **No lost updates**: concurrent reservations and releases all land
//! 3. **No underflow**: releasing more than is reserved clamps at zero

use core::sync::atomic::{AtomicUsize, Ordering};

/// Byte budget for kernel heap objects.
pub struct HeapQuota {
    limit: usize,
    used: AtomicUsize,
}

impl HeapQuota {
    /// Create a quota of `limit` bytes, none in use.
    pub const fn new(limit: usize) -> Self {
        Self {
            limit,
            used: AtomicUsize::new(0),
        }
    }

    /// Reserve `bytes` if the whole amount fits; never partially succeeds.
    pub fn try_reserve(&self, bytes: usize) -> bool {
        loop {
            let used = self.used.load(Ordering::Relaxed);
            let Some(new_used) = used.checked_add(bytes) else {
                return false;
            };
            if new_used > self.limit {
                return false;
            }
            if self
                .used
                .compare_exchange_weak(used, new_used, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    /// Return `bytes` to the budget.
    pub fn release(&self, bytes: usize) {
        let mut used = self.used.load(Ordering::Relaxed);
        loop {
            let new_used = used.saturating_sub(bytes);
            match self.used.compare_exchange_weak(
                used,
                new_used,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return,
                Err(actual) => used = actual,
            }
        }
    }

    /// Bytes currently reserved
    pub fn used(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// Total budget
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Bytes still available
    pub fn remaining(&self) -> usize {
        self.limit.saturating_sub(self.used())
    }
}

impl core::fmt::Debug for HeapQuota {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HeapQuota")
            .field("limit", &self.limit)
            .field("used", &self.used())
            .finish()
    }
}

#[cfg(kani)]
mod proofs {
    use super::*;

    /// Proof: a reservation never pushes usage past the limit
    #[kani::proof]
    fn reserve_stays_within_limit() {
        let quota = HeapQuota::new(1024);
        let first: usize = kani::any();
        let second: usize = kani::any();

        quota.try_reserve(first);
        quota.try_reserve(second);

        kani::assert(quota.used() <= quota.limit(), "usage must stay within limit");
    }

    /// Proof: failed reservations leave usage unchanged
    #[kani::proof]
    fn failed_reserve_is_noop() {
        let quota = HeapQuota::new(256);
        let bytes: usize = kani::any();
        kani::assume(bytes > 256);

        kani::assert(!quota.try_reserve(bytes), "oversized request must fail");
        kani::assert(quota.used() == 0, "usage must not change");
    }
}
