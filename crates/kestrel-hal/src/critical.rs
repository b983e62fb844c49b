//! Scheduler-exclusion guard
//!
//! Every wait-set and producer operation runs with preemption disabled. The
//! guard disables it on creation and restores the previous state on drop, so
//! nesting is safe.

use crate::HAL;

/// RAII guard holding preemption off for its lifetime.
#[must_use = "preemption is re-enabled as soon as the guard is dropped"]
pub struct CriticalSection<'a, H: HAL + ?Sized> {
    hal: &'a H,
    was_enabled: bool,
}

impl<'a, H: HAL + ?Sized> CriticalSection<'a, H> {
    /// Disable preemption until the returned guard is dropped.
    pub fn enter(hal: &'a H) -> Self {
        let was_enabled = hal.disable_preemption();
        Self { hal, was_enabled }
    }
}

impl<H: HAL + ?Sized> Drop for CriticalSection<'_, H> {
    fn drop(&mut self) {
        self.hal.restore_preemption(self.was_enabled);
    }
}
