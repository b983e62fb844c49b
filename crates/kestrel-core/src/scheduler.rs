//! Scheduler-owned wait state and the multi-wait protocol
//!
//! The `Scheduler` holds everything the wait core mutates: the thread table,
//! the priority-ordered wait queue, the wait-set table and the pending-wake
//! registry. There are no global singletons; every operation takes the
//! scheduler by reference, so one instance per core (or per test) is enough.
//!
//! # Protocol
//!
//! ```text
//! create ─▶ configure ─┬─ ImmediateWake ─────────────────────────┐
//!                      └─ MustSleep ─▶ wait ─▶ (Blocked)          │
//!                                               │ notify / tick /  │
//!                                               │ destroy          ▼
//!                                               └────────▶ resume ─▶ collect
//! ```
//!
//! Callers must serialize every method here against each other (the kernel
//! does so with scheduling disabled); none of them blocks.

use alloc::vec::Vec;

use crate::env::{Heap, WaitEnvironment};
use crate::error::MultiwaitError;
use crate::registry::PendingWakeRegistry;
use crate::table::WaitSetTable;
use crate::thread::{Thread, ThreadTable};
use crate::types::{
    ArmOutcome, EventDescriptor, Notification, Priority, ThreadId, ThreadState, Ticks, Timeout,
    WaitSetId, WaitStatus, WakeReason,
};
use crate::wait_queue::WaitQueue;
use crate::waitset::WaitSet;

/// Wait-side scheduler state for one core.
#[derive(Default)]
pub struct Scheduler {
    pub(crate) threads: ThreadTable,
    pub(crate) wait_queue: WaitQueue,
    pub(crate) wait_sets: WaitSetTable,
    pub(crate) pending: PendingWakeRegistry,
    now: Ticks,
    next_ready_seq: u64,
}

impl Scheduler {
    /// Create an empty scheduler at tick 0
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Threads
    // ========================================================================

    /// Register a new ready thread
    pub fn spawn_thread(&mut self, name: &str, priority: Priority) -> ThreadId {
        let seq = self.bump_ready_seq();
        self.threads.spawn(name, priority, seq)
    }

    /// Remove a thread, pulling it off the wait queue if it was blocked.
    /// Wait sets it owns are left for the caller to destroy.
    ///
    /// Returns false if the thread is unknown or already exited.
    pub fn exit_thread(&mut self, thread: ThreadId) -> bool {
        if self.threads.remove(thread).is_none() {
            return false;
        }
        self.wait_queue.remove(thread);
        true
    }

    /// Highest-priority ready thread; equal priorities in the order they
    /// became ready.
    pub fn pick_next(&self) -> Option<ThreadId> {
        self.threads
            .iter()
            .filter(|t| t.is_ready())
            .max_by(|a, b| {
                a.priority
                    .cmp(&b.priority)
                    .then_with(|| b.ready_seq.cmp(&a.ready_seq))
            })
            .map(|t| t.id)
    }

    /// Called when `thread` runs again after a wait.
    ///
    /// Clears the thread/wait-set association and returns why the thread
    /// was woken, or `None` if it is still blocked (or never slept).
    pub fn resume(&mut self, thread: ThreadId) -> Option<WakeReason> {
        let t = self.threads.get_mut(thread)?;
        if !t.is_ready() {
            return None;
        }
        let reason = t.wake_reason.take()?;
        t.active_wait_set = None;
        Some(reason)
    }

    // ========================================================================
    // Wait sets
    // ========================================================================

    /// Create a wait set owned by `owner`.
    ///
    /// # Errors
    /// - `InvalidArgument` if the capacity is too large or `owner` is unknown
    /// - `OutOfMemory` if the heap cannot satisfy the request immediately
    pub fn create_wait_set<H: Heap + ?Sized>(
        &mut self,
        owner: ThreadId,
        capacity: usize,
        heap: &H,
    ) -> Result<WaitSetId, MultiwaitError> {
        if self.threads.get(owner).is_none() {
            return Err(MultiwaitError::InvalidArgument);
        }
        let wait_set = WaitSet::new(owner, capacity, heap)?;
        Ok(self.wait_sets.insert(wait_set))
    }

    /// Arm `id` with a fresh set of sources on behalf of `caller`.
    ///
    /// Starts a new wait cycle, so the set is first detached from the
    /// pending-wake registry.
    pub fn configure<E: WaitEnvironment + ?Sized>(
        &mut self,
        caller: ThreadId,
        id: WaitSetId,
        env: &E,
        descriptors: &[EventDescriptor],
    ) -> Result<ArmOutcome, MultiwaitError> {
        self.check_owner(caller, id)?;
        self.pending.remove(&mut self.wait_sets, id);
        let wait_set = self
            .wait_sets
            .get_mut(id)
            .ok_or(MultiwaitError::InvalidHandle)?;
        wait_set.configure(env, descriptors)
    }

    /// Suspend `caller` on `id` until a matching notification, the timeout,
    /// or destruction of the set.
    ///
    /// Call only after `configure` returned `MustSleep`. A timeout that does
    /// not permit blocking returns `TimedOut` without queueing the thread.
    pub fn wait(
        &mut self,
        caller: ThreadId,
        id: WaitSetId,
        timeout: Timeout,
    ) -> Result<WaitStatus, MultiwaitError> {
        self.check_owner(caller, id)?;
        let now = self.now;
        let thread = self
            .threads
            .get_mut(caller)
            .ok_or(MultiwaitError::InvalidArgument)?;
        if !thread.is_ready() {
            return Err(MultiwaitError::InvalidArgument);
        }
        if !timeout.may_block() {
            return Ok(WaitStatus::TimedOut);
        }
        thread.state = ThreadState::Blocked;
        thread.active_wait_set = Some(id);
        thread.wake_reason = None;
        thread.deadline = timeout.deadline(now);
        let priority = thread.priority;
        self.wait_queue.insert(caller, priority);
        Ok(WaitStatus::Blocked)
    }

    /// Detach `id` from the pending-wake registry and copy its results.
    ///
    /// Returns true if any slot fired.
    pub fn collect(
        &mut self,
        caller: ThreadId,
        id: WaitSetId,
        out: &mut [u32],
    ) -> Result<bool, MultiwaitError> {
        self.check_owner(caller, id)?;
        self.pending.remove(&mut self.wait_sets, id);
        let wait_set = self.wait_sets.get(id).ok_or(MultiwaitError::InvalidHandle)?;
        Ok(wait_set.collect(out))
    }

    /// Destroy a wait set and return its heap charge.
    ///
    /// Any thread still associated with the set is detached and made ready
    /// with `WakeReason::Destroyed`. Never fails; a stale id is a no-op and
    /// returns false.
    pub fn destroy_wait_set<H: Heap + ?Sized>(&mut self, id: WaitSetId, heap: &H) -> bool {
        if !self.wait_sets.contains(id) {
            return false;
        }
        self.pending.remove(&mut self.wait_sets, id);

        let mut orphaned = Vec::new();
        for thread in self.threads.iter_mut() {
            if thread.active_wait_set == Some(id) {
                thread.active_wait_set = None;
                orphaned.push((thread.id, thread.state));
            }
        }
        for (thread, state) in orphaned {
            match state {
                ThreadState::Blocked => {
                    self.wait_queue.remove(thread);
                    self.make_ready(thread, WakeReason::Destroyed);
                }
                ThreadState::Ready => {
                    if let Some(t) = self.threads.get_mut(thread) {
                        t.wake_reason = Some(WakeReason::Destroyed);
                    }
                }
            }
        }

        match self.wait_sets.remove(id) {
            Some(wait_set) => {
                wait_set.release(heap);
                true
            }
            None => false,
        }
    }

    /// Wait sets owned by `owner`
    pub fn wait_sets_owned_by(&self, owner: ThreadId) -> Vec<WaitSetId> {
        self.wait_sets
            .iter()
            .filter(|(_, ws)| ws.owner() == owner)
            .map(|(id, _)| id)
            .collect()
    }

    // ========================================================================
    // Producers and time
    // ========================================================================

    /// Deliver one domain event to every interested waiter.
    ///
    /// 1. Every wait set in the pending-wake registry sees the event,
    ///    regardless of `max_wakes`: their threads are ready but have not yet
    ///    collected, so a second event must still be recorded.
    /// 2. The wait queue is walked in priority order; each thread whose wait
    ///    set fires is made ready and its set joins the registry. The walk
    ///    stops after `max_wakes` threads have been woken.
    ///
    /// Returns the number of threads woken in step 2.
    pub fn notify(&mut self, notification: Notification, max_wakes: u32) -> u32 {
        self.pending.deliver(&mut self.wait_sets, &notification);

        let mut woken = 0;
        let mut index = 0;
        while woken < max_wakes {
            let Some(thread) = self.wait_queue.get(index) else {
                break;
            };
            let Some(id) = self.threads.get(thread).and_then(|t| t.active_wait_set) else {
                index += 1;
                continue;
            };
            let fired = self
                .wait_sets
                .get_mut(id)
                .map(|ws| ws.trigger(&notification))
                .unwrap_or(false);
            if fired {
                self.wait_queue.remove_at(index);
                self.make_ready(thread, WakeReason::Event);
                self.pending.push(&mut self.wait_sets, id);
                woken += 1;
            } else {
                index += 1;
            }
        }
        woken
    }

    /// Move the clock forward to `now` without expiring anything.
    ///
    /// Deadlines of later waits are measured from the advanced clock. An
    /// earlier `now` is ignored.
    pub fn advance_clock(&mut self, now: Ticks) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Advance time to `now` and wake every blocked thread whose deadline
    /// has passed. Returns the threads woken by the timer.
    pub fn tick(&mut self, now: Ticks) -> Vec<ThreadId> {
        self.advance_clock(now);
        let expired: Vec<ThreadId> = self
            .wait_queue
            .iter()
            .filter(|&t| {
                self.threads
                    .get(t)
                    .and_then(|t| t.deadline)
                    .is_some_and(|deadline| deadline <= self.now)
            })
            .collect();
        for &thread in &expired {
            self.wait_queue.remove(thread);
            self.make_ready(thread, WakeReason::Timer);
        }
        expired
    }

    // ========================================================================
    // Read-only accessors
    // ========================================================================

    /// Current tick
    pub fn now(&self) -> Ticks {
        self.now
    }

    /// Get thread by ID
    pub fn thread(&self, id: ThreadId) -> Option<&Thread> {
        self.threads.get(id)
    }

    /// All threads
    pub fn threads(&self) -> &ThreadTable {
        &self.threads
    }

    /// Get wait set by ID
    pub fn wait_set(&self, id: WaitSetId) -> Option<&WaitSet> {
        self.wait_sets.get(id)
    }

    /// All wait sets
    pub fn wait_sets(&self) -> &WaitSetTable {
        &self.wait_sets
    }

    /// Blocked threads in wake order
    pub fn wait_queue(&self) -> &WaitQueue {
        &self.wait_queue
    }

    /// Wait sets in the pending-wake registry, most recently readied first
    pub fn pending_wakes(&self) -> Vec<WaitSetId> {
        self.pending.ids(&self.wait_sets)
    }

    /// Pending-wake registry
    pub fn pending_registry(&self) -> &PendingWakeRegistry {
        &self.pending
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn check_owner(&self, caller: ThreadId, id: WaitSetId) -> Result<(), MultiwaitError> {
        match self.wait_sets.get(id) {
            Some(ws) if ws.owner() == caller => Ok(()),
            _ => Err(MultiwaitError::InvalidHandle),
        }
    }

    fn make_ready(&mut self, thread: ThreadId, reason: WakeReason) {
        let seq = self.bump_ready_seq();
        if let Some(t) = self.threads.get_mut(thread) {
            t.state = ThreadState::Ready;
            t.wake_reason = Some(reason);
            t.deadline = None;
            t.ready_seq = seq;
        }
    }

    fn bump_ready_seq(&mut self) -> u64 {
        let seq = self.next_ready_seq;
        self.next_ready_seq += 1;
        seq
    }
}
