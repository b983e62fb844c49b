//! Kestrel Kernel
//!
//! Runtime wrapper around `kestrel-core`:
//! - Thread lifecycle
//! - Multi-source waits (`multiwaiter_*`)
//! - Sealed message queues and event channels
//! - Futex words in HAL memory
//! - Timeout expiry and thread selection
//!
//! Every operation that touches scheduler state runs inside a HAL
//! `CriticalSection`, so producers called from interrupt context use the
//! same entry points as threads.

#![no_std]
extern crate alloc;

pub mod audit;
pub mod config;
pub mod env;
pub mod error;
pub mod logger;
pub mod objects;
pub mod sealing;

use alloc::vec::Vec;
use serde::{Deserialize, Serialize};

use kestrel_core::{
    check_all_invariants, ArmOutcome, EventDescriptor, Heap, InvariantViolation, Notification,
    ObjectId, Priority, Scheduler, ThreadId, ThreadState, Timeout, WaitSetId,
    WaitStatus, WakeReason,
};
use kestrel_hal::{CriticalSection, HalError, HeapQuota, HAL};

pub use audit::{AuditEvent, AuditEventKind, AuditLog};
pub use config::KernelConfig;
pub use error::KernelError;
pub use logger::{init_logging, HalLogger};
pub use objects::{EventChannel, KernelObject, MessageQueue};
pub use sealing::{ObjectTable, ObjectType, SealError, SealedToken};

use env::{KernelEnv, KernelHeap};

/// Result of a multi-wait call
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MultiwaitStatus {
    /// At least one source fired; results are filled in
    Fired,
    /// Nothing fired before the timeout (or the timeout did not allow
    /// blocking); results are all zero
    TimedOut,
    /// The caller is now suspended; call `multiwaiter_complete` once it runs
    Blocked,
    /// The wait set was deleted while the caller waited on it
    Destroyed,
}

/// The Kestrel kernel.
pub struct Kernel<H: HAL> {
    hal: H,
    config: KernelConfig,
    quota: HeapQuota,
    scheduler: Scheduler,
    objects: ObjectTable,
    audit: AuditLog,
}

impl<H: HAL> Kernel<H> {
    /// Create a kernel with the given HAL and configuration
    pub fn new(hal: H, config: KernelConfig) -> Self {
        log::debug!("kernel up: {:?}", config);
        Self {
            quota: HeapQuota::new(config.heap_quota_bytes),
            audit: AuditLog::new(config.audit_capacity),
            hal,
            config,
            scheduler: Scheduler::new(),
            objects: ObjectTable::new(),
        }
    }

    /// Create a kernel with `KernelConfig::default()`
    pub fn with_defaults(hal: H) -> Self {
        Self::new(hal, KernelConfig::default())
    }

    pub fn hal(&self) -> &H {
        &self.hal
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Bytes of the heap quota in use
    pub fn heap_used(&self) -> usize {
        self.quota.used()
    }

    /// Run every wait-core invariant check
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        check_all_invariants(&self.scheduler)
    }

    // ========================================================================
    // Threads
    // ========================================================================

    /// Create a ready thread
    pub fn thread_spawn(&mut self, name: &str, priority: Priority) -> ThreadId {
        let _cs = CriticalSection::enter(&self.hal);
        let thread = self.scheduler.spawn_thread(name, priority);
        log::debug!("thread {} '{}' spawned at priority {}", thread.0, name, priority.0);
        thread
    }

    /// Exit a thread and delete every wait set it owns
    pub fn thread_exit(&mut self, thread: ThreadId) -> Result<(), KernelError> {
        let _cs = CriticalSection::enter(&self.hal);
        let now = self.hal.now_ticks();
        if !self.scheduler.exit_thread(thread) {
            return Err(KernelError::NoSuchThread(thread));
        }
        let heap = KernelHeap {
            quota: &self.quota,
            hal: &self.hal,
        };
        for wait_set in self.scheduler.wait_sets_owned_by(thread) {
            self.scheduler.destroy_wait_set(wait_set, &heap);
            self.audit
                .record(now, AuditEventKind::WaitSetDestroyed { wait_set });
        }
        log::debug!("thread {} exited", thread.0);
        self.debug_check_invariants();
        Ok(())
    }

    /// Pick the thread that should run next
    pub fn schedule(&self) -> Option<ThreadId> {
        self.scheduler.pick_next()
    }

    // ========================================================================
    // Multi-waits
    // ========================================================================

    /// Create a wait set with room for `capacity` sources.
    ///
    /// The heap is charged without blocking.
    pub fn multiwaiter_create(
        &mut self,
        caller: ThreadId,
        capacity: usize,
    ) -> Result<WaitSetId, KernelError> {
        let _cs = CriticalSection::enter(&self.hal);
        self.live_thread(caller)?;
        let heap = KernelHeap {
            quota: &self.quota,
            hal: &self.hal,
        };
        let wait_set = self.scheduler.create_wait_set(caller, capacity, &heap)?;
        self.audit.record(
            self.hal.now_ticks(),
            AuditEventKind::WaitSetCreated {
                owner: caller,
                wait_set,
                capacity,
            },
        );
        log::debug!(
            "multiwaiter {:?} created for thread {} (capacity {})",
            wait_set,
            caller.0,
            capacity
        );
        Ok(wait_set)
    }

    /// Delete a wait set, waking any thread still waiting on it.
    ///
    /// Deleting an already deleted set succeeds and does nothing.
    pub fn multiwaiter_delete(
        &mut self,
        caller: ThreadId,
        wait_set: WaitSetId,
    ) -> Result<(), KernelError> {
        let _cs = CriticalSection::enter(&self.hal);
        match self.scheduler.wait_set(wait_set) {
            None => return Ok(()),
            Some(ws) if ws.owner() != caller => {
                return Err(KernelError::Multiwait(
                    kestrel_core::MultiwaitError::InvalidHandle,
                ))
            }
            Some(_) => {}
        }
        let heap = KernelHeap {
            quota: &self.quota,
            hal: &self.hal,
        };
        self.scheduler.destroy_wait_set(wait_set, &heap);
        self.audit.record(
            self.hal.now_ticks(),
            AuditEventKind::WaitSetDestroyed { wait_set },
        );
        log::debug!("multiwaiter {:?} deleted", wait_set);
        self.debug_check_invariants();
        Ok(())
    }

    /// Arm `wait_set` with `descriptors` and wait for any of them.
    ///
    /// - Something already satisfied: `results` is filled, returns `Fired`.
    /// - Timeout forbids blocking: `results` is zeroed, returns `TimedOut`.
    /// - Otherwise the caller is suspended and `Blocked` is returned; once it
    ///   is scheduled again it calls `multiwaiter_complete`.
    ///
    /// A caller that is still blocked gets `WouldBlock` and its wait set is
    /// left untouched.
    pub fn multiwaiter_wait(
        &mut self,
        caller: ThreadId,
        wait_set: WaitSetId,
        descriptors: &[EventDescriptor],
        results: &mut [u32],
        timeout: Timeout,
    ) -> Result<MultiwaitStatus, KernelError> {
        let _cs = CriticalSection::enter(&self.hal);
        let now = self.hal.now_ticks();
        if self.live_thread(caller)? == ThreadState::Blocked {
            return Err(KernelError::WouldBlock);
        }
        let capacity = self
            .scheduler
            .wait_set(wait_set)
            .map(|ws| ws.capacity())
            .unwrap_or(0);
        if results.len() > capacity {
            // Also covers a stale handle with a non-empty result buffer.
            if self.scheduler.wait_set(wait_set).is_none() {
                return Err(kestrel_core::MultiwaitError::InvalidHandle.into());
            }
            return Err(kestrel_core::MultiwaitError::InvalidArgument.into());
        }

        let env = KernelEnv {
            objects: &self.objects,
            hal: &self.hal,
        };
        let outcome = self
            .scheduler
            .configure(caller, wait_set, &env, descriptors)
            .inspect_err(|e| log::debug!("multiwaiter {:?} configure failed: {}", wait_set, e))?;
        self.audit.record(
            now,
            AuditEventKind::Configured {
                wait_set,
                sources: descriptors.len(),
                immediate: outcome == ArmOutcome::ImmediateWake,
            },
        );

        let status = match outcome {
            ArmOutcome::ImmediateWake => {
                collect_results(
                    &mut self.scheduler,
                    &mut self.objects,
                    caller,
                    wait_set,
                    results,
                )?;
                MultiwaitStatus::Fired
            }
            ArmOutcome::MustSleep => {
                // Deadlines count from the HAL clock, even between ticks.
                self.scheduler.advance_clock(now);
                match self.scheduler.wait(caller, wait_set, timeout)? {
                    WaitStatus::Blocked => {
                        self.audit.record(
                            now,
                            AuditEventKind::Slept {
                                thread: caller,
                                wait_set,
                                timeout,
                            },
                        );
                        MultiwaitStatus::Blocked
                    }
                    WaitStatus::TimedOut => {
                        collect_results(
                            &mut self.scheduler,
                            &mut self.objects,
                            caller,
                            wait_set,
                            results,
                        )?;
                        MultiwaitStatus::TimedOut
                    }
                }
            }
        };
        log::trace!("thread {} multiwait -> {:?}", caller.0, status);
        self.debug_check_invariants();
        Ok(status)
    }

    /// Finish a wait that returned `Blocked`, after the caller was woken.
    ///
    /// Collects results into `results` and clears any clear-on-exit event
    /// bits that fired.
    pub fn multiwaiter_complete(
        &mut self,
        caller: ThreadId,
        wait_set: WaitSetId,
        results: &mut [u32],
    ) -> Result<MultiwaitStatus, KernelError> {
        let _cs = CriticalSection::enter(&self.hal);
        let now = self.hal.now_ticks();
        if self.live_thread(caller)? == ThreadState::Blocked {
            return Err(KernelError::WouldBlock);
        }
        let reason = self.scheduler.resume(caller);
        if let Some(reason) = reason {
            self.audit.record(
                now,
                AuditEventKind::Woken {
                    thread: caller,
                    reason,
                },
            );
        }
        if reason == Some(WakeReason::Destroyed) {
            results.fill(0);
            return Ok(MultiwaitStatus::Destroyed);
        }
        if let Some(ws) = self.scheduler.wait_set(wait_set) {
            if results.len() > ws.capacity() {
                return Err(kestrel_core::MultiwaitError::InvalidArgument.into());
            }
        }

        let fired = collect_results(
            &mut self.scheduler,
            &mut self.objects,
            caller,
            wait_set,
            results,
        )?;
        self.audit
            .record(now, AuditEventKind::Collected { wait_set, fired });
        self.debug_check_invariants();
        Ok(if fired {
            MultiwaitStatus::Fired
        } else {
            MultiwaitStatus::TimedOut
        })
    }

    // ========================================================================
    // Message queues
    // ========================================================================

    /// Create a queue of `depth` messages of `message_size` bytes
    pub fn queue_create(&mut self, message_size: usize, depth: usize) -> Result<u64, KernelError> {
        if message_size == 0
            || message_size > self.config.max_message_size
            || depth == 0
            || depth > self.config.max_queue_depth
        {
            return Err(KernelError::InvalidArgument);
        }
        let queue = MessageQueue::new(message_size, depth);
        let token = self.insert_object(KernelObject::Queue(queue))?;
        log::debug!("queue {:#x} created ({} x {} bytes)", token, depth, message_size);
        Ok(token)
    }

    /// Destroy a queue; its token stops unsealing.
    ///
    /// Threads already waiting on the queue are not woken: no later
    /// notification can name the revoked token, so they stay blocked until
    /// another source fires, their timeout expires or their wait set is
    /// deleted.
    pub fn queue_destroy(&mut self, token: u64) -> Result<(), KernelError> {
        let _cs = CriticalSection::enter(&self.hal);
        remove_object(&mut self.objects, &self.quota, &self.hal, token, ObjectType::Queue)
    }

    /// Append a message and wake queue waiters.
    ///
    /// Returns the number of threads woken.
    pub fn queue_send(&mut self, token: u64, message: &[u8]) -> Result<u32, KernelError> {
        let _cs = CriticalSection::enter(&self.hal);
        let Some(KernelObject::Queue(queue)) = self.objects.unseal_mut(token, ObjectType::Queue)
        else {
            return Err(KernelError::InvalidToken);
        };
        queue.send(message)?;
        let readiness = queue.readiness();
        Ok(notify_waiters(
            &self.hal,
            &mut self.scheduler,
            &mut self.audit,
            Notification::Queue {
                id: ObjectId(token),
                readiness,
            },
            u32::MAX,
        ))
    }

    /// Remove the oldest message and wake queue waiters.
    pub fn queue_receive(&mut self, token: u64) -> Result<Vec<u8>, KernelError> {
        let _cs = CriticalSection::enter(&self.hal);
        let Some(KernelObject::Queue(queue)) = self.objects.unseal_mut(token, ObjectType::Queue)
        else {
            return Err(KernelError::InvalidToken);
        };
        let message = queue.receive()?;
        let readiness = queue.readiness();
        notify_waiters(
            &self.hal,
            &mut self.scheduler,
            &mut self.audit,
            Notification::Queue {
                id: ObjectId(token),
                readiness,
            },
            u32::MAX,
        );
        Ok(message)
    }

    // ========================================================================
    // Event channels
    // ========================================================================

    pub fn event_channel_create(&mut self) -> Result<u64, KernelError> {
        let token = self.insert_object(KernelObject::EventChannel(EventChannel::new()))?;
        log::debug!("event channel {:#x} created", token);
        Ok(token)
    }

    /// Destroy a channel. Waiters are left blocked, as for `queue_destroy`.
    pub fn event_channel_destroy(&mut self, token: u64) -> Result<(), KernelError> {
        let _cs = CriticalSection::enter(&self.hal);
        remove_object(
            &mut self.objects,
            &self.quota,
            &self.hal,
            token,
            ObjectType::EventChannel,
        )
    }

    /// Raise `bits` on a channel and wake matching waiters.
    ///
    /// Returns the number of threads woken.
    pub fn event_set(&mut self, token: u64, bits: u32) -> Result<u32, KernelError> {
        let _cs = CriticalSection::enter(&self.hal);
        let current = channel_mut(&mut self.objects, token)?.set(bits);
        Ok(notify_waiters(
            &self.hal,
            &mut self.scheduler,
            &mut self.audit,
            Notification::EventChannel {
                id: ObjectId(token),
                bits: current,
            },
            u32::MAX,
        ))
    }

    /// Lower `bits` on a channel, returning the bits that remain set
    pub fn event_clear(&mut self, token: u64, bits: u32) -> Result<u32, KernelError> {
        let _cs = CriticalSection::enter(&self.hal);
        Ok(channel_mut(&mut self.objects, token)?.clear(bits))
    }

    /// Current bits of a channel
    pub fn event_bits(&self, token: u64) -> Result<u32, KernelError> {
        match self.objects.unseal(token, ObjectType::EventChannel) {
            Some(KernelObject::EventChannel(channel)) => Ok(channel.bits()),
            _ => Err(KernelError::InvalidToken),
        }
    }

    // ========================================================================
    // Futexes
    // ========================================================================

    /// Write a futex word. Waiters are not woken until `futex_wake`.
    pub fn futex_store(&mut self, address: u64, value: u32) -> Result<(), KernelError> {
        self.hal.store_word(address, value)?;
        Ok(())
    }

    /// Wake up to `count` threads waiting on the word at `address`.
    pub fn futex_wake(&mut self, address: u64, count: u32) -> u32 {
        let _cs = CriticalSection::enter(&self.hal);
        notify_waiters(
            &self.hal,
            &mut self.scheduler,
            &mut self.audit,
            Notification::Futex { address },
            count,
        )
    }

    // ========================================================================
    // Time
    // ========================================================================

    /// Expire timed waits against the HAL clock.
    ///
    /// Returns the threads woken by their timeout.
    pub fn tick(&mut self) -> Vec<ThreadId> {
        let _cs = CriticalSection::enter(&self.hal);
        let now = self.hal.now_ticks();
        let expired = self.scheduler.tick(now);
        for thread in &expired {
            log::trace!("thread {} timed out at tick {}", thread.0, now);
        }
        self.debug_check_invariants();
        expired
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn live_thread(&self, thread: ThreadId) -> Result<ThreadState, KernelError> {
        match self.scheduler.thread(thread) {
            Some(t) => Ok(t.state),
            None => Err(KernelError::NoSuchThread(thread)),
        }
    }

    fn insert_object(&mut self, object: KernelObject) -> Result<u64, KernelError> {
        let heap = KernelHeap {
            quota: &self.quota,
            hal: &self.hal,
        };
        heap.allocate(object.allocation_size(), Timeout::NonBlocking)
            .map_err(|_| KernelError::Hal(HalError::OutOfMemory))?;
        Ok(self.objects.insert(object).to_raw())
    }

    fn debug_check_invariants(&self) {
        debug_check_invariants(&self.scheduler);
    }
}

/// Collect a wait set's results, then clear the event bits requested by
/// clear-on-exit slots.
fn collect_results(
    scheduler: &mut Scheduler,
    objects: &mut ObjectTable,
    caller: ThreadId,
    wait_set: WaitSetId,
    results: &mut [u32],
) -> Result<bool, KernelError> {
    let fired = scheduler.collect(caller, wait_set, results)?;
    let requests: Vec<(ObjectId, u32)> = scheduler
        .wait_set(wait_set)
        .map(|ws| ws.clear_on_exit_requests().collect())
        .unwrap_or_default();
    for (channel, bits) in requests {
        if let Some(KernelObject::EventChannel(ch)) =
            objects.unseal_mut(channel.0, ObjectType::EventChannel)
        {
            ch.clear(bits);
        }
    }
    Ok(fired)
}

/// Deliver a producer event and record it.
fn notify_waiters<H: HAL>(
    hal: &H,
    scheduler: &mut Scheduler,
    audit: &mut AuditLog,
    notification: Notification,
    max_wakes: u32,
) -> u32 {
    let woken = scheduler.notify(notification, max_wakes);
    audit.record(
        hal.now_ticks(),
        AuditEventKind::Notified {
            kind: notification.kind(),
            woken,
        },
    );
    log::trace!("{:?} woke {} thread(s)", notification, woken);
    debug_check_invariants(scheduler);
    woken
}

fn remove_object<H: HAL>(
    objects: &mut ObjectTable,
    quota: &HeapQuota,
    hal: &H,
    token: u64,
    expected: ObjectType,
) -> Result<(), KernelError> {
    let object = objects
        .remove(token, expected)
        .ok_or(KernelError::InvalidToken)?;
    KernelHeap { quota, hal }.free(object.allocation_size());
    log::debug!("{:?} {:#x} destroyed", expected, token);
    Ok(())
}

fn channel_mut(objects: &mut ObjectTable, token: u64) -> Result<&mut EventChannel, KernelError> {
    match objects.unseal_mut(token, ObjectType::EventChannel) {
        Some(KernelObject::EventChannel(channel)) => Ok(channel),
        _ => Err(KernelError::InvalidToken),
    }
}

fn debug_check_invariants(scheduler: &Scheduler) {
    if cfg!(debug_assertions) {
        let violations = check_all_invariants(scheduler);
        if !violations.is_empty() {
            log::warn!("wait invariants violated: {:?}", violations);
        }
        debug_assert!(violations.is_empty());
    }
}
