//! Integration tests for kestrel-kernel
//!
//! These drive the kernel through its public entry points with a mock HAL,
//! simulating thread scheduling by calling `multiwaiter_complete` once a
//! blocked thread is ready again.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use kestrel_core::{
    allocation_size, EventDescriptor, MultiwaitError, Priority, ThreadState, Timeout,
    EVENT_CLEAR_ON_EXIT, EVENT_WAIT_ALL, QUEUE_RECEIVE_READY,
};
use kestrel_hal::{HalError, HeapQuota, HAL};
use kestrel_kernel::{
    AuditEvent, AuditEventKind, HalLogger, Kernel, KernelConfig, KernelError, MultiwaitStatus,
    ObjectType, SealedToken,
};

// ============================================================================
// Mock HAL
// ============================================================================

const FUTEX_A: u64 = 0x1000;
const FUTEX_B: u64 = 0x1004;

/// Mock HAL that captures debug output and counts critical sections.
struct MockHal {
    time: AtomicU64,
    preemption: AtomicBool,
    critical_sections: AtomicU64,
    heap: HeapQuota,
    memory: RefCell<BTreeMap<u64, u32>>,
    debug_log: RefCell<Vec<String>>,
}

// Tests are single-threaded.
unsafe impl Send for MockHal {}
unsafe impl Sync for MockHal {}

impl MockHal {
    fn new() -> Self {
        Self {
            time: AtomicU64::new(0),
            preemption: AtomicBool::new(true),
            critical_sections: AtomicU64::new(0),
            heap: HeapQuota::new(1 << 20),
            memory: RefCell::new(BTreeMap::new()),
            debug_log: RefCell::new(Vec::new()),
        }
    }

    fn map_word(&self, address: u64, value: u32) {
        self.memory.borrow_mut().insert(address, value);
    }

    fn advance(&self, ticks: u64) {
        self.time.fetch_add(ticks, Ordering::SeqCst);
    }
}

impl HAL for MockHal {
    fn heap_reserve(&self, bytes: usize) -> Result<(), HalError> {
        if self.heap.try_reserve(bytes) {
            Ok(())
        } else {
            Err(HalError::OutOfMemory)
        }
    }

    fn heap_release(&self, bytes: usize) {
        self.heap.release(bytes);
    }

    fn load_word(&self, address: u64) -> Result<u32, HalError> {
        self.memory
            .borrow()
            .get(&address)
            .copied()
            .ok_or(HalError::PermissionDenied)
    }

    fn store_word(&self, address: u64, value: u32) -> Result<(), HalError> {
        match self.memory.borrow_mut().get_mut(&address) {
            Some(word) => {
                *word = value;
                Ok(())
            }
            None => Err(HalError::PermissionDenied),
        }
    }

    fn now_ticks(&self) -> u64 {
        self.time.load(Ordering::SeqCst)
    }

    fn disable_preemption(&self) -> bool {
        self.critical_sections.fetch_add(1, Ordering::SeqCst);
        self.preemption.swap(false, Ordering::SeqCst)
    }

    fn restore_preemption(&self, was_enabled: bool) {
        self.preemption.store(was_enabled, Ordering::SeqCst);
    }

    fn debug_write(&self, msg: &str) {
        self.debug_log.borrow_mut().push(String::from(msg));
    }
}

fn kernel() -> Kernel<MockHal> {
    let hal = MockHal::new();
    hal.map_word(FUTEX_A, 0);
    hal.map_word(FUTEX_B, 0);
    Kernel::with_defaults(hal)
}

// ============================================================================
// Creation and lifecycle
// ============================================================================

#[test]
fn test_kernel_creation() {
    let kernel = kernel();
    assert_eq!(kernel.heap_used(), 0);
    assert!(kernel.audit().is_empty());
    assert!(kernel.schedule().is_none());
}

#[test]
fn test_multiwaiter_create_charges_heap() {
    let mut kernel = kernel();
    let t = kernel.thread_spawn("waiter", Priority::NORMAL);

    let ws = kernel.multiwaiter_create(t, 4).expect("create should succeed");
    assert_eq!(kernel.heap_used(), allocation_size(4));
    assert_eq!(kernel.scheduler().wait_set(ws).map(|w| w.capacity()), Some(4));

    kernel.multiwaiter_delete(t, ws).unwrap();
    assert_eq!(kernel.heap_used(), 0);
    assert!(kernel.scheduler().wait_set(ws).is_none());
}

#[test]
fn test_multiwaiter_create_rejects_large_capacity() {
    let mut kernel = kernel();
    let t = kernel.thread_spawn("waiter", Priority::NORMAL);

    assert_eq!(
        kernel.multiwaiter_create(t, 9),
        Err(KernelError::Multiwait(MultiwaitError::InvalidArgument))
    );
    assert!(kernel.multiwaiter_create(t, 8).is_ok());
}

#[test]
fn test_multiwaiter_create_out_of_quota() {
    let config = KernelConfig {
        heap_quota_bytes: allocation_size(2),
        ..KernelConfig::default()
    };
    let mut kernel = Kernel::new(MockHal::new(), config);
    let t = kernel.thread_spawn("waiter", Priority::NORMAL);

    let ws = kernel.multiwaiter_create(t, 2).unwrap();
    assert_eq!(
        kernel.multiwaiter_create(t, 1),
        Err(KernelError::Multiwait(MultiwaitError::OutOfMemory))
    );

    kernel.multiwaiter_delete(t, ws).unwrap();
    assert!(kernel.multiwaiter_create(t, 1).is_ok());
}

#[test]
fn test_delete_is_idempotent_and_owner_checked() {
    let mut kernel = kernel();
    let owner = kernel.thread_spawn("owner", Priority::NORMAL);
    let other = kernel.thread_spawn("other", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(owner, 2).unwrap();

    assert_eq!(
        kernel.multiwaiter_delete(other, ws),
        Err(KernelError::Multiwait(MultiwaitError::InvalidHandle))
    );
    kernel.multiwaiter_delete(owner, ws).unwrap();
    assert_eq!(kernel.multiwaiter_delete(owner, ws), Ok(()));
}

#[test]
fn test_unknown_thread_rejected() {
    let mut kernel = kernel();
    let t = kernel.thread_spawn("gone", Priority::NORMAL);
    kernel.thread_exit(t).unwrap();

    assert_eq!(
        kernel.multiwaiter_create(t, 1),
        Err(KernelError::NoSuchThread(t))
    );
    assert_eq!(kernel.thread_exit(t), Err(KernelError::NoSuchThread(t)));
}

#[test]
fn test_thread_exit_releases_wait_sets() {
    let mut kernel = kernel();
    let t = kernel.thread_spawn("worker", Priority::NORMAL);
    let a = kernel.multiwaiter_create(t, 2).unwrap();
    let b = kernel.multiwaiter_create(t, 3).unwrap();
    assert!(kernel.heap_used() > 0);

    kernel.thread_exit(t).unwrap();

    assert!(kernel.scheduler().thread(t).is_none());
    assert!(kernel.scheduler().threads().is_empty());
    assert_eq!(kernel.heap_used(), 0);
    assert!(kernel.scheduler().wait_set(a).is_none());
    assert!(kernel.scheduler().wait_set(b).is_none());
    assert!(kernel.check_invariants().is_empty());
}

// ============================================================================
// Multi-waits
// ============================================================================

#[test]
fn test_futex_already_changed_fires_immediately() {
    let mut kernel = kernel();
    kernel.futex_store(FUTEX_A, 5).unwrap();
    let t = kernel.thread_spawn("waiter", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 1).unwrap();

    let mut results = [0u32; 1];
    let status = kernel
        .multiwaiter_wait(
            t,
            ws,
            &[EventDescriptor::futex(FUTEX_A, 4)],
            &mut results,
            Timeout::Unbounded,
        )
        .unwrap();

    assert_eq!(status, MultiwaitStatus::Fired);
    assert_eq!(results, [1]);
    assert!(kernel.scheduler().wait_queue().is_empty());
}

#[test]
fn test_block_then_wake_from_two_sources() {
    let mut kernel = kernel();
    let channel = kernel.event_channel_create().unwrap();
    let t = kernel.thread_spawn("waiter", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 2).unwrap();

    let descriptors = [
        EventDescriptor::futex(FUTEX_A, 0),
        EventDescriptor::event_channel(channel, 0b100),
    ];
    let mut results = [0u32; 2];
    let status = kernel
        .multiwaiter_wait(t, ws, &descriptors, &mut results, Timeout::Unbounded)
        .unwrap();
    assert_eq!(status, MultiwaitStatus::Blocked);
    assert_eq!(
        kernel.scheduler().thread(t).map(|t| t.state),
        Some(ThreadState::Blocked)
    );
    assert_eq!(
        kernel.multiwaiter_complete(t, ws, &mut results),
        Err(KernelError::WouldBlock)
    );

    assert_eq!(kernel.event_set(channel, 0b110).unwrap(), 1);
    // The thread has not run yet; the futex wake must still be recorded.
    kernel.futex_store(FUTEX_A, 1).unwrap();
    assert_eq!(kernel.futex_wake(FUTEX_A, 1), 0);

    let status = kernel.multiwaiter_complete(t, ws, &mut results).unwrap();
    assert_eq!(status, MultiwaitStatus::Fired);
    assert_eq!(results, [1, 0b100]);
    assert!(kernel.scheduler().pending_wakes().is_empty());
    assert!(kernel.check_invariants().is_empty());
}

#[test]
fn test_futex_wake_respects_count_and_priority() {
    let mut kernel = kernel();
    let threads = [
        kernel.thread_spawn("low", Priority::LOW),
        kernel.thread_spawn("high", Priority::HIGH),
        kernel.thread_spawn("normal", Priority::NORMAL),
        kernel.thread_spawn("critical", Priority::CRITICAL),
    ];
    for &t in &threads {
        let ws = kernel.multiwaiter_create(t, 1).unwrap();
        let status = kernel
            .multiwaiter_wait(
                t,
                ws,
                &[EventDescriptor::futex(FUTEX_B, 0)],
                &mut [],
                Timeout::Unbounded,
            )
            .unwrap();
        assert_eq!(status, MultiwaitStatus::Blocked);
    }
    assert!(kernel.schedule().is_none());

    assert_eq!(kernel.futex_wake(FUTEX_B, 2), 2);

    let state = |k: &Kernel<MockHal>, i: usize| k.scheduler().thread(threads[i]).map(|t| t.state);
    assert_eq!(state(&kernel, 3), Some(ThreadState::Ready));
    assert_eq!(state(&kernel, 1), Some(ThreadState::Ready));
    assert_eq!(state(&kernel, 2), Some(ThreadState::Blocked));
    assert_eq!(state(&kernel, 0), Some(ThreadState::Blocked));
    assert_eq!(kernel.schedule(), Some(threads[3]));
}

#[test]
fn test_timeout_expires_on_tick() {
    let mut kernel = kernel();
    let t = kernel.thread_spawn("sleeper", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 1).unwrap();

    let mut results = [7u32; 1];
    let status = kernel
        .multiwaiter_wait(
            t,
            ws,
            &[EventDescriptor::futex(FUTEX_A, 0)],
            &mut results,
            Timeout::Ticks(10),
        )
        .unwrap();
    assert_eq!(status, MultiwaitStatus::Blocked);

    kernel.hal().advance(9);
    assert!(kernel.tick().is_empty());
    kernel.hal().advance(1);
    assert_eq!(kernel.tick(), [t]);

    let status = kernel.multiwaiter_complete(t, ws, &mut results).unwrap();
    assert_eq!(status, MultiwaitStatus::TimedOut);
    assert_eq!(results, [0]);
}

#[test]
fn test_timed_wait_counts_from_current_hal_time() {
    let mut kernel = kernel();
    let t = kernel.thread_spawn("sleeper", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 1).unwrap();

    // The clock moves with no tick in between.
    kernel.hal().advance(100);
    let mut results = [0u32; 1];
    let status = kernel
        .multiwaiter_wait(
            t,
            ws,
            &[EventDescriptor::futex(FUTEX_A, 0)],
            &mut results,
            Timeout::Ticks(10),
        )
        .unwrap();
    assert_eq!(status, MultiwaitStatus::Blocked);

    assert!(kernel.tick().is_empty());
    kernel.hal().advance(9);
    assert!(kernel.tick().is_empty());
    kernel.hal().advance(1);
    assert_eq!(kernel.tick(), [t]);

    let status = kernel.multiwaiter_complete(t, ws, &mut results).unwrap();
    assert_eq!(status, MultiwaitStatus::TimedOut);
}

#[test]
fn test_wait_while_blocked_keeps_armed_set() {
    let mut kernel = kernel();
    let t = kernel.thread_spawn("waiter", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 1).unwrap();

    let mut results = [0u32; 1];
    kernel
        .multiwaiter_wait(
            t,
            ws,
            &[EventDescriptor::futex(FUTEX_A, 0)],
            &mut results,
            Timeout::Unbounded,
        )
        .unwrap();

    assert_eq!(
        kernel.multiwaiter_wait(
            t,
            ws,
            &[EventDescriptor::futex(FUTEX_B, 0)],
            &mut results,
            Timeout::Unbounded
        ),
        Err(KernelError::WouldBlock)
    );

    assert_eq!(kernel.futex_wake(FUTEX_B, 1), 0);
    assert_eq!(kernel.futex_wake(FUTEX_A, 1), 1);
    let status = kernel.multiwaiter_complete(t, ws, &mut results).unwrap();
    assert_eq!(status, MultiwaitStatus::Fired);
    assert_eq!(results, [1]);
}

#[test]
fn test_non_blocking_wait_times_out() {
    let mut kernel = kernel();
    let t = kernel.thread_spawn("poller", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 1).unwrap();

    let mut results = [3u32; 1];
    let status = kernel
        .multiwaiter_wait(
            t,
            ws,
            &[EventDescriptor::futex(FUTEX_A, 0)],
            &mut results,
            Timeout::NonBlocking,
        )
        .unwrap();

    assert_eq!(status, MultiwaitStatus::TimedOut);
    assert_eq!(results, [0]);
    assert!(kernel.scheduler().wait_queue().is_empty());
}

#[test]
fn test_delete_wakes_blocked_owner() {
    let mut kernel = kernel();
    let t = kernel.thread_spawn("waiter", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 1).unwrap();

    let mut results = [0u32; 1];
    kernel
        .multiwaiter_wait(
            t,
            ws,
            &[EventDescriptor::futex(FUTEX_A, 0)],
            &mut results,
            Timeout::Unbounded,
        )
        .unwrap();

    kernel.multiwaiter_delete(t, ws).unwrap();
    assert_eq!(kernel.schedule(), Some(t));

    let status = kernel.multiwaiter_complete(t, ws, &mut results).unwrap();
    assert_eq!(status, MultiwaitStatus::Destroyed);
    assert_eq!(results, [0]);
    assert_eq!(kernel.heap_used(), 0);
}

#[test]
fn test_results_longer_than_capacity_rejected() {
    let mut kernel = kernel();
    let t = kernel.thread_spawn("waiter", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 1).unwrap();

    let mut results = [0u32; 2];
    assert_eq!(
        kernel.multiwaiter_wait(t, ws, &[], &mut results, Timeout::NonBlocking),
        Err(KernelError::Multiwait(MultiwaitError::InvalidArgument))
    );

    kernel.multiwaiter_delete(t, ws).unwrap();
    assert_eq!(
        kernel.multiwaiter_wait(t, ws, &[], &mut results, Timeout::NonBlocking),
        Err(KernelError::Multiwait(MultiwaitError::InvalidHandle))
    );
}

#[test]
fn test_unmapped_futex_denied() {
    let mut kernel = kernel();
    let t = kernel.thread_spawn("waiter", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 2).unwrap();

    let descriptors = [
        EventDescriptor::futex(FUTEX_A, 0),
        EventDescriptor::futex(0x9000, 0),
    ];
    assert_eq!(
        kernel.multiwaiter_wait(t, ws, &descriptors, &mut [], Timeout::Unbounded),
        Err(KernelError::Multiwait(MultiwaitError::PermissionDenied))
    );
    assert_eq!(kernel.scheduler().wait_set(ws).map(|w| w.len()), Some(0));
    assert_eq!(
        kernel.scheduler().thread(t).map(|t| t.state),
        Some(ThreadState::Ready)
    );
}

#[test]
fn test_forged_token_rejected() {
    let mut kernel = kernel();
    let channel = kernel.event_channel_create().unwrap();
    let queue = kernel.queue_create(4, 2).unwrap();
    let t = kernel.thread_spawn("waiter", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 1).unwrap();

    // A queue token presented as an event channel
    assert_eq!(
        kernel.multiwaiter_wait(
            t,
            ws,
            &[EventDescriptor::event_channel(queue, 1)],
            &mut [],
            Timeout::Unbounded
        ),
        Err(KernelError::Multiwait(MultiwaitError::InvalidHandle))
    );

    // A revoked channel
    kernel.event_channel_destroy(channel).unwrap();
    assert_eq!(
        kernel.multiwaiter_wait(
            t,
            ws,
            &[EventDescriptor::event_channel(channel, 1)],
            &mut [],
            Timeout::Unbounded
        ),
        Err(KernelError::Multiwait(MultiwaitError::InvalidHandle))
    );
    assert_eq!(kernel.event_set(channel, 1), Err(KernelError::InvalidToken));
}

#[test]
fn test_sealed_tokens_usable_as_set_keys() {
    use std::collections::HashSet;

    let mut kernel = kernel();
    let queue = kernel.queue_create(4, 1).unwrap();
    let channel = kernel.event_channel_create().unwrap();

    let tokens: HashSet<SealedToken> = [queue, channel, queue]
        .iter()
        .filter_map(|&raw| SealedToken::from_raw(raw))
        .collect();
    assert_eq!(tokens.len(), 2);
    assert!(tokens.iter().any(|t| t.object_type() == ObjectType::Queue));
    assert!(tokens
        .iter()
        .any(|t| t.object_type() == ObjectType::EventChannel));
}

// ============================================================================
// Message queues
// ============================================================================

#[test]
fn test_queue_send_wakes_receiver() {
    let mut kernel = kernel();
    let queue = kernel.queue_create(4, 2).unwrap();
    let t = kernel.thread_spawn("receiver", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 1).unwrap();

    let mut results = [0u32; 1];
    let status = kernel
        .multiwaiter_wait(
            t,
            ws,
            &[EventDescriptor::queue(queue, QUEUE_RECEIVE_READY)],
            &mut results,
            Timeout::Unbounded,
        )
        .unwrap();
    assert_eq!(status, MultiwaitStatus::Blocked);

    assert_eq!(kernel.queue_send(queue, b"ping").unwrap(), 1);

    let status = kernel.multiwaiter_complete(t, ws, &mut results).unwrap();
    assert_eq!(status, MultiwaitStatus::Fired);
    assert_eq!(results, [QUEUE_RECEIVE_READY]);
    assert_eq!(kernel.queue_receive(queue).unwrap(), b"ping");
    assert_eq!(kernel.queue_receive(queue), Err(KernelError::QueueEmpty));
}

#[test]
fn test_queue_limits() {
    let mut kernel = kernel();
    let max_depth = kernel.config().max_queue_depth;
    assert_eq!(
        kernel.queue_create(4, max_depth + 1),
        Err(KernelError::InvalidArgument)
    );
    assert_eq!(kernel.queue_create(0, 1), Err(KernelError::InvalidArgument));

    let queue = kernel.queue_create(2, 1).unwrap();
    assert_eq!(
        kernel.queue_send(queue, b"abc"),
        Err(KernelError::MessageSizeMismatch {
            expected: 2,
            actual: 3
        })
    );
    kernel.queue_send(queue, b"ab").unwrap();
    assert_eq!(kernel.queue_send(queue, b"cd"), Err(KernelError::QueueFull));

    let used = kernel.heap_used();
    kernel.queue_destroy(queue).unwrap();
    assert!(kernel.heap_used() < used);
    assert_eq!(kernel.queue_destroy(queue), Err(KernelError::InvalidToken));
}

// ============================================================================
// Event channels
// ============================================================================

#[test]
fn test_wait_all_needs_every_bit() {
    let mut kernel = kernel();
    let channel = kernel.event_channel_create().unwrap();
    let t = kernel.thread_spawn("waiter", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 1).unwrap();

    let mut results = [0u32; 1];
    kernel
        .multiwaiter_wait(
            t,
            ws,
            &[EventDescriptor::event_channel(channel, 0b11 | EVENT_WAIT_ALL)],
            &mut results,
            Timeout::Unbounded,
        )
        .unwrap();

    assert_eq!(kernel.event_set(channel, 0b01).unwrap(), 0);
    assert_eq!(kernel.event_set(channel, 0b10).unwrap(), 1);

    kernel.multiwaiter_complete(t, ws, &mut results).unwrap();
    assert_eq!(results, [0b11]);
}

#[test]
fn test_clear_on_exit_clears_fired_bits() {
    let mut kernel = kernel();
    let channel = kernel.event_channel_create().unwrap();
    let t = kernel.thread_spawn("waiter", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 1).unwrap();

    let mut results = [0u32; 1];
    kernel
        .multiwaiter_wait(
            t,
            ws,
            &[EventDescriptor::event_channel(channel, 0b01 | EVENT_CLEAR_ON_EXIT)],
            &mut results,
            Timeout::Unbounded,
        )
        .unwrap();
    kernel.event_set(channel, 0b11).unwrap();

    let status = kernel.multiwaiter_complete(t, ws, &mut results).unwrap();
    assert_eq!(status, MultiwaitStatus::Fired);
    assert_eq!(results, [0b01]);
    assert_eq!(kernel.event_bits(channel).unwrap(), 0b10);
}

#[test]
fn test_destroyed_channel_leaves_waiter_blocked() {
    let mut kernel = kernel();
    let channel = kernel.event_channel_create().unwrap();
    let t = kernel.thread_spawn("waiter", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 1).unwrap();

    let mut results = [0u32; 1];
    kernel
        .multiwaiter_wait(
            t,
            ws,
            &[EventDescriptor::event_channel(channel, 0b1)],
            &mut results,
            Timeout::Unbounded,
        )
        .unwrap();

    let entered = kernel.hal().critical_sections.load(Ordering::SeqCst);
    kernel.event_channel_destroy(channel).unwrap();
    assert!(kernel.hal().critical_sections.load(Ordering::SeqCst) > entered);
    assert!(kernel.hal().preemption.load(Ordering::SeqCst));

    // A channel reusing the slot has a new token and cannot reach the waiter.
    let replacement = kernel.event_channel_create().unwrap();
    assert_ne!(replacement, channel);
    assert_eq!(kernel.event_set(channel, 0b1), Err(KernelError::InvalidToken));
    assert_eq!(kernel.event_set(replacement, 0b1).unwrap(), 0);
    assert_eq!(
        kernel.scheduler().thread(t).map(|t| t.state),
        Some(ThreadState::Blocked)
    );

    kernel.multiwaiter_delete(t, ws).unwrap();
    let status = kernel.multiwaiter_complete(t, ws, &mut results).unwrap();
    assert_eq!(status, MultiwaitStatus::Destroyed);
}

#[test]
fn test_event_clear_reports_remaining() {
    let mut kernel = kernel();
    let channel = kernel.event_channel_create().unwrap();
    kernel.event_set(channel, 0b1011).unwrap();
    assert_eq!(kernel.event_clear(channel, 0b0011).unwrap(), 0b1000);
    assert_eq!(kernel.event_bits(channel).unwrap(), 0b1000);
}

// ============================================================================
// Ambient behaviour
// ============================================================================

#[test]
fn test_operations_restore_preemption() {
    let mut kernel = kernel();
    let t = kernel.thread_spawn("waiter", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 1).unwrap();
    kernel.futex_wake(FUTEX_A, 1);
    kernel.multiwaiter_delete(t, ws).unwrap();

    assert!(kernel.hal().critical_sections.load(Ordering::SeqCst) >= 4);
    assert!(kernel.hal().preemption.load(Ordering::SeqCst));
}

#[test]
fn test_futex_store_to_unmapped_word() {
    let mut kernel = kernel();
    assert_eq!(
        kernel.futex_store(0x9000, 1),
        Err(KernelError::Hal(HalError::PermissionDenied))
    );
}

#[test]
fn test_audit_trail() {
    let mut kernel = kernel();
    let t = kernel.thread_spawn("waiter", Priority::NORMAL);
    let ws = kernel.multiwaiter_create(t, 1).unwrap();
    let mut results = [0u32; 1];
    kernel
        .multiwaiter_wait(
            t,
            ws,
            &[EventDescriptor::futex(FUTEX_A, 0)],
            &mut results,
            Timeout::Unbounded,
        )
        .unwrap();
    kernel.futex_wake(FUTEX_A, 1);
    kernel.multiwaiter_complete(t, ws, &mut results).unwrap();

    let kinds: Vec<&AuditEventKind> = kernel.audit().events().iter().map(|e| &e.kind).collect();
    assert!(matches!(kinds[0], AuditEventKind::WaitSetCreated { capacity: 1, .. }));
    assert!(matches!(kinds[1], AuditEventKind::Configured { immediate: false, .. }));
    assert!(matches!(kinds[2], AuditEventKind::Slept { .. }));
    assert!(matches!(kinds[3], AuditEventKind::Notified { woken: 1, .. }));
    assert!(matches!(kinds[4], AuditEventKind::Woken { .. }));
    assert!(matches!(kinds[5], AuditEventKind::Collected { fired: true, .. }));

    let json = kernel.audit().export_json().unwrap();
    let back: Vec<AuditEvent> = serde_json::from_str(&json).unwrap();
    assert_eq!(back.len(), kernel.audit().len());
}

#[test]
fn test_config_from_json_drives_limits() {
    let config = KernelConfig::from_json(r#"{ "max_queue_depth": 2 }"#).unwrap();
    let mut kernel = Kernel::new(MockHal::new(), config);
    assert!(kernel.queue_create(4, 2).is_ok());
    assert_eq!(kernel.queue_create(4, 3), Err(KernelError::InvalidArgument));
}

#[test]
fn test_hal_logger_writes_enabled_records() {
    use log::{Level, LevelFilter, Log, Record};

    let hal: &'static MockHal = Box::leak(Box::new(MockHal::new()));
    let logger = HalLogger::new(hal, LevelFilter::Debug);

    logger.log(
        &Record::builder()
            .args(format_args!("woke {} thread(s)", 2))
            .level(Level::Info)
            .target("kestrel_kernel")
            .build(),
    );
    logger.log(
        &Record::builder()
            .args(format_args!("too chatty"))
            .level(Level::Trace)
            .target("kestrel_kernel")
            .build(),
    );

    let lines = hal.debug_log.borrow();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0], "INFO  kestrel_kernel: woke 2 thread(s)");
}
