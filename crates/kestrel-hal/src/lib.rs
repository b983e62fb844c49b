//! Hardware Abstraction Layer trait for the Kestrel kernel
//!
//! This crate defines the HAL trait that lets the kernel run on different
//! targets (host tests, simulators, bare metal) by abstracting the handful
//! of platform services the wait primitive needs:
//!
//! - Heap accounting for kernel objects
//! - A monotonic tick counter
//! - Permission-checked word loads and stores on behalf of the caller
//! - Preemption control around scheduler-visible mutations
//! - Debug output
//!
//! # Module Organization
//!
//! - `heap` - Lock-free `HeapQuota` used by HAL implementations
//! - `critical` - `CriticalSection` RAII guard
//! - `loom_tests` - Concurrency tests for the quota (with `loom` feature)

#![no_std]

extern crate alloc;

pub mod critical;
pub mod heap;


pub use critical::CriticalSection;
pub use heap::HeapQuota;

use alloc::collections::BTreeMap;
use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Hardware Abstraction Layer trait
///
/// Implementations provide platform-specific functionality for:
/// - Memory accounting
/// - Time measurement
/// - Checked access to caller memory
/// - Preemption control
/// - Debug output
pub trait HAL: Send + Sync + 'static {
    // === Memory ===

    /// Reserve `bytes` of kernel heap without blocking
    ///
    /// # Returns
    /// * `Ok(())` - Reservation made
    /// * `Err(HalError::OutOfMemory)` - Not enough heap left
    fn heap_reserve(&self, bytes: usize) -> Result<(), HalError>;

    /// Return `bytes` previously reserved with `heap_reserve`
    fn heap_release(&self, bytes: usize);

    /// Load a 32-bit word on behalf of the current thread
    ///
    /// # Returns
    /// * `Ok(value)` - The word at `address`
    /// * `Err(HalError::PermissionDenied)` - Caller may not read `address`
    /// * `Err(HalError::InvalidAddress)` - `address` is not word aligned
    fn load_word(&self, address: u64) -> Result<u32, HalError>;

    /// Store a 32-bit word on behalf of the current thread
    ///
    /// # Returns
    /// * `Ok(())` - The word was written
    /// * `Err(HalError::PermissionDenied)` - Caller may not write `address`
    /// * `Err(HalError::InvalidAddress)` - `address` is not word aligned
    fn store_word(&self, address: u64, value: u32) -> Result<(), HalError>;

    // === Time ===

    /// Current scheduler tick (monotonic)
    fn now_ticks(&self) -> u64;

    // === Preemption ===

    /// Disable preemption, returning whether it was enabled before
    fn disable_preemption(&self) -> bool {
        true
    }

    /// Restore the preemption state returned by `disable_preemption`
    fn restore_preemption(&self, _was_enabled: bool) {}

    // === Debug ===

    /// Write a debug message to the platform's console/log
    fn debug_write(&self, msg: &str);
}

/// HAL errors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HalError {
    /// Not enough memory available
    OutOfMemory,
    /// The caller lacks the required permission for an address
    PermissionDenied,
    /// Misaligned or otherwise malformed address
    InvalidAddress,
    /// Operation not supported on this platform
    NotSupported,
}

impl core::fmt::Display for HalError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let msg = match self {
            HalError::OutOfMemory => "out of memory",
            HalError::PermissionDenied => "permission denied",
            HalError::InvalidAddress => "invalid address",
            HalError::NotSupported => "not supported",
        };
        f.write_str(msg)
    }
}

impl core::error::Error for HalError {}

/// Default heap budget for `TestHal`
pub const TEST_HEAP_BYTES: usize = 64 * 1024;

#[derive(Clone, Copy, Debug)]
struct MappedWord {
    value: u32,
    writable: bool,
}

/// A minimal test HAL for unit testing
///
/// Memory is a sparse map of words; any address not explicitly mapped is
/// inaccessible. Debug output is discarded.
pub struct TestHal {
    time: AtomicU64,
    preemption: AtomicBool,
    heap: HeapQuota,
    memory: RefCell<BTreeMap<u64, MappedWord>>,
}

impl TestHal {
    pub fn new() -> Self {
        Self::with_heap_limit(TEST_HEAP_BYTES)
    }

    pub fn with_heap_limit(bytes: usize) -> Self {
        Self {
            time: AtomicU64::new(0),
            preemption: AtomicBool::new(true),
            heap: HeapQuota::new(bytes),
            memory: RefCell::new(BTreeMap::new()),
        }
    }

    /// Map a readable and writable word
    pub fn map_word(&self, address: u64, value: u32) {
        self.memory.borrow_mut().insert(
            address,
            MappedWord {
                value,
                writable: true,
            },
        );
    }

    /// Map a word the caller may read but not write
    pub fn map_read_only(&self, address: u64, value: u32) {
        self.memory.borrow_mut().insert(
            address,
            MappedWord {
                value,
                writable: false,
            },
        );
    }

    pub fn set_time(&self, ticks: u64) {
        self.time.store(ticks, Ordering::SeqCst);
    }

    pub fn advance(&self, ticks: u64) {
        self.time.fetch_add(ticks, Ordering::SeqCst);
    }

    pub fn heap(&self) -> &HeapQuota {
        &self.heap
    }

    pub fn preemption_enabled(&self) -> bool {
        self.preemption.load(Ordering::SeqCst)
    }
}

impl Default for TestHal {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: TestHal is only used from single-threaded tests; the memory map
// is never touched from more than one thread.
unsafe impl Send for TestHal {}
unsafe impl Sync for TestHal {}

fn check_aligned(address: u64) -> Result<(), HalError> {
    if address % 4 == 0 {
        Ok(())
    } else {
        Err(HalError::InvalidAddress)
    }
}

impl HAL for TestHal {
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
        check_aligned(address)?;
        self.memory
            .borrow()
            .get(&address)
            .map(|w| w.value)
            .ok_or(HalError::PermissionDenied)
    }

    fn store_word(&self, address: u64, value: u32) -> Result<(), HalError> {
        check_aligned(address)?;
        match self.memory.borrow_mut().get_mut(&address) {
            Some(word) if word.writable => {
                word.value = value;
                Ok(())
            }
            _ => Err(HalError::PermissionDenied),
        }
    }

    fn now_ticks(&self) -> u64 {
        self.time.load(Ordering::SeqCst)
    }

    fn disable_preemption(&self) -> bool {
        self.preemption.swap(false, Ordering::SeqCst)
    }

    fn restore_preemption(&self, was_enabled: bool) {
        self.preemption.store(was_enabled, Ordering::SeqCst);
    }

    fn debug_write(&self, _msg: &str) {
        // No-op for tests
    }
}
