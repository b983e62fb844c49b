//! Seams to the collaborators the core consumes but does not implement
//!
//! The core stays HAL-free: allocation, unsealing and memory permission
//! checks are reached only through these traits. The kernel crate provides
//! the real implementations; tests provide small in-memory ones.

use crate::error::HeapError;
use crate::types::{ResolvedSource, SourceKind, Timeout};

/// Bounded heap allocation service.
///
/// The core only needs accounting: the wait set's slot buffer is owned
/// storage, and the heap is charged for it in a single allocation.
pub trait Heap {
    /// Reserve `bytes`, waiting at most `timeout` for memory to become free.
    fn allocate(&self, bytes: usize, timeout: Timeout) -> Result<(), HeapError>;

    /// Return `bytes` previously reserved with `allocate`.
    fn free(&self, bytes: usize);
}

/// Resolution of caller-supplied source references.
pub trait WaitEnvironment {
    /// Unseal `token` as an object of `kind`.
    ///
    /// Returns `None` if the token is forged, stale, or of another type.
    /// Only called for `SourceKind::Queue` and `SourceKind::EventChannel`.
    fn unseal(&self, kind: SourceKind, token: u64) -> Option<ResolvedSource>;

    /// Load the word at `address` on behalf of the caller.
    ///
    /// Returns `None` if the caller lacks load permission for the address.
    fn load_word(&self, address: u64) -> Option<u32>;
}
