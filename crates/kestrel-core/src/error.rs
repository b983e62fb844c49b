//! Error types for wait-set operations
//!
//! Every error here is detected synchronously during `create` or `configure`
//! and handed back to the caller. None is retried internally.

/// Errors returned by wait-set operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum MultiwaitError {
    /// Capacity exceeded, malformed descriptor kind, zero event mask, or
    /// more descriptors than the wait set can hold.
    #[error("invalid argument")]
    InvalidArgument,

    /// The non-blocking heap allocation for a new wait set failed.
    #[error("out of memory")]
    OutOfMemory,

    /// A futex address failed the read-permission check.
    #[error("permission denied")]
    PermissionDenied,

    /// A sealed token could not be unsealed, or a wait-set handle is stale
    /// or not owned by the caller.
    #[error("invalid handle")]
    InvalidHandle,
}

/// Errors reported by a `Heap` implementation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum HeapError {
    /// The request could not be satisfied within the timeout.
    #[error("heap exhausted")]
    Exhausted,
}

impl From<HeapError> for MultiwaitError {
    fn from(e: HeapError) -> Self {
        match e {
            HeapError::Exhausted => MultiwaitError::OutOfMemory,
        }
    }
}
