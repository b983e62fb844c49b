//! Kernel error type

use alloc::string::String;

use kestrel_core::{MultiwaitError, ThreadId};
use kestrel_hal::HalError;

/// Errors returned by `Kernel` operations.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum KernelError {
    /// Wait-set creation or configuration failed
    #[error(transparent)]
    Multiwait(#[from] MultiwaitError),

    /// The platform refused an operation
    #[error("hal: {0}")]
    Hal(#[from] HalError),

    /// Thread does not exist or has exited
    #[error("no such thread {0:?}")]
    NoSuchThread(ThreadId),

    /// Token does not name a live object of the expected type
    #[error("invalid object token")]
    InvalidToken,

    /// Malformed object parameters
    #[error("invalid argument")]
    InvalidArgument,

    /// The calling thread is still blocked
    #[error("operation would block")]
    WouldBlock,

    #[error("queue full")]
    QueueFull,

    #[error("queue empty")]
    QueueEmpty,

    #[error("message is {actual} bytes, queue expects {expected}")]
    MessageSizeMismatch { expected: usize, actual: usize },

    /// Configuration could not be parsed or failed validation
    #[error("invalid kernel configuration: {0}")]
    InvalidConfig(String),
}
