//! Kestrel Core - Pure State Machine for Multi-Source Waits
//!
//! This crate contains the **HAL-free** core of Kestrel's wait primitive: a
//! thread registers interest in several event sources at once (message
//! queues, event channels, futex words), sleeps, and on wake learns which
//! of them fired.
//!
//! # Design Principles
//!
//! 1. **No HAL dependency**: heap accounting and source resolution arrive
//!    through the `Heap` and `WaitEnvironment` traits
//! 2. **No global state**: all wait-side state lives in one `Scheduler`
//!    passed by reference
//! 3. **Deterministic**: the same sequence of calls gives the same wake order
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       kestrel-core                          │
//! │                                                             │
//! │   ┌───────────────┐    ┌───────────────┐                    │
//! │   │   Scheduler   │    │   WaitSet     │                    │
//! │   │  - threads    │───▶│  - EventSlot  │                    │
//! │   │  - wait_queue │    │    × ≤ 8      │                    │
//! │   │  - wait_sets  │    └───────────────┘                    │
//! │   │  - pending    │                                         │
//! │   └───────────────┘    ┌───────────────┐                    │
//! │                        │  Invariants   │                    │
//! │                        └───────────────┘                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              │ used by
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      kestrel-kernel                         │
//! │                                                             │
//! │   - Sealed object table, queues, event channels, futexes    │
//! │   - HAL-backed heap and logging                             │
//! │   - Audit trail                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! - `types` - Ids, descriptors, notifications, timeouts
//! - `slot` - `EventSlot`, the two-word per-source record
//! - `waitset` - `WaitSet`, configure/trigger/collect
//! - `table` - Generational wait-set table
//! - `registry` - Pending-wake registry
//! - `wait_queue` - Priority-ordered blocked threads
//! - `thread` - Thread table
//! - `scheduler` - The multi-wait protocol
//! - `invariants` - Runtime-checkable invariants

#![no_std]
extern crate alloc;

pub mod env;
pub mod error;
pub mod invariants;
pub mod registry;
pub mod scheduler;
pub mod slot;
pub mod table;
pub mod thread;
pub mod types;
pub mod wait_queue;
pub mod waitset;

pub use env::{Heap, WaitEnvironment};
pub use error::{HeapError, MultiwaitError};
pub use invariants::{check_all_invariants, InvariantViolation};
pub use registry::PendingWakeRegistry;
pub use scheduler::Scheduler;
pub use slot::EventSlot;
pub use table::WaitSetTable;
pub use thread::{Thread, ThreadTable};
pub use types::{
    ArmOutcome, EventDescriptor, Notification, ObjectId, Priority, ResolvedSource, SourceKind,
    ThreadId, ThreadState, Ticks, Timeout, WaitSetId, WaitStatus, WakeReason,
    EVENT_CLEAR_ON_EXIT, EVENT_WAIT_ALL, MAX_WAIT_SET_CAPACITY, QUEUE_RECEIVE_READY,
    QUEUE_SEND_READY, READY_BITS, READY_MASK,
};
pub use wait_queue::WaitQueue;
pub use waitset::{allocation_size, WaitSet, WAIT_SET_HEADER_BYTES};
