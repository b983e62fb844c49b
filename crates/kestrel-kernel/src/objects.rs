//! Kernel objects that act as event sources
//!
//! Message queues and event channels live in the sealed object table. Their
//! state changes are reported to waiters by the kernel, not by the objects
//! themselves.

use alloc::collections::VecDeque;
use alloc::vec::Vec;

use kestrel_core::{QUEUE_RECEIVE_READY, QUEUE_SEND_READY, READY_MASK};

use crate::error::KernelError;

/// Fixed heap charge for any object header.
pub const OBJECT_HEADER_BYTES: usize = 16;

/// Bounded FIFO of fixed-size messages.
#[derive(Clone, Debug)]
pub struct MessageQueue {
    message_size: usize,
    depth: usize,
    messages: VecDeque<Vec<u8>>,
}

impl MessageQueue {
    /// Create an empty queue holding up to `depth` messages of `message_size`
    /// bytes each.
    pub fn new(message_size: usize, depth: usize) -> Self {
        Self {
            message_size,
            depth,
            messages: VecDeque::with_capacity(depth),
        }
    }

    /// Heap charge for a queue of this shape
    pub fn allocation_size(message_size: usize, depth: usize) -> usize {
        OBJECT_HEADER_BYTES + message_size.saturating_mul(depth)
    }

    /// Append a message.
    ///
    /// # Errors
    /// - `MessageSizeMismatch` if `message` is not exactly `message_size` bytes
    /// - `QueueFull` if `depth` messages are already queued
    pub fn send(&mut self, message: &[u8]) -> Result<(), KernelError> {
        if message.len() != self.message_size {
            return Err(KernelError::MessageSizeMismatch {
                expected: self.message_size,
                actual: message.len(),
            });
        }
        if self.is_full() {
            return Err(KernelError::QueueFull);
        }
        self.messages.push_back(message.to_vec());
        Ok(())
    }

    /// Remove the oldest message.
    pub fn receive(&mut self) -> Result<Vec<u8>, KernelError> {
        self.messages.pop_front().ok_or(KernelError::QueueEmpty)
    }

    /// Readiness bitmap: `QUEUE_SEND_READY` while not full,
    /// `QUEUE_RECEIVE_READY` while not empty.
    pub fn readiness(&self) -> u32 {
        let mut readiness = 0;
        if !self.is_full() {
            readiness |= QUEUE_SEND_READY;
        }
        if !self.is_empty() {
            readiness |= QUEUE_RECEIVE_READY;
        }
        readiness
    }

    pub fn message_size(&self) -> usize {
        self.message_size
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.messages.len() >= self.depth
    }
}

/// A 24-bit word of event flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EventChannel {
    bits: u32,
}

impl EventChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise `bits`, returning the channel's bits afterwards.
    pub fn set(&mut self, bits: u32) -> u32 {
        self.bits |= bits & READY_MASK;
        self.bits
    }

    /// Lower `bits`, returning the channel's bits afterwards.
    pub fn clear(&mut self, bits: u32) -> u32 {
        self.bits &= !bits;
        self.bits
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }
}

/// Anything that can be stored behind a sealed token.
#[derive(Clone, Debug)]
pub enum KernelObject {
    Queue(MessageQueue),
    EventChannel(EventChannel),
}

impl KernelObject {
    /// Heap bytes charged for this object
    pub fn allocation_size(&self) -> usize {
        match self {
            KernelObject::Queue(q) => MessageQueue::allocation_size(q.message_size, q.depth),
            KernelObject::EventChannel(_) => OBJECT_HEADER_BYTES,
        }
    }
}
