//! Bounded FIFO between the capture thread and one consumer.
//!
//! Unlike a plain unbounded buffer, the queue has a fixed capacity and an
//! [`OverflowPolicy`]; records discarded on overflow are counted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::EventError;
use crate::record::SharedRecord;

/// What to discard when a push finds the queue full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest queued record to make room.
    #[default]
    DropOldest,
    /// Reject the incoming record.
    DropNewest,
}

pub struct EventQueue {
    buffer: Mutex<VecDeque<SharedRecord>>,
    capacity: usize,
    policy: OverflowPolicy,
    dropped: AtomicU64,
}

impl EventQueue {
    pub fn with_capacity(capacity: usize, policy: OverflowPolicy) -> Result<Self, EventError> {
        if capacity == 0 {
            return Err(EventError::InvalidCapacity);
        }
        Ok(Self::bounded(capacity, policy))
    }

    /// Caller guarantees `capacity > 0`.
    pub(crate) fn bounded(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            buffer: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            policy,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues `record`. Returns the record discarded by the overflow
    /// policy, if any.
    pub fn push(&self, record: SharedRecord) -> Option<SharedRecord> {
        let mut buffer = self.buffer.lock();
        let discarded = if buffer.len() < self.capacity {
            buffer.push_back(record);
            None
        } else {
            match self.policy {
                OverflowPolicy::DropOldest => {
                    let evicted = buffer.pop_front();
                    buffer.push_back(record);
                    evicted
                }
                OverflowPolicy::DropNewest => Some(record),
            }
        };
        drop(buffer);

        if discarded.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        discarded
    }

    /// Atomically removes and returns everything queued, oldest first.
    pub fn drain_all(&self) -> Vec<SharedRecord> {
        self.buffer.lock().drain(..).collect()
    }

    pub fn clear(&self) {
        self.buffer.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }

    /// Records discarded on overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
