//! Fan-out of packet records to one [`EventQueue`] per observer.
//!
//! The capture thread publishes each record once; every live subscriber gets
//! its own queue, so a stalled observer only fills (and overflows) its own
//! buffer. Subscribers are held weakly: dropping the returned queue handle
//! unsubscribes.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tracing::trace;

use super::queue::{EventQueue, OverflowPolicy};
use crate::error::EventError;
use crate::record::{PacketRecord, SharedRecord};

/// Outcome of publishing one record.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Records discarded by overflowing subscriber queues.
    pub dropped: usize,
}

pub struct Broadcaster {
    subscribers: RwLock<Vec<Weak<EventQueue>>>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl Broadcaster {
    /// `capacity` and `policy` apply to each subscriber queue.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Result<Self, EventError> {
        if capacity == 0 {
            return Err(EventError::InvalidCapacity);
        }
        Ok(Self {
            subscribers: RwLock::new(Vec::new()),
            capacity,
            policy,
        })
    }

    pub fn subscribe(&self) -> Arc<EventQueue> {
        let queue = Arc::new(EventQueue::bounded(self.capacity, self.policy));
        self.subscribers.write().push(Arc::downgrade(&queue));
        queue
    }

    pub fn publish(&self, record: PacketRecord) -> PublishReport {
        let record: SharedRecord = Arc::new(record);
        let mut report = PublishReport::default();
        let mut stale = false;

        for subscriber in self.subscribers.read().iter() {
            match subscriber.upgrade() {
                Some(queue) => {
                    report.delivered += 1;
                    if queue.push(record.clone()).is_some() {
                        report.dropped += 1;
                    }
                }
                None => stale = true,
            }
        }

        if stale {
            self.prune();
        }
        trace!(
            id = record.id,
            delivered = report.delivered,
            "Published packet record"
        );
        report
    }

    /// Empties every subscriber queue.
    pub fn clear_all(&self) {
        for queue in self.subscribers.read().iter().filter_map(Weak::upgrade) {
            queue.clear();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .iter()
            .filter(|s| s.strong_count() > 0)
            .count()
    }

    fn prune(&self) {
        self.subscribers.write().retain(|s| s.strong_count() > 0);
    }
}
