//! Dispatch channel between ingestion and the refresh workers.

use pulse_core::RefreshWorkItem;
use std::sync::Arc;
use telemetry::metrics;
use tracing::{debug, warn};

use crate::queue::{BoundedQueue, OverflowPolicy, PushOutcome};

/// Default number of buffered work items.
pub const DEFAULT_DISPATCH_CAPACITY: usize = 90;

/// What happened to a sent item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Enqueued,
    /// Enqueued; this older item was evicted to make room.
    DroppedOldest(RefreshWorkItem),
    /// Channel full; the sent item was discarded.
    DroppedNewest(RefreshWorkItem),
    /// Channel closed; the sent item was discarded.
    Closed(RefreshWorkItem),
}

impl SendOutcome {
    pub fn is_enqueued(&self) -> bool {
        matches!(self, Self::Enqueued | Self::DroppedOldest(_))
    }
}

/// Bounded multi-consumer channel of refresh work.
///
/// Sending never blocks and never fails; overflow discards an item according
/// to the configured policy. Cloning shares the same buffer.
#[derive(Clone)]
pub struct DispatchChannel {
    queue: Arc<BoundedQueue<RefreshWorkItem>>,
    policy: OverflowPolicy,
}

impl DispatchChannel {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            queue: Arc::new(BoundedQueue::new(capacity)),
            policy,
        }
    }

    pub fn send(&self, item: RefreshWorkItem) -> SendOutcome {
        let outcome = match self.queue.push(item, self.policy) {
            PushOutcome::Accepted => SendOutcome::Enqueued,
            PushOutcome::Evicted(old) => {
                metrics().items_dropped.inc();
                warn!(
                    resource_key = %old.resource_key,
                    origin_event_id = %old.origin_event_id,
                    "Dispatch channel full, dropped oldest work item"
                );
                SendOutcome::DroppedOldest(old)
            }
            PushOutcome::Rejected(new) => {
                metrics().items_dropped.inc();
                warn!(
                    resource_key = %new.resource_key,
                    origin_event_id = %new.origin_event_id,
                    "Dispatch channel full, dropped incoming work item"
                );
                SendOutcome::DroppedNewest(new)
            }
            PushOutcome::Closed(new) => {
                debug!(
                    resource_key = %new.resource_key,
                    "Dispatch channel closed, discarding work item"
                );
                SendOutcome::Closed(new)
            }
        };

        if outcome.is_enqueued() {
            metrics().items_dispatched.inc();
        }
        metrics().queue_depth.set(self.queue.len() as u64);
        outcome
    }

    /// Next item, or `None` once the channel is closed and drained.
    pub async fn recv(&self) -> Option<RefreshWorkItem> {
        let item = self.queue.pop().await;
        metrics().queue_depth.set(self.queue.len() as u64);
        item
    }

    pub fn close(&self) {
        self.queue.close();
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Take everything currently buffered, oldest first.
    pub fn drain(&self) -> Vec<RefreshWorkItem> {
        let items = self.queue.drain();
        metrics().queue_depth.set(0);
        items
    }
}

impl Default for DispatchChannel {
    fn default() -> Self {
        Self::new(DEFAULT_DISPATCH_CAPACITY, OverflowPolicy::default())
    }
}
