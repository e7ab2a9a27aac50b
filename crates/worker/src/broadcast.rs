//! Fan-out of refreshed metadata to live subscribers.
//!
//! Every subscriber owns a bounded drop-oldest buffer, so a slow reader only
//! loses its own oldest updates and never holds back publishers or other
//! subscribers. There is no replay: a new subscriber sees only what is
//! published after it subscribed.

use parking_lot::RwLock;
use pulse_core::ResourceMetadata;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use telemetry::metrics;
use tracing::debug;

use crate::queue::{BoundedQueue, OverflowPolicy, PushOutcome};

/// Default per-subscriber buffer size.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 100;

type Buffer = Arc<BoundedQueue<Arc<ResourceMetadata>>>;

pub struct BroadcastHub {
    subscribers: RwLock<HashMap<u64, Buffer>>,
    next_id: AtomicU64,
    capacity: usize,
    closed: AtomicBool,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        })
    }

    /// Register a new subscriber. Dropping the handle unregisters it.
    ///
    /// Subscribing to a closed hub yields a subscription that ends at once.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let buffer: Buffer = Arc::new(BoundedQueue::new(self.capacity));

        // Checked under the write lock so a concurrent close() sees the entry.
        let mut subscribers = self.subscribers.write();
        if self.is_closed() {
            buffer.close();
        } else {
            subscribers.insert(id, buffer.clone());
            metrics().subscribers.inc();
            debug!(subscriber = id, "Subscriber registered");
        }
        drop(subscribers);

        Subscription {
            id,
            buffer,
            hub: Arc::downgrade(self),
        }
    }

    /// Push a snapshot to every subscriber. Returns how many received it.
    pub fn publish(&self, metadata: ResourceMetadata) -> usize {
        let metadata = Arc::new(metadata);
        let subscribers = self.subscribers.read();

        let mut delivered = 0;
        for buffer in subscribers.values() {
            match buffer.push(metadata.clone(), OverflowPolicy::DropOldest) {
                PushOutcome::Accepted => delivered += 1,
                PushOutcome::Evicted(_) => {
                    delivered += 1;
                    metrics().broadcast_dropped.inc();
                }
                PushOutcome::Rejected(_) | PushOutcome::Closed(_) => {}
            }
        }

        metrics().broadcasts_published.inc();
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// End every subscription. Buffered updates can still be read.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for buffer in self.subscribers.read().values() {
            buffer.close();
        }
        debug!("Broadcast hub closed");
    }

    fn unregister(&self, id: u64) {
        if self.subscribers.write().remove(&id).is_some() {
            metrics().subscribers.dec();
            debug!(subscriber = id, "Subscriber unregistered");
        }
    }
}

impl fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("subscribers", &self.subscriber_count())
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// One live subscriber's handle.
pub struct Subscription {
    id: u64,
    buffer: Buffer,
    hub: Weak<BroadcastHub>,
}

impl Subscription {
    /// Next update, or `None` once the hub is closed and the buffer drained.
    pub async fn recv(&self) -> Option<Arc<ResourceMetadata>> {
        self.buffer.pop().await
    }

    pub fn try_recv(&self) -> Option<Arc<ResourceMetadata>> {
        self.buffer.try_pop()
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unregister(self.id);
        }
    }
}
