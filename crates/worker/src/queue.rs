//! Bounded FIFO with a configurable overflow policy.
//!
//! Producers never wait: when the buffer is full the policy decides which
//! item is discarded. Consumers wait asynchronously until an item arrives or
//! the queue is closed and drained.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::Notify;

/// What to discard when a full queue receives another item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest buffered item to admit the new one.
    #[default]
    DropOldest,
    /// Discard the incoming item.
    DropNewest,
}

/// Result of a push.
#[derive(Debug, PartialEq, Eq)]
pub enum PushOutcome<T> {
    Accepted,
    /// Accepted after evicting this item.
    Evicted(T),
    /// Queue was full; the pushed item was discarded.
    Rejected(T),
    /// Queue is closed; the pushed item was discarded.
    Closed(T),
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
}

pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    notify: Notify,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    /// Creates a queue. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            notify: Notify::new(),
            capacity,
        }
    }

    /// Non-blocking push.
    pub fn push(&self, item: T, policy: OverflowPolicy) -> PushOutcome<T> {
        let outcome = {
            let mut state = self.state.lock();
            if state.closed {
                return PushOutcome::Closed(item);
            }

            if state.items.len() < self.capacity {
                state.items.push_back(item);
                PushOutcome::Accepted
            } else {
                match policy {
                    OverflowPolicy::DropNewest => return PushOutcome::Rejected(item),
                    OverflowPolicy::DropOldest => {
                        let evicted = state.items.pop_front();
                        state.items.push_back(item);
                        match evicted {
                            Some(old) => PushOutcome::Evicted(old),
                            None => PushOutcome::Accepted,
                        }
                    }
                }
            }
        };

        self.notify.notify_one();
        outcome
    }

    /// Wait for the next item. `None` once closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push between the check and the
            // await is not missed.
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    pub fn try_pop(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// Stop accepting items and wake every waiting consumer.
    ///
    /// Items already buffered can still be popped.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Remove and return everything buffered, oldest first.
    pub fn drain(&self) -> Vec<T> {
        self.state.lock().items.drain(..).collect()
    }
}
