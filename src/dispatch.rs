//! Fan-out of decoded events to independent subscribers
//!
//! Every subscription owns a bounded queue. Publishing never blocks: when a
//! queue is full its oldest event is dropped and counted, so a slow consumer
//! degrades to lossy delivery instead of stalling ingestion for everyone.

use futures::Stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::types::DomainEvent;

/// Queue state shared between the sink (producer) and one subscription (consumer)
#[derive(Debug)]
struct Queue {
    id: u64,
    capacity: usize,
    events: Mutex<VecDeque<DomainEvent>>,
    notify: Notify,
    dropped: AtomicU64,
    token: CancellationToken,
}

impl Queue {
    fn push(&self, event: DomainEvent) {
        {
            let mut events = self.events.lock();
            // Checked under the lock so a closing subscription never sees a late push
            if self.token.is_cancelled() {
                return;
            }
            if events.len() >= self.capacity {
                events.pop_front();
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                trace!(subscription = self.id, dropped, "Queue full, dropped oldest event");
            }
            events.push_back(event);
        }
        self.notify.notify_one();
    }

    fn close(&self) {
        let mut events = self.events.lock();
        self.token.cancel();
        events.clear();
    }
}

#[derive(Debug)]
struct SinkInner {
    queues: Mutex<Vec<Arc<Queue>>>,
    next_id: AtomicU64,
    capacity: usize,
    token: CancellationToken,
}

/// Delivers events to every live subscription in arrival order
///
/// Cloning the sink yields another handle to the same set of subscriptions.
#[derive(Debug, Clone)]
pub struct DispatchSink {
    inner: Arc<SinkInner>,
}

impl DispatchSink {
    /// Create a sink whose subscriptions hold at most `capacity` events
    pub fn new(capacity: usize) -> Self {
        Self::with_token(capacity, CancellationToken::new())
    }

    /// Create a sink that closes when `token` is cancelled
    pub fn with_token(capacity: usize, token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(SinkInner {
                queues: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
                token,
            }),
        }
    }

    /// Register a new subscriber
    ///
    /// Subscribing to a closed sink returns a subscription that is already closed.
    pub fn subscribe(&self) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let queue = Arc::new(Queue {
            id,
            capacity: self.inner.capacity,
            events: Mutex::new(VecDeque::with_capacity(self.inner.capacity)),
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
            token: self.inner.token.child_token(),
        });

        {
            let mut queues = self.inner.queues.lock();
            queues.retain(|queue| !queue.token.is_cancelled());
            if !self.inner.token.is_cancelled() {
                queues.push(Arc::clone(&queue));
            }
        }
        debug!(subscription = id, capacity = self.inner.capacity, "Subscriber registered");

        Subscription { queue }
    }

    /// Push an event to every live subscription
    ///
    /// Heartbeats only feed liveness bookkeeping and are never queued.
    pub fn publish(&self, event: DomainEvent) {
        if event.is_heartbeat() || self.inner.token.is_cancelled() {
            return;
        }

        let mut queues = self.inner.queues.lock();
        queues.retain(|queue| {
            if queue.token.is_cancelled() {
                // Unsubscribed through its token; release what it still holds
                queue.close();
                return false;
            }
            true
        });
        if let Some((last, rest)) = queues.split_last() {
            for queue in rest {
                queue.push(event.clone());
            }
            last.push(event);
        }
    }

    /// Close every subscription and refuse further events; idempotent
    pub fn close(&self) {
        self.inner.token.cancel();
        let queues = std::mem::take(&mut *self.inner.queues.lock());
        for queue in &queues {
            queue.close();
        }
        if !queues.is_empty() {
            debug!(subscribers = queues.len(), "Dispatch sink closed");
        }
    }

    /// Whether the sink has been closed
    pub fn is_closed(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Number of subscriptions still registered
    pub fn subscriber_count(&self) -> usize {
        self.inner.queues.lock().iter().filter(|queue| !queue.token.is_cancelled()).count()
    }
}

/// A consumer's registration with a [`DispatchSink`]
///
/// Dropping the subscription unsubscribes it.
#[derive(Debug)]
pub struct Subscription {
    queue: Arc<Queue>,
}

impl Subscription {
    /// Wait for the next event
    ///
    /// Returns `None` once the subscription or its session is closed; events
    /// still queued at that point are discarded.
    pub async fn next(&mut self) -> Option<DomainEvent> {
        loop {
            if let Some(event) = self.try_next() {
                return Some(event);
            }
            if self.queue.token.is_cancelled() {
                self.queue.close();
                return None;
            }

            tokio::select! {
                biased;
                _ = self.queue.token.cancelled() => {
                    self.queue.close();
                    return None;
                }
                _ = self.queue.notify.notified() => {}
            }
        }
    }

    /// Take the next queued event without waiting
    pub fn try_next(&mut self) -> Option<DomainEvent> {
        let mut events = self.queue.events.lock();
        if self.queue.token.is_cancelled() {
            events.clear();
            return None;
        }
        events.pop_front()
    }

    /// Unsubscribe, waking a pending [`Subscription::next`]; idempotent
    pub fn close(&mut self) {
        if !self.queue.token.is_cancelled() {
            debug!(subscription = self.queue.id, "Subscriber closed");
        }
        self.queue.close();
    }

    /// Whether the subscription no longer delivers events
    pub fn is_closed(&self) -> bool {
        self.queue.token.is_cancelled()
    }

    /// Events dropped because the queue was full; never decreases
    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped.load(Ordering::Relaxed)
    }

    /// Events currently queued
    pub fn len(&self) -> usize {
        self.queue.events.lock().len()
    }

    /// Whether no events are queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Token that unsubscribes when cancelled, usable from another task
    pub fn cancellation_token(&self) -> CancellationToken {
        self.queue.token.clone()
    }

    /// Adapt the subscription into a stream that ends when it closes
    pub fn into_stream(self) -> impl Stream<Item = DomainEvent> + Send + 'static {
        futures::stream::unfold(self, |mut subscription| async move {
            subscription.next().await.map(|event| (event, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.queue.close();
    }
}
