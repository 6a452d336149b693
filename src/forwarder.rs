//! Event forwarding: the enqueue-or-drop publisher and the bus receive loop.
//!
//! [`Publisher`] is the single path into the shared queue for both bus events and
//! heartbeats. It never waits on a saturated queue: a value is either enqueued or dropped
//! in constant time.

use crate::bus::EventSubscriber;
use crate::client::ClientState;
use crate::clock::millis_to_nanos;
use crate::counters::StreamCounters;
use crate::error::{BusError, QueueError};
use crate::queue::ValueQueue;
use crate::value::{EventRecord, QueuedValue, SubscriptionPath, TypedValue, ValueKind};
use futures::future::{ready, Ready};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Service, ServiceExt};
use tracing::{debug, trace, warn};

/// What happened to a value offered to the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Enqueued,
    /// Queue was at capacity; the value was discarded.
    Dropped,
}

/// Capacity-checked sink in front of the shared queue.
#[derive(Debug, Clone)]
pub struct Publisher<Q> {
    queue: Q,
    capacity: usize,
    counters: Arc<StreamCounters>,
}

impl<Q: ValueQueue> Publisher<Q> {
    pub fn new(queue: Q, capacity: usize, counters: Arc<StreamCounters>) -> Self {
        Self { queue, capacity, counters }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Enqueue `value` unless the queue already holds `capacity` entries.
    ///
    /// Dropped bus events count toward `missed_by_slow_receiver`; dropped heartbeats do not.
    pub fn offer(&self, value: QueuedValue) -> Result<Offer, QueueError> {
        if self.queue.len() >= self.capacity {
            if !value.is_heartbeat() {
                self.counters.incr_dropped();
            }
            trace!(target: "evbridge::forwarder", heartbeat = value.is_heartbeat(), "queue full, dropping");
            return Ok(Offer::Dropped);
        }
        self.queue.put(value).map_err(|e| {
            debug!(target: "evbridge::forwarder", error = %e, "queue rejected value");
            e
        })?;
        Ok(Offer::Enqueued)
    }
}

impl<Q: ValueQueue> Service<QueuedValue> for Publisher<Q> {
    type Response = Offer;
    type Error = QueueError;
    type Future = Ready<Result<Offer, QueueError>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, value: QueuedValue) -> Self::Future {
        ready(self.offer(value))
    }
}

/// Why the forwarding loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardExit {
    /// The client entered the stopping state.
    Stopped,
    /// The consumer closed the queue.
    QueueClosed,
}

/// Routing metadata stamped onto every forwarded event.
#[derive(Debug, Clone, Default)]
pub struct Route {
    pub prefix: SubscriptionPath,
    pub path: Option<SubscriptionPath>,
}

impl Route {
    pub fn wrap(&self, kind: ValueKind, value: TypedValue, timestamp: i64) -> QueuedValue {
        QueuedValue { prefix: self.prefix.clone(), path: self.path.clone(), timestamp, kind, value }
    }
}

/// Receive loop moving records from a bus subscriber into the publisher.
///
/// Owns the subscriber while running and hands it back on exit; it never releases it.
pub struct ForwardingLoop<S, Q> {
    subscriber: S,
    publisher: Publisher<Q>,
    route: Route,
    counters: Arc<StreamCounters>,
    state: Arc<ClientState>,
}

impl<S, Q> ForwardingLoop<S, Q>
where
    S: EventSubscriber,
    Q: ValueQueue + Clone,
{
    pub fn new(
        subscriber: S,
        publisher: Publisher<Q>,
        route: Route,
        counters: Arc<StreamCounters>,
        state: Arc<ClientState>,
    ) -> Self {
        Self { subscriber, publisher, route, counters, state }
    }

    /// Forward a single record: account for bus-side losses, then enqueue or drop.
    pub async fn forward(&mut self, record: EventRecord) -> Result<Offer, QueueError> {
        self.counters.add_missed(record.missed_count());
        let timestamp = millis_to_nanos(record.publish_epoch_ms());
        let value = self.route.wrap(ValueKind::Event, TypedValue::String(record.into_payload()), timestamp);
        ServiceExt::<QueuedValue>::ready(&mut self.publisher).await?.call(value).await
    }

    /// Run until the client is stopping or the queue closes.
    pub async fn run(mut self) -> (S, ForwardExit) {
        debug!(target: "evbridge::forwarder", capacity = self.publisher.capacity(), "forwarding loop started");
        loop {
            match self.subscriber.receive().await {
                Ok(Some(record)) => {
                    trace!(target: "evbridge::forwarder", missed = record.missed_count(), payload = record.payload(), "event received");
                    if self.forward(record).await.is_err() {
                        warn!(target: "evbridge::forwarder", "queue closed, ending forwarding loop");
                        return (self.subscriber, ForwardExit::QueueClosed);
                    }
                }
                Ok(None) => {}
                Err(BusError::Disconnected) => {
                    debug!(target: "evbridge::forwarder", "event bus disconnected");
                }
                Err(e) => {
                    warn!(target: "evbridge::forwarder", error = %e, "event receive failed");
                }
            }
            if self.state.is_stopping() {
                debug!(target: "evbridge::forwarder", "stop observed, exiting forwarding loop");
                return (self.subscriber, ForwardExit::Stopped);
            }
        }
    }
}
