//! Event bus adapter interface and a channel-backed implementation.
//!
//! A native bus is exposed through [`EventBus`] (subscriber initialisation) and
//! [`EventSubscriber`] (bounded receive, explicit release). Adapters wrapping blocking
//! native calls should run them on `tokio::task::spawn_blocking` inside `receive`.

use crate::error::BusError;
use crate::value::{truncate_payload, EventRecord};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;

/// Parameters for a new subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriberOptions {
    /// Replay events cached by the bus before live delivery.
    pub use_cache: bool,
    /// Upper bound on a single `receive` call.
    pub receive_timeout: Duration,
    /// Largest payload handed over per record; longer payloads are truncated.
    pub max_payload_bytes: usize,
}

/// A live subscription to the event bus.
#[async_trait]
pub trait EventSubscriber: Send + 'static {
    /// Wait up to the configured timeout for the next record.
    ///
    /// `Ok(None)` means the timeout elapsed with no data; it is not an error.
    async fn receive(&mut self) -> Result<Option<EventRecord>, BusError>;

    /// Release the underlying subscription. Consumes the subscriber, so it runs once.
    ///
    /// This is the orderly path. Implementations must also free the native handle in
    /// `Drop` when `release` was never called, which happens if the forwarding task panics.
    fn release(self)
    where
        Self: Sized;
}

/// Factory for subscribers.
#[async_trait]
pub trait EventBus: Send + Sync + 'static {
    type Subscriber: EventSubscriber;

    async fn subscribe(&self, options: SubscriberOptions) -> Result<Self::Subscriber, BusError>;
}

/// In-process bus fed through a channel. Useful for demos and tests.
///
/// Each record is paired with the bus-side missed count and its publish time. Only one
/// subscriber may be active at a time.
#[derive(Debug, Clone)]
pub struct ChannelBus {
    rx: Arc<Mutex<Option<mpsc::UnboundedReceiver<EventRecord>>>>,
    subscribes: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

/// Publishing side of a [`ChannelBus`].
#[derive(Debug, Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<EventRecord>,
}

impl ChannelPublisher {
    /// Publish a record. Returns `false` once the bus has been dropped.
    pub fn publish(&self, record: EventRecord) -> bool {
        self.tx.send(record).is_ok()
    }
}

impl ChannelBus {
    pub fn new() -> (Self, ChannelPublisher) {
        let (tx, rx) = mpsc::unbounded_channel();
        let bus = Self {
            rx: Arc::new(Mutex::new(Some(rx))),
            subscribes: Arc::new(AtomicUsize::new(0)),
            releases: Arc::new(AtomicUsize::new(0)),
        };
        (bus, ChannelPublisher { tx })
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    /// How many subscribers have been released.
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventBus for ChannelBus {
    type Subscriber = ChannelSubscriber;

    async fn subscribe(&self, options: SubscriberOptions) -> Result<ChannelSubscriber, BusError> {
        let rx = self
            .rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or_else(|| BusError::Subscribe("subscriber already active".into()))?;
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        Ok(ChannelSubscriber {
            rx: Some(rx),
            options,
            slot: self.rx.clone(),
            releases: self.releases.clone(),
        })
    }
}

/// Subscriber handed out by [`ChannelBus`]. Releasing it returns the channel to the bus;
/// dropping it unreleased does too, without counting as a release.
#[derive(Debug)]
pub struct ChannelSubscriber {
    rx: Option<mpsc::UnboundedReceiver<EventRecord>>,
    options: SubscriberOptions,
    slot: Arc<Mutex<Option<mpsc::UnboundedReceiver<EventRecord>>>>,
    releases: Arc<AtomicUsize>,
}

#[async_trait]
impl EventSubscriber for ChannelSubscriber {
    async fn receive(&mut self) -> Result<Option<EventRecord>, BusError> {
        let Some(rx) = self.rx.as_mut() else {
            return Err(BusError::Disconnected);
        };
        match tokio::time::timeout(self.options.receive_timeout, rx.recv()).await {
            Err(_) => Ok(None),
            Ok(None) => {
                // Behave like a quiet bus rather than spinning on a dead channel.
                tokio::time::sleep(self.options.receive_timeout).await;
                Err(BusError::Disconnected)
            }
            Ok(Some(record)) => {
                let max = self.options.max_payload_bytes;
                if record.payload().len() <= max {
                    return Ok(Some(record));
                }
                let missed = record.missed_count();
                let published = record.publish_epoch_ms();
                let payload = truncate_payload(record.into_payload(), max);
                Ok(Some(EventRecord::new(payload, missed, published)))
            }
        }
    }

    fn release(mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.return_channel();
    }
}

impl ChannelSubscriber {
    fn return_channel(&mut self) {
        if let Some(rx) = self.rx.take() {
            *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx);
        }
    }
}

impl Drop for ChannelSubscriber {
    fn drop(&mut self) {
        self.return_channel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> SubscriberOptions {
        SubscriberOptions {
            use_cache: true,
            receive_timeout: Duration::from_millis(50),
            max_payload_bytes: 8,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn receive_times_out_without_data() {
        let (bus, _publisher) = ChannelBus::new();
        let mut sub = bus.subscribe(options()).await.unwrap();
        assert_eq!(sub.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn receive_truncates_long_payloads() {
        let (bus, publisher) = ChannelBus::new();
        let mut sub = bus.subscribe(options()).await.unwrap();
        assert!(publisher.publish(EventRecord::new("0123456789", 2, 77)));
        let rec = sub.receive().await.unwrap().unwrap();
        assert_eq!(rec.payload(), "01234567");
        assert_eq!(rec.missed_count(), 2);
        assert_eq!(rec.publish_epoch_ms(), 77);
    }

    #[tokio::test]
    async fn single_active_subscriber_until_release() {
        let (bus, _publisher) = ChannelBus::new();
        let sub = bus.subscribe(options()).await.unwrap();
        assert!(matches!(bus.subscribe(options()).await, Err(BusError::Subscribe(_))));
        sub.release();
        assert_eq!(bus.release_count(), 1);
        assert!(bus.subscribe(options()).await.is_ok());
        assert_eq!(bus.subscribe_count(), 2);
    }

    #[tokio::test]
    async fn dropped_subscriber_frees_the_channel() {
        let (bus, publisher) = ChannelBus::new();
        let sub = bus.subscribe(options()).await.unwrap();
        drop(sub);
        assert_eq!(bus.release_count(), 0);

        let mut sub = bus.subscribe(options()).await.unwrap();
        assert!(publisher.publish(EventRecord::new("x", 0, 1)));
        assert_eq!(sub.receive().await.unwrap().unwrap().payload(), "x");
    }
}
