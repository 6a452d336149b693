#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # evbridge
//!
//! Bridges a pull-style event bus into a bounded telemetry queue.
//!
//! ## Features
//!
//! - **Ordered forwarding** of bus records into a shared priority queue
//! - **Backpressure by dropping**: a saturated queue never blocks the receive loop;
//!   drops are counted
//! - **Heartbeats** through the same queue path as real events
//! - **Persisted counters** (bus-side misses, receiver-side drops, average latency)
//!   written back to a counters store only when they change
//! - **Clean shutdown**: the bus subscription is released exactly once, after the
//!   forwarding loop has returned it
//!
//! ## Quick Start
//!
//! ```rust
//! use evbridge::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (bus, publisher) = ChannelBus::new();
//!     let client = EventClient::new(
//!         vec![SubscriptionPath::new("EVENTS", ["all"])],
//!         SubscriptionPath::new("EVENTS", Vec::<String>::new()),
//!         bus,
//!         InMemoryCountersStore::new(),
//!         EventClientConfig::default(),
//!     );
//!
//!     let queue = PriorityQueue::new();
//!     let stop = StopSignal::new();
//!     publisher.publish(EventRecord::new(r#"{"bgp":"up"}"#, 0, 1_700_000_000_000));
//!
//!     let consumer = queue.clone();
//!     let stopper = stop.clone();
//!     tokio::spawn(async move {
//!         let _first = consumer.recv().await;
//!         stopper.fire();
//!     });
//!
//!     client.stream_run(Arc::new(queue), stop, &SessionParameters::default()).await?;
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod bus;
pub mod client;
pub mod clock;
pub mod config;
pub mod counters;
pub mod error;
pub mod forwarder;
pub mod heartbeat;
pub mod latency;
pub mod prelude;
pub mod queue;
pub mod signal;
pub mod store;
pub mod value;

// Re-exports
pub use aggregator::{CountersAggregator, TickOutcome};
pub use bus::{ChannelBus, ChannelPublisher, EventBus, EventSubscriber, SubscriberOptions};
pub use client::{
    ClientStats, DeliveryObserver, EventClient, Phase, SessionParameters, SharedQueue,
    StreamClient,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EventClientConfig;
pub use counters::{CounterFamily, CounterKey, CounterSnapshot, StreamCounters};
pub use error::{BusError, ConfigError, QueueError, StoreError, StreamError};
pub use forwarder::{Offer, Publisher};
pub use latency::LatencyTracker;
pub use queue::{PriorityQueue, ValueQueue};
pub use signal::StopSignal;
pub use store::{CountersStore, InMemoryCountersStore};
pub use value::{EventRecord, QueuedValue, SubscriptionPath, TypedValue, ValueKind};
