//! Convenient re-exports for wiring up an event stream.
pub use crate::{
    bus::{ChannelBus, ChannelPublisher, EventBus, EventSubscriber, SubscriberOptions},
    client::{DeliveryObserver, EventClient, SessionParameters, SharedQueue, StreamClient},
    config::EventClientConfig,
    error::{BusError, QueueError, StoreError, StreamError},
    queue::{PriorityQueue, ValueQueue},
    signal::StopSignal,
    store::{CountersStore, InMemoryCountersStore},
    value::{EventRecord, QueuedValue, SubscriptionPath, TypedValue, ValueKind},
};
