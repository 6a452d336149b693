#![allow(dead_code)]

use evbridge::counters::STATS_FIELD_NAME;
use evbridge::prelude::*;
use evbridge::CounterKey;
use std::time::Duration;

pub const MS: i64 = 1_000_000;

/// Short receive timeout so stops are observed quickly; heartbeats far enough out not to
/// interfere unless a test asks for them.
pub fn quiet_config() -> EventClientConfig {
    EventClientConfig::default()
        .with_receive_timeout(Duration::from_millis(50))
        .expect("valid timeout")
        .with_heartbeat_interval(Duration::from_secs(3600))
        .expect("valid interval")
}

pub fn event_client(
    bus: ChannelBus,
    store: InMemoryCountersStore,
    config: EventClientConfig,
) -> EventClient<ChannelBus, InMemoryCountersStore> {
    EventClient::new(
        vec![SubscriptionPath::new("EVENTS", ["all"])],
        SubscriptionPath::new("EVENTS", Vec::<String>::new()),
        bus,
        store,
        config,
    )
}

pub fn stored(store: &InMemoryCountersStore, key: CounterKey) -> Option<u64> {
    store
        .field(key.store_key(), STATS_FIELD_NAME)
        .map(|v| v.parse().expect("numeric counter"))
}

pub fn payload(value: &QueuedValue) -> &str {
    match &value.value {
        TypedValue::String(s) => s,
        TypedValue::JsonIetf(_) => panic!("expected an event, got a heartbeat"),
    }
}
