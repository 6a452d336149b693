use evbridge::counters::STATS_FIELD_NAME;
use evbridge::{CountersAggregator, CountersStore, LatencyTracker, StreamCounters, TickOutcome};
use evbridge_redis::RedisCountersStore;
use std::sync::Arc;

// Requires redis running. If EVBRIDGE_TEST_REDIS_URL is unset, the tests skip.
fn redis_url() -> Option<String> {
    match std::env::var("EVBRIDGE_TEST_REDIS_URL") {
        Ok(v) => Some(v),
        Err(_) => {
            eprintln!("skipping: set EVBRIDGE_TEST_REDIS_URL (e.g. redis://127.0.0.1:6379/2)");
            None
        }
    }
}

#[tokio::test]
async fn fields_round_trip() {
    let Some(url) = redis_url() else { return };
    let store = RedisCountersStore::connect(&url)
        .await
        .unwrap_or_else(|e| panic!("Failed to connect to redis at '{}': {}", url, e));

    let key = format!("EVBRIDGE_TEST:{}", uuid::Uuid::new_v4());
    assert_eq!(store.get_field(&key, STATS_FIELD_NAME).await.unwrap(), None);
    store.set_fields(&key, &[(STATS_FIELD_NAME, "12".to_string())]).await.unwrap();
    assert_eq!(store.get_field(&key, STATS_FIELD_NAME).await.unwrap().as_deref(), Some("12"));
}

#[tokio::test]
async fn aggregator_writes_through_redis() {
    let Some(url) = redis_url() else { return };
    let store = RedisCountersStore::connect(&url).await.expect("connect");
    let counters = Arc::new(StreamCounters::new());
    let mut agg = CountersAggregator::new(store, counters.clone(), Arc::new(LatencyTracker::default()));

    counters.add_missed(1);
    assert_eq!(agg.tick().await, TickOutcome::Written);
    assert_eq!(agg.tick().await, TickOutcome::Unchanged);
}
