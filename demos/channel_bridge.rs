//! Forward a handful of events through an in-process bus and print what the consumer sees.
//!
//! Run with `RUST_LOG`-style output enabled by the fmt subscriber:
//! `cargo run --example channel_bridge`
use evbridge::counters::STATS_FIELD_NAME;
use evbridge::prelude::*;
use evbridge::CounterKey;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let (bus, publisher) = ChannelBus::new();
    let store = InMemoryCountersStore::new();
    let config = EventClientConfig::default()
        .with_receive_timeout(Duration::from_millis(100))?
        .with_heartbeat_interval(Duration::from_millis(300))?;
    let client = Arc::new(EventClient::new(
        vec![SubscriptionPath::new("EVENTS", ["all"])],
        SubscriptionPath::new("EVENTS", Vec::<String>::new()),
        bus,
        store.clone(),
        config,
    ));

    let now_ms = SystemTime::now().duration_since(UNIX_EPOCH)?.as_millis() as i64;
    for (i, missed) in [0u64, 2, 1].into_iter().enumerate() {
        let payload = format!(r#"{{"sonic-events-bgp:bgp-state":{{"ip":"10.0.0.{i}","status":"up"}}}}"#);
        publisher.publish(EventRecord::new(payload, missed, now_ms + i as i64));
    }

    let queue = PriorityQueue::new();
    let stop = StopSignal::new();
    let consumer = {
        let queue = queue.clone();
        let client = client.clone();
        let stop = stop.clone();
        tokio::spawn(async move {
            let mut events = 0;
            while let Some(value) = queue.recv().await {
                match &value.value {
                    TypedValue::String(s) => {
                        events += 1;
                        println!("event     ts={} {}", value.timestamp, s);
                    }
                    TypedValue::JsonIetf(raw) => {
                        println!("heartbeat ts={} {}", value.timestamp, String::from_utf8_lossy(raw));
                    }
                }
                client.sent(&value);
                if events == 3 && value.is_heartbeat() {
                    stop.fire();
                }
            }
        })
    };

    client.stream_run(Arc::new(queue.clone()), stop, &SessionParameters::default()).await?;
    queue.close();
    consumer.await?;

    println!("{}: {:?}", client, client.stats());
    for key in CounterKey::ALL {
        println!("{key} = {:?}", store.field(key.store_key(), STATS_FIELD_NAME));
    }
    Ok(())
}
