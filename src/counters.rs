//! Stream counters and their persisted names.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Field under which every counter value is stored.
pub const STATS_FIELD_NAME: &str = "value";

/// How a counter's persisted value relates to the locally observed one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterFamily {
    /// Persisted = baseline read at start + local delta. Never decreases.
    Cumulative,
    /// Persisted value is replaced by the local value.
    Absolute,
}

/// Every counter the bridge publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CounterKey {
    /// Events the bus reported as lost before reaching this subscriber.
    MissedInternal,
    /// Events dropped here because the receiver was not draining the queue.
    MissedBySlowReceiver,
    /// Rolling average delivery latency in milliseconds.
    LatencyInMs,
}

impl CounterKey {
    pub const ALL: [CounterKey; 3] =
        [CounterKey::MissedInternal, CounterKey::MissedBySlowReceiver, CounterKey::LatencyInMs];

    pub fn family(self) -> CounterFamily {
        match self {
            CounterKey::MissedInternal | CounterKey::MissedBySlowReceiver => {
                CounterFamily::Cumulative
            }
            CounterKey::LatencyInMs => CounterFamily::Absolute,
        }
    }

    /// Key in the counters store.
    pub fn store_key(self) -> &'static str {
        match self {
            CounterKey::MissedInternal => "EVENTS_COUNTERS:missed_internal",
            CounterKey::MissedBySlowReceiver => "EVENTS_COUNTERS:missed_by_slow_receiver",
            CounterKey::LatencyInMs => "EVENTS_COUNTERS:latency_in_ms",
        }
    }

    pub fn cumulative() -> impl Iterator<Item = CounterKey> {
        Self::ALL.into_iter().filter(|k| k.family() == CounterFamily::Cumulative)
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.store_key())
    }
}

/// A full set of counter values, keyed by counter.
pub type CounterSnapshot = BTreeMap<CounterKey, u64>;

/// Locally observed counters, written by the forwarding loop and read by the aggregator.
#[derive(Debug, Default)]
pub struct StreamCounters {
    missed_internal: AtomicU64,
    missed_by_slow_receiver: AtomicU64,
    latency_ms: AtomicU64,
}

impl StreamCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_missed(&self, n: u64) {
        if n > 0 {
            self.missed_internal.fetch_add(n, Ordering::Relaxed);
        }
    }

    pub fn incr_dropped(&self) {
        self.missed_by_slow_receiver.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_latency_ms(&self, ms: u64) {
        self.latency_ms.store(ms, Ordering::Relaxed);
    }

    pub fn get(&self, key: CounterKey) -> u64 {
        match key {
            CounterKey::MissedInternal => self.missed_internal.load(Ordering::Relaxed),
            CounterKey::MissedBySlowReceiver => self.missed_by_slow_receiver.load(Ordering::Relaxed),
            CounterKey::LatencyInMs => self.latency_ms.load(Ordering::Relaxed),
        }
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterKey::ALL.into_iter().map(|k| (k, self.get(k))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_key_has_exactly_one_family() {
        let cumulative: Vec<_> = CounterKey::cumulative().collect();
        assert_eq!(cumulative, [CounterKey::MissedInternal, CounterKey::MissedBySlowReceiver]);
        assert_eq!(CounterKey::LatencyInMs.family(), CounterFamily::Absolute);
    }

    #[test]
    fn snapshot_reflects_updates() {
        let c = StreamCounters::new();
        c.add_missed(2);
        c.add_missed(0);
        c.add_missed(1);
        c.incr_dropped();
        c.set_latency_ms(12);
        let snap = c.snapshot();
        assert_eq!(snap[&CounterKey::MissedInternal], 3);
        assert_eq!(snap[&CounterKey::MissedBySlowReceiver], 1);
        assert_eq!(snap[&CounterKey::LatencyInMs], 12);
    }

    #[test]
    fn display_is_store_key() {
        assert_eq!(CounterKey::LatencyInMs.to_string(), "EVENTS_COUNTERS:latency_in_ms");
    }
}
