//! Periodic reconciliation of local counters with the counters store.
//!
//! Cumulative counters are published as `baseline + local`, where the baseline is read
//! once from the store. Absolute counters are published as-is. A write only happens when
//! the published set differs from the last one written; failures are retried on the
//! next tick with fresh values.

use crate::counters::{CounterFamily, CounterKey, CounterSnapshot, StreamCounters, STATS_FIELD_NAME};
use crate::latency::LatencyTracker;
use crate::signal::StopSignal;
use crate::store::{parse_counter, CountersStore};
use crate::error::StoreError;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Result of a single aggregation tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Baseline could not be read yet; nothing published.
    BaselinePending,
    /// Published values equal the last written set.
    Unchanged,
    /// The full set was written.
    Written,
    /// At least one key failed to write; retried next tick.
    WriteFailed,
}

pub struct CountersAggregator<S> {
    store: S,
    counters: Arc<StreamCounters>,
    latency: Arc<LatencyTracker>,
    baseline: Option<CounterSnapshot>,
    last_written: Option<CounterSnapshot>,
}

impl<S> std::fmt::Debug for CountersAggregator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountersAggregator")
            .field("baseline", &self.baseline)
            .field("last_written", &self.last_written)
            .finish_non_exhaustive()
    }
}

impl<S: CountersStore> CountersAggregator<S> {
    pub fn new(store: S, counters: Arc<StreamCounters>, latency: Arc<LatencyTracker>) -> Self {
        Self { store, counters, latency, baseline: None, last_written: None }
    }

    pub fn baseline(&self) -> Option<&CounterSnapshot> {
        self.baseline.as_ref()
    }

    pub fn last_written(&self) -> Option<&CounterSnapshot> {
        self.last_written.as_ref()
    }

    /// Read persisted cumulative counters. Absolute counters start from zero.
    ///
    /// Corrupt values are logged and treated as zero; backend failures are returned so the
    /// caller can retry instead of publishing totals that would shrink persisted values.
    pub async fn load_baseline(&mut self) -> Result<(), StoreError> {
        let mut baseline = CounterSnapshot::new();
        for key in CounterKey::ALL {
            let value = match key.family() {
                CounterFamily::Absolute => 0,
                CounterFamily::Cumulative => {
                    let raw = self.store.get_field(key.store_key(), STATS_FIELD_NAME).await?;
                    match parse_counter(key.store_key(), STATS_FIELD_NAME, raw) {
                        Ok(v) => v,
                        Err(e) => {
                            warn!(target: "evbridge::aggregator", counter = %key, error = %e, "ignoring persisted counter");
                            0
                        }
                    }
                }
            };
            baseline.insert(key, value);
        }
        debug!(target: "evbridge::aggregator", ?baseline, "counters baseline loaded");
        self.baseline = Some(baseline);
        Ok(())
    }

    /// Values that would be published right now.
    pub fn compute(&self) -> Option<CounterSnapshot> {
        let baseline = self.baseline.as_ref()?;
        if let Some(avg) = self.latency.average_ms() {
            self.counters.set_latency_ms(avg);
        }
        let last_errors = u64::try_from(self.latency.last_errors()).unwrap_or(0);

        let mut published = CounterSnapshot::new();
        for key in CounterKey::ALL {
            let local = self.counters.get(key);
            let mut value = match key.family() {
                CounterFamily::Cumulative => {
                    baseline.get(&key).copied().unwrap_or(0).saturating_add(local)
                }
                CounterFamily::Absolute => local,
            };
            if key == CounterKey::MissedBySlowReceiver {
                value = value.saturating_add(last_errors);
            }
            // The failure report overwrites, so it can shrink; persisted totals must not.
            if key.family() == CounterFamily::Cumulative {
                if let Some(prev) = self.last_written.as_ref().and_then(|w| w.get(&key)) {
                    value = value.max(*prev);
                }
            }
            published.insert(key, value);
        }
        Some(published)
    }

    /// Run one aggregation step.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.baseline.is_none() {
            if let Err(e) = self.load_baseline().await {
                warn!(target: "evbridge::aggregator", error = %e, "failed to read counters baseline");
                return TickOutcome::BaselinePending;
            }
        }
        let Some(published) = self.compute() else {
            return TickOutcome::BaselinePending;
        };
        if self.last_written.as_ref() == Some(&published) {
            return TickOutcome::Unchanged;
        }

        let mut failed = false;
        for (key, value) in &published {
            let fields = [(STATS_FIELD_NAME, value.to_string())];
            if let Err(e) = self.store.set_fields(key.store_key(), &fields).await {
                warn!(target: "evbridge::aggregator", counter = %key, value, error = %e, "failed to update counter");
                failed = true;
            }
        }
        if failed {
            return TickOutcome::WriteFailed;
        }
        debug!(target: "evbridge::aggregator", ?published, "counters written");
        self.last_written = Some(published);
        TickOutcome::Written
    }

    /// Tick every `interval` until `stop` fires, then flush once more.
    ///
    /// A tick in flight is abandoned when `stop` fires, and the final flush is bounded by
    /// `interval`, so a stalled store cannot hold the caller past shutdown.
    pub async fn run(mut self, interval: Duration, stop: StopSignal) -> Self {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    tokio::select! {
                        _ = self.tick() => {}
                        _ = stop.wait() => break,
                    }
                }
                _ = stop.wait() => break,
            }
        }
        if tokio::time::timeout(interval, self.tick()).await.is_err() {
            warn!(target: "evbridge::aggregator", ?interval, "final counters flush timed out");
        }
        debug!(target: "evbridge::aggregator", "counters aggregator stopped");
        self
    }
}
