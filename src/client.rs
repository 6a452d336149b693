//! Event stream client: the orchestrator tying bus, queue, heartbeat, and counters together.
//!
//! A session looks like this:
//!
//! 1. subscribe to the bus (cache enabled, bounded receive timeout);
//! 2. spawn the [`ForwardingLoop`] and the [`CountersAggregator`];
//! 3. select between heartbeat ticks, the stop signal, and forwarding-loop exit;
//! 4. mark the client stopping, join the forwarding loop to get the subscriber back,
//!    release it, then stop the aggregator (which flushes one last time).
//!
//! Only the orchestrator releases the subscriber, and only after the forwarding loop has
//! returned it, so the handle can never be used after release.

use crate::aggregator::CountersAggregator;
use crate::bus::{EventBus, EventSubscriber, SubscriberOptions};
use crate::clock::{Clock, SystemClock};
use crate::config::EventClientConfig;
use crate::counters::{CounterKey, StreamCounters};
use crate::error::{QueueError, StreamError};
use crate::forwarder::{ForwardExit, ForwardingLoop, Offer, Publisher, Route};
use crate::heartbeat::Heartbeat;
use crate::latency::LatencyTracker;
use crate::queue::ValueQueue;
use crate::signal::StopSignal;
use crate::store::CountersStore;
use crate::value::{QueuedValue, SubscriptionPath, TypedValue};
use async_trait::async_trait;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

/// Queue shared with the consuming session.
pub type SharedQueue = Arc<dyn ValueQueue>;

const PHASE_RUNNING: u8 = 0;
const PHASE_STOPPING: u8 = 1;
const PHASE_STOPPED: u8 = 2;

/// Lifecycle phase of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Stopping,
    Stopped,
}

/// Stop flag shared between the orchestrator (sole writer) and the forwarding loop.
#[derive(Debug)]
pub struct ClientState {
    phase: AtomicU8,
}

impl ClientState {
    pub fn new() -> Self {
        Self { phase: AtomicU8::new(PHASE_RUNNING) }
    }

    /// Move from running to stopping. Returns `false` if already stopping or stopped.
    pub fn begin_stop(&self) -> bool {
        self.phase
            .compare_exchange(PHASE_RUNNING, PHASE_STOPPING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn mark_stopped(&self) {
        self.phase.store(PHASE_STOPPED, Ordering::Release);
    }

    pub fn is_stopping(&self) -> bool {
        self.phase.load(Ordering::Acquire) != PHASE_RUNNING
    }

    pub fn phase(&self) -> Phase {
        match self.phase.load(Ordering::Acquire) {
            PHASE_RUNNING => Phase::Running,
            PHASE_STOPPING => Phase::Stopping,
            _ => Phase::Stopped,
        }
    }
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-session parameters supplied by the subscriber.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionParameters {
    /// Overrides the configured heartbeat interval when set and non-zero.
    pub heartbeat_interval: Option<Duration>,
}

/// Outcome callbacks the consuming session invokes after delivering a value.
pub trait DeliveryObserver: Send + Sync {
    /// A value was delivered to the remote subscriber.
    fn sent(&self, value: &QueuedValue);

    /// Delivery failed; `count` is the session's current failure count.
    fn failed_send(&self, count: i64);
}

/// Point-in-time view of the local counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStats {
    pub missed_internal: u64,
    pub missed_by_slow_receiver: u64,
    pub last_failed_send: i64,
    pub latency_ms: Option<u64>,
    pub phase: Phase,
}

/// Interface shared by the stream client variants. Only streaming is meaningful for the
/// event client; the other modes return immediately with empty results.
#[async_trait]
pub trait StreamClient: Send + Sync {
    /// Forward until `stop` fires, the client is stopped, or the queue closes.
    async fn stream_run(
        &self,
        queue: SharedQueue,
        stop: StopSignal,
        params: &SessionParameters,
    ) -> Result<(), StreamError>;

    async fn once_run(&self, _queue: SharedQueue, _once: StopSignal) -> Result<(), StreamError> {
        Ok(())
    }

    async fn poll_run(&self, _queue: SharedQueue, _poll: StopSignal) -> Result<(), StreamError> {
        Ok(())
    }

    async fn get(&self) -> Result<Vec<QueuedValue>, StreamError> {
        Ok(Vec::new())
    }

    async fn set(&self, _updates: &[(SubscriptionPath, TypedValue)]) -> Result<(), StreamError> {
        Ok(())
    }

    fn capabilities(&self) -> Vec<String> {
        Vec::new()
    }

    /// Request the running session to end. Safe to call any number of times.
    fn stop(&self);

    async fn close(&self) -> Result<(), StreamError>;
}

/// Streams records from an [`EventBus`] into a shared queue.
pub struct EventClient<B, S> {
    bus: B,
    store: Arc<S>,
    config: EventClientConfig,
    route: Route,
    counters: Arc<StreamCounters>,
    latency: Arc<LatencyTracker>,
    clock: Arc<dyn Clock>,
    state: Arc<ClientState>,
    started: AtomicBool,
    stop: StopSignal,
    heartbeat: Heartbeat,
}

impl<B, S> fmt::Display for EventClient<B, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventClient Prefix {}", self.route.prefix.target)
    }
}

impl<B, S> fmt::Debug for EventClient<B, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventClient")
            .field("route", &self.route)
            .field("config", &self.config)
            .field("phase", &self.state.phase())
            .finish_non_exhaustive()
    }
}

impl<B, S> EventClient<B, S>
where
    B: EventBus,
    S: CountersStore,
{
    /// Build a client for `prefix`. Only one path is expected; if several are given the
    /// last one is used.
    pub fn new(
        paths: Vec<SubscriptionPath>,
        prefix: SubscriptionPath,
        bus: B,
        store: S,
        config: EventClientConfig,
    ) -> Self {
        let path = paths.into_iter().last();
        let latency = Arc::new(LatencyTracker::new(config.latency_window()));
        let client = Self {
            bus,
            store: Arc::new(store),
            route: Route { prefix, path },
            counters: Arc::new(StreamCounters::new()),
            latency,
            clock: Arc::new(SystemClock),
            state: Arc::new(ClientState::new()),
            started: AtomicBool::new(false),
            stop: StopSignal::new(),
            heartbeat: Heartbeat::new(),
            config,
        };
        debug!(target: "evbridge::client", client = %client, "event client constructed");
        client
    }

    /// Override the clock (useful for deterministic latency tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn config(&self) -> &EventClientConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            missed_internal: self.counters.get(CounterKey::MissedInternal),
            missed_by_slow_receiver: self.counters.get(CounterKey::MissedBySlowReceiver),
            last_failed_send: self.latency.last_errors(),
            latency_ms: self.latency.average_ms(),
            phase: self.state.phase(),
        }
    }

    fn heartbeat_interval(&self, params: &SessionParameters) -> Duration {
        params
            .heartbeat_interval
            .filter(|d| !d.is_zero())
            .unwrap_or_else(|| self.config.heartbeat_interval())
    }

    async fn run_session(
        &self,
        queue: SharedQueue,
        stop: StopSignal,
        params: &SessionParameters,
    ) -> Result<(), StreamError> {
        let options = SubscriberOptions {
            use_cache: self.config.use_cache(),
            receive_timeout: self.config.receive_timeout(),
            max_payload_bytes: self.config.max_payload_bytes(),
        };
        let subscriber = match self.bus.subscribe(options).await {
            Ok(s) => s,
            Err(e) => {
                error!(target: "evbridge::client", client = %self, error = %e, "event subscriber init failed");
                self.state.begin_stop();
                self.state.mark_stopped();
                return Err(e.into());
            }
        };
        info!(target: "evbridge::client", client = %self, "event stream started");

        let session_done = StopSignal::new();
        let aggregator =
            CountersAggregator::new(self.store.clone(), self.counters.clone(), self.latency.clone());
        let aggregator = tokio::spawn(aggregator.run(self.config.stats_interval(), session_done.clone()));

        let publisher = Publisher::new(queue, self.config.queue_capacity(), self.counters.clone());
        let forwarding_loop = ForwardingLoop::new(
            subscriber,
            publisher.clone(),
            self.route.clone(),
            self.counters.clone(),
            self.state.clone(),
        );
        let mut forwarding = tokio::spawn(forwarding_loop.run());

        let period = self.heartbeat_interval(params);
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut joined = None;
        let outcome = loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match publisher.offer(self.heartbeat.value(&self.route, self.clock.as_ref())) {
                        Ok(Offer::Enqueued) => trace!(target: "evbridge::client", "heartbeat sent"),
                        Ok(Offer::Dropped) => debug!(target: "evbridge::client", "heartbeat dropped, queue full"),
                        Err(e) => {
                            warn!(target: "evbridge::client", client = %self, error = %e, "heartbeat enqueue failed");
                            break Err(StreamError::from(e));
                        }
                    }
                }
                _ = stop.wait() => {
                    info!(target: "evbridge::client", client = %self, "stop signal received");
                    break Ok(());
                }
                _ = self.stop.wait() => {
                    info!(target: "evbridge::client", client = %self, "client stopped");
                    break Ok(());
                }
                res = &mut forwarding => {
                    let outcome = match &res {
                        Ok((_, ForwardExit::QueueClosed)) => Err(StreamError::Queue(QueueError::Closed)),
                        Ok((_, ForwardExit::Stopped)) => Ok(()),
                        Err(e) => Err(StreamError::TaskFailed(e.to_string())),
                    };
                    joined = Some(res);
                    break outcome;
                }
            }
        };

        self.state.begin_stop();
        let joined = match joined {
            Some(res) => res,
            None => forwarding.await,
        };
        let outcome = match joined {
            Ok((subscriber, exit)) => {
                subscriber.release();
                debug!(target: "evbridge::client", ?exit, "event subscriber released");
                outcome
            }
            Err(e) => {
                error!(target: "evbridge::client", error = %e, "forwarding task failed; subscriber dropped without release");
                outcome.and(Err(StreamError::TaskFailed(e.to_string())))
            }
        };
        self.state.mark_stopped();

        session_done.fire();
        if let Err(e) = aggregator.await {
            warn!(target: "evbridge::client", error = %e, "counters aggregator task failed");
        }
        info!(target: "evbridge::client", client = %self, ok = outcome.is_ok(), "event stream ended");
        outcome
    }
}

#[async_trait]
impl<B, S> StreamClient for EventClient<B, S>
where
    B: EventBus,
    S: CountersStore,
{
    async fn stream_run(
        &self,
        queue: SharedQueue,
        stop: StopSignal,
        params: &SessionParameters,
    ) -> Result<(), StreamError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(StreamError::AlreadyStarted);
        }
        self.run_session(queue, stop, params).await
    }

    fn stop(&self) {
        self.stop.fire();
    }

    async fn close(&self) -> Result<(), StreamError> {
        self.stop.fire();
        Ok(())
    }
}

impl<B, S> DeliveryObserver for EventClient<B, S>
where
    B: Send + Sync,
    S: Send + Sync,
{
    fn sent(&self, value: &QueuedValue) {
        self.latency.record_sent(value.timestamp, self.clock.now_nanos());
    }

    fn failed_send(&self, count: i64) {
        self.latency.record_failed(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_moves_forward_only() {
        let state = ClientState::new();
        assert_eq!(state.phase(), Phase::Running);
        assert!(!state.is_stopping());
        assert!(state.begin_stop());
        assert!(!state.begin_stop());
        assert_eq!(state.phase(), Phase::Stopping);
        assert!(state.is_stopping());
        state.mark_stopped();
        assert!(!state.begin_stop());
        assert_eq!(state.phase(), Phase::Stopped);
    }
}
