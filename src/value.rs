//! Records received from the bus and the envelopes placed on the shared queue.

use std::fmt;

/// One occurrence delivered by the event bus. Immutable once received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    payload: String,
    missed_count: u64,
    publish_epoch_ms: i64,
}

impl EventRecord {
    pub fn new(payload: impl Into<String>, missed_count: u64, publish_epoch_ms: i64) -> Self {
        Self { payload: payload.into(), missed_count, publish_epoch_ms }
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }

    /// Events the bus itself lost since the previously delivered record.
    pub fn missed_count(&self) -> u64 {
        self.missed_count
    }

    pub fn publish_epoch_ms(&self) -> i64 {
        self.publish_epoch_ms
    }

    pub fn into_payload(self) -> String {
        self.payload
    }
}

/// Subscription path: a target plus ordered path elements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SubscriptionPath {
    pub target: String,
    pub elements: Vec<String>,
}

impl SubscriptionPath {
    pub fn new<I, S>(target: impl Into<String>, elements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { target: target.into(), elements: elements.into_iter().map(Into::into).collect() }
    }
}

impl fmt::Display for SubscriptionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:/{}", self.target, self.elements.join("/"))
    }
}

/// Payload carried by a queued value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedValue {
    /// Event text exactly as published on the bus.
    String(String),
    /// Serialized JSON (used for heartbeats).
    JsonIetf(Vec<u8>),
}

/// Where a queued value came from. Only events count toward drop accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValueKind {
    #[default]
    Event,
    Heartbeat,
}

/// Envelope inserted into the shared priority queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedValue {
    pub prefix: SubscriptionPath,
    pub path: Option<SubscriptionPath>,
    /// Delivery timestamp, epoch nanoseconds. Also the queue ordering key.
    pub timestamp: i64,
    pub kind: ValueKind,
    pub value: TypedValue,
}

impl QueuedValue {
    /// True if this value was synthesized by the heartbeat generator.
    pub fn is_heartbeat(&self) -> bool {
        self.kind == ValueKind::Heartbeat
    }
}

/// Truncate `payload` to at most `max_bytes`, never splitting a UTF-8 sequence.
pub fn truncate_payload(mut payload: String, max_bytes: usize) -> String {
    if payload.len() <= max_bytes {
        return payload;
    }
    let mut cut = max_bytes;
    while !payload.is_char_boundary(cut) {
        cut -= 1;
    }
    payload.truncate(cut);
    payload
}
