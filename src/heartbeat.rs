//! Liveness records injected into the stream on a fixed interval.

use crate::clock::Clock;
use crate::forwarder::Route;
use crate::value::{QueuedValue, TypedValue, ValueKind};
use serde_json::json;

/// Builds heartbeat values. The payload is serialized once and reused.
#[derive(Debug, Clone)]
pub struct Heartbeat {
    payload: Vec<u8>,
}

impl Heartbeat {
    pub fn new() -> Self {
        let payload =
            serde_json::to_vec(&json!({ "heart": "beat" })).unwrap_or_else(|_| b"{}".to_vec());
        Self { payload }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// A heartbeat routed like real events and stamped with the current time.
    pub fn value(&self, route: &Route, clock: &dyn Clock) -> QueuedValue {
        route.wrap(ValueKind::Heartbeat, TypedValue::JsonIetf(self.payload.clone()), clock.now_nanos())
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}
