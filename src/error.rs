//! Error types for the event bridge.
//!
//! Each collaborator boundary gets its own error enum; [`StreamError`] is what a
//! streaming session reports to its caller when it ends abnormally.

/// Failures reported by an event bus adapter.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum BusError {
    /// The subscriber could not be initialised.
    #[error("subscribe failed: {0}")]
    Subscribe(String),
    /// A receive call failed for a reason other than timing out.
    #[error("receive failed (rc={rc}): {message}")]
    Receive {
        /// Adapter-specific status code.
        rc: i32,
        /// Human readable detail.
        message: String,
    },
    /// The bus side has gone away; no further records will arrive.
    #[error("event bus disconnected")]
    Disconnected,
}

/// Failures when inserting into the shared queue.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum QueueError {
    /// The consuming session closed the queue.
    #[error("queue closed by consumer")]
    Closed,
}

/// Failures from a counters store backend.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// Backend I/O or protocol failure.
    #[error("counters store backend: {0}")]
    Backend(String),
    /// A persisted field did not hold an unsigned decimal.
    #[error("invalid value {value:?} for {key}:{field}")]
    InvalidValue {
        /// Store key.
        key: String,
        /// Field name.
        field: String,
        /// Raw value as read.
        value: String,
    },
}

/// Errors produced when validating client configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// A duration setting was zero.
    #[error("{name} must be > 0")]
    ZeroDuration {
        /// Setting name.
        name: &'static str,
    },
    /// A capacity setting was zero.
    #[error("{name} must be > 0 (got {provided})")]
    ZeroCapacity {
        /// Setting name.
        name: &'static str,
        /// Value provided by caller.
        provided: usize,
    },
    /// JSON configuration could not be parsed.
    #[error("invalid config: {0}")]
    Parse(String),
}

/// Why a streaming session ended abnormally.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    /// The bus subscription could not be created.
    #[error("event bus: {0}")]
    Bus(#[from] BusError),
    /// The consumer closed the queue; the session is over.
    #[error("queue: {0}")]
    Queue(#[from] QueueError),
    /// `stream_run` was invoked on a client that already ran.
    #[error("client already started")]
    AlreadyStarted,
    /// The forwarding task panicked or was aborted.
    #[error("forwarding task failed: {0}")]
    TaskFailed(String),
}

impl StreamError {
    /// True when the session ended because the consumer closed the queue.
    pub fn is_queue_closed(&self) -> bool {
        matches!(self, Self::Queue(QueueError::Closed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_error_display_includes_rc() {
        let err = BusError::Receive { rc: -3, message: "bad frame".into() };
        let msg = err.to_string();
        assert!(msg.contains("rc=-3"));
        assert!(msg.contains("bad frame"));
    }

    #[test]
    fn stream_error_wraps_queue_closed() {
        let err: StreamError = QueueError::Closed.into();
        assert!(err.is_queue_closed());
        assert!(err.to_string().contains("closed"));
        let err: StreamError = BusError::Disconnected.into();
        assert!(!err.is_queue_closed());
    }

    #[test]
    fn invalid_value_names_key_and_field() {
        let err = StoreError::InvalidValue {
            key: "EVENTS_COUNTERS:missed_internal".into(),
            field: "value".into(),
            value: "abc".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("EVENTS_COUNTERS:missed_internal:value"));
        assert!(msg.contains("\"abc\""));
    }
}
