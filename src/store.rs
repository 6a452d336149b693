//! Counters persistence interface.
//!
//! Backends are keyed hash stores: each counter lives under its own key with a single
//! `value` field holding an unsigned decimal.

use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Abstract storage for persisted counters.
#[async_trait]
pub trait CountersStore: Send + Sync + 'static {
    /// Read one field of a key; `Ok(None)` when the key or field is absent.
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Set several fields of a key in one operation.
    async fn set_fields(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError>;
}

#[async_trait]
impl<S: CountersStore + ?Sized> CountersStore for Arc<S> {
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        (**self).get_field(key, field).await
    }

    async fn set_fields(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        (**self).set_fields(key, fields).await
    }
}

/// In-memory counters store. Clones share the same data.
#[derive(Default, Clone, Debug)]
pub struct InMemoryCountersStore {
    data: Arc<Mutex<HashMap<String, HashMap<String, String>>>>,
    writes: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
}

impl InMemoryCountersStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a field, e.g. to simulate values persisted by an earlier run.
    pub fn insert(&self, key: &str, field: &str, value: impl Into<String>) {
        let mut guard = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        guard.entry(key.to_string()).or_default().insert(field.to_string(), value.into());
    }

    pub fn field(&self, key: &str, field: &str) -> Option<String> {
        let guard = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        guard.get(key).and_then(|f| f.get(field)).cloned()
    }

    /// Number of successful `set_fields` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make subsequent writes fail until reset.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl CountersStore for InMemoryCountersStore {
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        Ok(self.field(key, field))
    }

    async fn set_fields(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(format!("write to {key} rejected")));
        }
        let mut guard = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = guard.entry(key.to_string()).or_default();
        for (field, value) in fields {
            entry.insert((*field).to_string(), value.clone());
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Parse a persisted counter value. Missing values read as zero.
pub fn parse_counter(key: &str, field: &str, raw: Option<String>) -> Result<u64, StoreError> {
    match raw {
        None => Ok(0),
        Some(s) => s.trim().parse::<u64>().map_err(|_| StoreError::InvalidValue {
            key: key.to_string(),
            field: field.to_string(),
            value: s,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_round_trips_fields() {
        let store = InMemoryCountersStore::new();
        store.set_fields("k", &[("value", "42".to_string())]).await.unwrap();
        assert_eq!(store.get_field("k", "value").await.unwrap().as_deref(), Some("42"));
        assert_eq!(store.get_field("k", "other").await.unwrap(), None);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn injected_failures_do_not_count_as_writes() {
        let store = InMemoryCountersStore::new();
        store.fail_writes(true);
        assert!(store.set_fields("k", &[("value", "1".to_string())]).await.is_err());
        assert_eq!(store.write_count(), 0);
        assert_eq!(store.field("k", "value"), None);
    }

    #[test]
    fn parse_counter_handles_missing_and_garbage() {
        assert_eq!(parse_counter("k", "value", None).unwrap(), 0);
        assert_eq!(parse_counter("k", "value", Some(" 17 ".into())).unwrap(), 17);
        assert!(matches!(
            parse_counter("k", "value", Some("-1".into())),
            Err(StoreError::InvalidValue { .. })
        ));
    }
}
