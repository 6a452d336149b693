//! Redis counters store for `evbridge` (companion crate).
//! Bring your own URL or `ConnectionManager`; each counter is a hash with a `value` field.

use async_trait::async_trait;
use evbridge::{CountersStore, StoreError};
use redis::aio::ConnectionManager;

#[derive(Clone)]
pub struct RedisCountersStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisCountersStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCountersStore").field("conn", &"<redis::aio::ConnectionManager>").finish()
    }
}

impl RedisCountersStore {
    /// Connect to `url` (`redis://host:port/db` or `rediss://...`).
    ///
    /// # Errors
    /// Returns `Err` if the URL is not a redis URL or the initial connection fails.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let url = url.trim();
        if !url.starts_with("redis://") && !url.starts_with("rediss://") {
            return Err(StoreError::Backend(format!(
                "redis URL must start with redis:// or rediss:// (got {url:?})"
            )));
        }
        let client = redis::Client::open(url).map_err(backend)?;
        let conn = client.get_connection_manager().await.map_err(backend)?;
        tracing::debug!(target: "evbridge::redis", "connected counters store");
        Ok(Self { conn })
    }

    /// Wrap an existing connection manager.
    pub fn from_manager(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

fn backend(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl CountersStore for RedisCountersStore {
    async fn get_field(&self, key: &str, field: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("HGET")
            .arg(key)
            .arg(field)
            .query_async::<Option<String>>(&mut conn)
            .await
            .map_err(backend)
    }

    async fn set_fields(&self, key: &str, fields: &[(&str, String)]) -> Result<(), StoreError> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (field, value) in fields {
            cmd.arg(*field).arg(value.as_str());
        }
        match cmd.query_async::<()>(&mut conn).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(
                    target: "evbridge::redis",
                    key = %key,
                    error = %e,
                    "failed to write counters"
                );
                Err(backend(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_redis_urls() {
        let err = RedisCountersStore::connect("http://127.0.0.1:6379").await.unwrap_err();
        assert!(err.to_string().contains("redis://"));
    }
}
