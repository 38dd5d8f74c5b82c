//! Redis session store.
//!
//! Holds one `ConnectionManager`, which multiplexes a single reconnecting
//! connection and is cheap to clone per call. Writes use `SET key value EX
//! ttl` so the value never exists without its expiry.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

use super::server::SessionStore;
use crate::error::{ConfigError, SessionError};

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Parse `uri` and open the managed connection.
    pub async fn connect(uri: &str) -> Result<Self, ConfigError> {
        let client = redis::Client::open(uri)
            .map_err(|e| ConfigError::Backend(format!("invalid redis URI: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| ConfigError::Backend(format!("redis connection failed: {e}")))?;
        tracing::info!("Connected to redis session store");
        Ok(Self { conn })
    }
}

fn unavailable(op: &str, key: &str, e: redis::RedisError) -> SessionError {
    tracing::error!("Failed to {} session {}: {}", op, key, e);
    SessionError::BackendUnavailable(e.to_string())
}

impl SessionStore for RedisStore {
    async fn load(&self, key: &str) -> Result<Option<String>, SessionError> {
        let mut conn = self.conn.clone();
        conn.get(key).await.map_err(|e| unavailable("load", key, e))
    }

    async fn store(&self, key: &str, payload: &str, ttl: Duration) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, payload, ttl.as_secs().max(1))
            .await
            .map_err(|e| unavailable("save", key, e))
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| unavailable("delete", key, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_uri_is_config_error() {
        let err = RedisStore::connect("not a uri").await.err().unwrap();
        assert!(matches!(err, ConfigError::Backend(_)));
    }

    /// Needs a live server: `SESSION_REDIS_URI=redis://127.0.0.1/ cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_store_load_delete_against_server() {
        let uri =
            std::env::var("SESSION_REDIS_URI").unwrap_or_else(|_| "redis://127.0.0.1/".into());
        let store = RedisStore::connect(&uri).await.unwrap();
        let key = format!("session:test-{}", crate::session::server::generate_session_id());

        store.store(&key, r#"{"k":1}"#, Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.load(&key).await.unwrap().as_deref(), Some(r#"{"k":1}"#));

        let mut conn = store.conn.clone();
        let ttl: i64 = conn.ttl(&key).await.unwrap();
        assert!(ttl > 0 && ttl <= 60);

        store.delete(&key).await.unwrap();
        assert!(store.load(&key).await.unwrap().is_none());
    }
}
