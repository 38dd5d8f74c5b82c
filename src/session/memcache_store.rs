//! Memcache session store.
//!
//! The `memcache` client is blocking and pools its own connections, so each
//! operation runs on the blocking thread pool.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::server::SessionStore;
use crate::error::{ConfigError, SessionError};

/// Memcached reads expirations above this as absolute Unix timestamps.
const MAX_RELATIVE_EXPIRATION: u64 = 30 * 24 * 3600;

pub struct MemcacheStore {
    client: Arc<memcache::Client>,
}

impl MemcacheStore {
    pub async fn connect(uri: &str) -> Result<Self, ConfigError> {
        let uri = uri.to_string();
        let client = tokio::task::spawn_blocking(move || memcache::Client::connect(uri.as_str()))
            .await
            .map_err(|e| ConfigError::Backend(e.to_string()))?
            .map_err(|e| ConfigError::Backend(format!("memcache connection failed: {e}")))?;
        tracing::info!("Connected to memcache session store");
        Ok(Self {
            client: Arc::new(client),
        })
    }

    async fn run<T, F>(&self, op: &str, key: &str, f: F) -> Result<T, SessionError>
    where
        T: Send + 'static,
        F: FnOnce(&memcache::Client, &str) -> Result<T, memcache::MemcacheError> + Send + 'static,
    {
        let client = self.client.clone();
        let owned_key = key.to_string();
        let result = tokio::task::spawn_blocking(move || f(&client, &owned_key))
            .await
            .map_err(|e| SessionError::BackendUnavailable(e.to_string()))?;
        result.map_err(|e| {
            tracing::error!("Failed to {} session {}: {}", op, key, e);
            SessionError::BackendUnavailable(e.to_string())
        })
    }
}

/// Expiration argument for a TTL, switching to an absolute timestamp past
/// the 30-day relative limit.
fn expiration_for(ttl: Duration, now: u64) -> u32 {
    let secs = ttl.as_secs().max(1);
    let value = if secs > MAX_RELATIVE_EXPIRATION {
        now + secs
    } else {
        secs
    };
    u32::try_from(value).unwrap_or(u32::MAX)
}

impl SessionStore for MemcacheStore {
    async fn load(&self, key: &str) -> Result<Option<String>, SessionError> {
        self.run("load", key, |client, key| client.get::<String>(key))
            .await
    }

    async fn store(&self, key: &str, payload: &str, ttl: Duration) -> Result<(), SessionError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let expiration = expiration_for(ttl, now);
        let payload = payload.to_string();
        self.run("save", key, move |client, key| {
            client.set(key, payload.as_str(), expiration)
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        self.run("delete", key, |client, key| client.delete(key).map(|_| ()))
            .await
    }
}
