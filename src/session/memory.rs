//! In-memory session store for development and testing.
//!
//! Uses `DashMap` for concurrent access without external locks.
//! Entries carry a deadline that every write pushes forward. A TTL too large
//! for `Instant` stores the entry without a deadline.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use super::server::SessionStore;
use crate::error::SessionError;

/// In-memory session store.
///
/// Not suitable for production — sessions are lost on restart and not
/// shared across processes. Use the Redis store for production.
pub struct InMemoryStore {
    store: DashMap<String, (String, Option<Instant>)>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            store: DashMap::new(),
        }
    }

    /// Number of entries currently stored (including expired).
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Remove `key` only if it is still expired; a write racing the
    /// eviction keeps its entry.
    fn evict_expired(&self, key: &str) {
        self.store.remove_if(key, |_, (_, deadline)| is_expired(*deadline));
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

impl SessionStore for InMemoryStore {
    async fn load(&self, key: &str) -> Result<Option<String>, SessionError> {
        let Some(entry) = self.store.get(key) else {
            return Ok(None);
        };
        let (payload, deadline) = entry.value();

        if !is_expired(*deadline) {
            return Ok(Some(payload.clone()));
        }

        drop(entry); // Release the read lock before removing
        self.evict_expired(key);
        Ok(None)
    }

    async fn store(&self, key: &str, payload: &str, ttl: Duration) -> Result<(), SessionError> {
        self.store.insert(
            key.to_string(),
            (payload.to_string(), Instant::now().checked_add(ttl)),
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        self.store.remove(key);
        Ok(())
    }
}
