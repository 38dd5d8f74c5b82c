//! Server-side session management.
//!
//! `SessionInterface` is the contract every backend implements: `open`
//! attaches a session to the request before the handler runs, `save`
//! persists it and sets the response cookie afterwards. Backends:
//! a signed cookie carrying the whole session, or a server-side store
//! (in-memory, Redis, memcache) keyed by a random session id.
//!
//! Concurrent requests sharing one session id are not coordinated; the
//! last `save` wins.

pub mod base;
pub mod cookie;
pub mod domain;
pub mod jar;
#[cfg(feature = "memcache-backend")]
pub mod memcache_store;
pub mod memory;
pub mod middleware;
#[cfg(feature = "redis-backend")]
pub mod redis_store;
pub mod server;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::config::{HostConfig, SESSION_BACKEND};
use crate::error::{ConfigError, SessionError};
use base::CookieSettings;
use cookie::CookieSessionInterface;
use jar::{SessionRequest, SessionResponse};
use server::{AnyStore, ServerSideInterface};

/// Session key-value data that records whether it was written to.
///
/// Reads never touch `modified`; every mutating method sets it, even when
/// the mutation turns out to be a no-op.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Session {
    #[serde(flatten)]
    data: HashMap<String, Value>,
    #[serde(skip)]
    sid: Option<String>,
    #[serde(skip)]
    modified: bool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session restored from `data`, unmodified.
    pub fn with_data(data: HashMap<String, Value>, sid: Option<String>) -> Self {
        Self {
            data,
            sid,
            modified: false,
        }
    }

    pub fn with_sid(sid: impl Into<String>) -> Self {
        Self::with_data(HashMap::new(), Some(sid.into()))
    }

    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    pub fn data(&self) -> &HashMap<String, Value> {
        &self.data
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.modified = true;
        self.data.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.modified = true;
        self.data.remove(key)
    }

    pub fn clear(&mut self) {
        self.modified = true;
        self.data.clear();
    }
}

/// Shared handle to the session attached to one request.
///
/// The middleware keeps one clone in the request's attribute bag and hands
/// another to the handler through request extensions; both see the same
/// session.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    inner: Arc<Mutex<Session>>,
}

impl SessionHandle {
    pub fn new(session: Session) -> Self {
        Self {
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.lock().await
    }

    /// Swap in a different session, returning the previous one.
    pub async fn replace(&self, session: Session) -> Session {
        std::mem::replace(&mut *self.inner.lock().await, session)
    }

    pub fn ptr_eq(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Pluggable session interface.
///
/// `init` is each variant's constructor; it reads configuration and fails
/// before any request is served when mandatory settings are missing.
pub trait SessionInterface: Send + Sync {
    fn settings(&self) -> &CookieSettings;

    /// Attach a session to `request`, returning it. A second call within the
    /// same request returns the already attached session.
    fn open(
        &self,
        request: &mut SessionRequest,
    ) -> impl std::future::Future<Output = Result<SessionHandle, SessionError>> + Send;

    /// Persist the attached session and set or clear the response cookie.
    fn save(
        &self,
        request: &SessionRequest,
        response: &mut SessionResponse,
    ) -> impl std::future::Future<Output = Result<(), SessionError>> + Send;
}

/// Session interface selected by `SESSION_BACKEND`.
///
/// `SessionInterface` uses RPITIT, so it is not object-safe; this enum
/// dispatches manually instead.
pub enum AnyInterface {
    Cookie(CookieSessionInterface),
    ServerSide(ServerSideInterface<AnyStore>),
}

impl AnyInterface {
    /// Build the configured interface: `cookie` (default), `memory`,
    /// `redis` or `memcache`.
    pub async fn init(config: &mut HostConfig, host_version: &str) -> Result<Self, ConfigError> {
        let backend = config.setdefault_str(SESSION_BACKEND, "cookie")?;
        let interface = match backend.as_str() {
            "cookie" => Self::Cookie(CookieSessionInterface::init(config, host_version)?),
            "memory" => {
                let store = AnyStore::Memory(memory::InMemoryStore::new());
                Self::ServerSide(ServerSideInterface::init(config, host_version, store)?)
            }
            #[cfg(feature = "redis-backend")]
            "redis" => {
                let uri = config.required_str(crate::config::SESSION_REDIS_URI)?;
                let store = AnyStore::Redis(redis_store::RedisStore::connect(&uri).await?);
                Self::ServerSide(ServerSideInterface::init(config, host_version, store)?)
            }
            #[cfg(feature = "memcache-backend")]
            "memcache" => {
                let uri = config.required_str(crate::config::SESSION_MEMCACHE_URI)?;
                let store = AnyStore::Memcache(memcache_store::MemcacheStore::connect(&uri).await?);
                Self::ServerSide(ServerSideInterface::init(config, host_version, store)?)
            }
            other => return Err(ConfigError::UnknownBackend(other.to_string())),
        };
        tracing::info!("Using {} session backend", interface.kind());
        Ok(interface)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AnyInterface::Cookie(_) => "cookie",
            AnyInterface::ServerSide(s) => s.store().kind(),
        }
    }
}

impl SessionInterface for AnyInterface {
    fn settings(&self) -> &CookieSettings {
        match self {
            AnyInterface::Cookie(i) => i.settings(),
            AnyInterface::ServerSide(i) => i.settings(),
        }
    }

    async fn open(&self, request: &mut SessionRequest) -> Result<SessionHandle, SessionError> {
        match self {
            AnyInterface::Cookie(i) => i.open(request).await,
            AnyInterface::ServerSide(i) => i.open(request).await,
        }
    }

    async fn save(
        &self,
        request: &SessionRequest,
        response: &mut SessionResponse,
    ) -> Result<(), SessionError> {
        match self {
            AnyInterface::Cookie(i) => i.save(request, response).await,
            AnyInterface::ServerSide(i) => i.save(request, response).await,
        }
    }
}
