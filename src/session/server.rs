//! Server-side session interface.
//!
//! The session is stored as a compact JSON object under `prefix + sid`;
//! the cookie carries only that key. A request without a session cookie
//! gets a fresh id from `open` without touching the store.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use super::base::CookieSettings;
use super::jar::{SessionRequest, SessionResponse};
use super::memory::InMemoryStore;
use super::{Session, SessionHandle, SessionInterface};
use crate::config::{HostConfig, SESSION_KEY_PREFIX};
use crate::error::{ConfigError, SessionError};

pub const DEFAULT_KEY_PREFIX: &str = "session:";

/// Key-value persistence for serialized sessions.
///
/// Clients are shared across in-flight requests and must be safe for
/// concurrent use. Failures surface as `SessionError::BackendUnavailable`.
pub trait SessionStore: Send + Sync {
    /// Stored payload for `key`, or `None` if absent or expired.
    fn load(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<String>, SessionError>> + Send;

    /// Write `payload` with a time-to-live in one atomic operation.
    fn store(
        &self,
        key: &str,
        payload: &str,
        ttl: Duration,
    ) -> impl std::future::Future<Output = Result<(), SessionError>> + Send;

    fn delete(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<(), SessionError>> + Send;
}

/// Type-erased session store.
pub enum AnyStore {
    Memory(InMemoryStore),
    #[cfg(feature = "redis-backend")]
    Redis(super::redis_store::RedisStore),
    #[cfg(feature = "memcache-backend")]
    Memcache(super::memcache_store::MemcacheStore),
}

impl AnyStore {
    pub fn kind(&self) -> &'static str {
        match self {
            AnyStore::Memory(_) => "memory",
            #[cfg(feature = "redis-backend")]
            AnyStore::Redis(_) => "redis",
            #[cfg(feature = "memcache-backend")]
            AnyStore::Memcache(_) => "memcache",
        }
    }
}

impl SessionStore for AnyStore {
    async fn load(&self, key: &str) -> Result<Option<String>, SessionError> {
        match self {
            AnyStore::Memory(s) => s.load(key).await,
            #[cfg(feature = "redis-backend")]
            AnyStore::Redis(s) => s.load(key).await,
            #[cfg(feature = "memcache-backend")]
            AnyStore::Memcache(s) => s.load(key).await,
        }
    }

    async fn store(&self, key: &str, payload: &str, ttl: Duration) -> Result<(), SessionError> {
        match self {
            AnyStore::Memory(s) => s.store(key, payload, ttl).await,
            #[cfg(feature = "redis-backend")]
            AnyStore::Redis(s) => s.store(key, payload, ttl).await,
            #[cfg(feature = "memcache-backend")]
            AnyStore::Memcache(s) => s.store(key, payload, ttl).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), SessionError> {
        match self {
            AnyStore::Memory(s) => s.delete(key).await,
            #[cfg(feature = "redis-backend")]
            AnyStore::Redis(s) => s.delete(key).await,
            #[cfg(feature = "memcache-backend")]
            AnyStore::Memcache(s) => s.delete(key).await,
        }
    }
}

/// 256 random bits, base64url without padding.
pub fn generate_session_id() -> String {
    use rand::Rng;
    let bytes: [u8; 32] = rand::thread_rng().r#gen();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Session interface backed by a `SessionStore`.
pub struct ServerSideInterface<S: SessionStore> {
    settings: CookieSettings,
    store: S,
    prefix: String,
}

impl<S: SessionStore> ServerSideInterface<S> {
    /// Base settings plus `SESSION_KEY_PREFIX` (default `"session:"`).
    /// The store is connected by the caller.
    pub fn init(
        config: &mut HostConfig,
        host_version: &str,
        store: S,
    ) -> Result<Self, ConfigError> {
        let settings = CookieSettings::from_config(config, host_version)?;
        let prefix = config.setdefault_str(SESSION_KEY_PREFIX, DEFAULT_KEY_PREFIX)?;
        Ok(Self::new(settings, store, prefix))
    }

    pub fn new(settings: CookieSettings, store: S, prefix: impl Into<String>) -> Self {
        Self {
            settings,
            store,
            prefix: prefix.into(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Backend key for `sid`, adding the prefix unless already present.
    pub fn key_for(&self, sid: &str) -> String {
        if sid.starts_with(&self.prefix) {
            sid.to_string()
        } else {
            format!("{}{}", self.prefix, sid)
        }
    }
}

impl<S: SessionStore> SessionInterface for ServerSideInterface<S> {
    fn settings(&self) -> &CookieSettings {
        &self.settings
    }

    async fn open(&self, request: &mut SessionRequest) -> Result<SessionHandle, SessionError> {
        if let Some(existing) = request.get(&self.settings.session_name) {
            return Ok(existing.clone());
        }

        let sid = request
            .cookie(&self.settings.cookie_name)
            .filter(|sid| !sid.is_empty())
            .map(String::from);

        let session = match sid {
            None => Session::with_sid(generate_session_id()),
            Some(sid) => {
                let key = self.key_for(&sid);
                match self.store.load(&key).await? {
                    Some(payload) => {
                        let data: HashMap<String, Value> = serde_json::from_str(&payload)
                            .map_err(|_| SessionError::CorruptPayload { key })?;
                        Session::with_data(data, Some(sid))
                    }
                    None => {
                        tracing::debug!(key = %key, "session not found, starting empty");
                        Session::with_sid(sid)
                    }
                }
            }
        };

        let handle = SessionHandle::new(session);
        request.set(&self.settings.session_name, handle.clone());
        Ok(handle)
    }

    /// An emptied session is deleted even if the handler emptied it on
    /// purpose; it is indistinguishable from one that never held data.
    async fn save(
        &self,
        request: &SessionRequest,
        response: &mut SessionResponse,
    ) -> Result<(), SessionError> {
        let Some(handle) = request.get(&self.settings.session_name) else {
            return Ok(());
        };

        let (key, payload) = {
            let session = handle.lock().await;
            let sid = session.sid().map(String::from).unwrap_or_else(generate_session_id);
            let key = self.key_for(&sid);
            if session.is_empty() {
                (key, None)
            } else {
                (key, Some(serde_json::to_string(&*session)?))
            }
        };

        match payload {
            None => {
                self.store.delete(&key).await?;
                self.settings.delete_cookie(response);
            }
            Some(payload) => {
                let ttl = Duration::from_secs(self.settings.expiry);
                self.store.store(&key, &payload, ttl).await?;
                self.settings.set_cookie_attributes(response, key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::jar::CookieExpires;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::HashSet;

    /// Store whose every operation fails.
    struct DownStore;

    impl SessionStore for DownStore {
        async fn load(&self, _key: &str) -> Result<Option<String>, SessionError> {
            Err(SessionError::BackendUnavailable("connection refused".into()))
        }

        async fn store(
            &self,
            _key: &str,
            _payload: &str,
            _ttl: Duration,
        ) -> Result<(), SessionError> {
            Err(SessionError::BackendUnavailable("connection refused".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), SessionError> {
            Err(SessionError::BackendUnavailable("connection refused".into()))
        }
    }

    fn interface_with<S: SessionStore>(store: S) -> ServerSideInterface<S> {
        ServerSideInterface::init(&mut HostConfig::new(), "19", store).unwrap()
    }

    fn interface() -> ServerSideInterface<InMemoryStore> {
        interface_with(InMemoryStore::new())
    }

    async fn save(
        iface: &ServerSideInterface<InMemoryStore>,
        request: &SessionRequest,
    ) -> SessionResponse {
        let mut response = SessionResponse::new();
        iface.save(request, &mut response).await.unwrap();
        response
    }

    #[test]
    fn test_key_for_adds_prefix_once() {
        let iface = interface();
        assert_eq!(iface.key_for("abc"), "session:abc");
        assert_eq!(iface.key_for("session:abc"), "session:abc");
    }

    #[test]
    fn test_custom_prefix() {
        let mut cfg = HostConfig::new().with(SESSION_KEY_PREFIX, "app:");
        let iface = ServerSideInterface::init(&mut cfg, "19", InMemoryStore::new()).unwrap();
        assert_eq!(iface.key_for("abc"), "app:abc");
    }

    #[test]
    fn test_generated_ids_are_cookie_safe() {
        let sid = generate_session_id();
        assert_eq!(sid.len(), 43);
        assert!(sid.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn test_generated_ids_do_not_collide() {
        let ids: HashSet<String> = (0..100_000).map(|_| generate_session_id()).collect();
        assert_eq!(ids.len(), 100_000);
    }

    #[tokio::test]
    async fn test_new_session_is_lazy() {
        let iface = interface();
        let mut request = SessionRequest::new();
        let handle = iface.open(&mut request).await.unwrap();

        let session = handle.lock().await;
        assert!(session.is_empty());
        assert!(!session.is_modified());
        assert!(session.sid().is_some());
        assert!(iface.store().is_empty());
    }

    #[tokio::test]
    async fn test_save_then_open_roundtrip() {
        let iface = interface();
        let mut request = SessionRequest::new();
        let handle = iface.open(&mut request).await.unwrap();
        handle.lock().await.insert("user", json!({"name": "alice", "id": 7}));

        let response = save(&iface, &request).await;
        let cookie = response.get("session").unwrap();
        assert!(cookie.value.starts_with("session:"));
        assert_eq!(cookie.max_age, Some(86400));

        let stored = iface.store().load(&cookie.value).await.unwrap().unwrap();
        assert_eq!(stored, r#"{"user":{"id":7,"name":"alice"}}"#);

        let mut next = SessionRequest::new().with_cookie("session", &cookie.value);
        let restored = iface.open(&mut next).await.unwrap();
        let restored = restored.lock().await;
        assert_eq!(restored.get("user"), Some(&json!({"name": "alice", "id": 7})));
        assert_eq!(restored.sid(), Some(cookie.value.as_str()));
    }

    #[tokio::test]
    async fn test_unprefixed_cookie_is_normalized() {
        let iface = interface();
        iface
            .store()
            .store("session:legacy", r#"{"k":1}"#, Duration::from_secs(60))
            .await
            .unwrap();

        let mut request = SessionRequest::new().with_cookie("session", "legacy");
        let handle = iface.open(&mut request).await.unwrap();
        assert_eq!(handle.lock().await.get("k"), Some(&json!(1)));

        let response = save(&iface, &request).await;
        // Nothing modified, but a non-empty session is still written back
        assert_eq!(response.get("session").unwrap().value, "session:legacy");
    }

    #[tokio::test]
    async fn test_unknown_id_reuses_cookie_id() {
        let iface = interface();
        let mut request = SessionRequest::new().with_cookie("session", "session:gone");
        let handle = iface.open(&mut request).await.unwrap();
        handle.lock().await.insert("k", json!(true));

        let response = save(&iface, &request).await;
        assert_eq!(response.get("session").unwrap().value, "session:gone");
        assert!(iface.store().load("session:gone").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_emptied_session_is_deleted() {
        let iface = interface();
        iface
            .store()
            .store("session:abc", r#"{"user":"alice"}"#, Duration::from_secs(60))
            .await
            .unwrap();

        let mut request = SessionRequest::new().with_cookie("session", "session:abc");
        let handle = iface.open(&mut request).await.unwrap();
        handle.lock().await.remove("user");

        let response = save(&iface, &request).await;
        assert!(iface.store().load("session:abc").await.unwrap().is_none());

        let cookie = response.get("session").unwrap();
        assert_eq!(cookie.value, "");
        assert_eq!(cookie.max_age, Some(0));
        assert!(matches!(cookie.expires, Some(CookieExpires::At(at)) if at <= Utc::now()));
    }

    #[tokio::test]
    async fn test_untouched_new_session_clears_cookie() {
        let iface = interface();
        let mut request = SessionRequest::new();
        iface.open(&mut request).await.unwrap();

        let response = save(&iface, &request).await;
        assert_eq!(response.get("session").unwrap().max_age, Some(0));
        assert!(iface.store().is_empty());
    }

    #[tokio::test]
    async fn test_save_without_session_is_noop() {
        let iface = interface();
        let response = save(&iface, &SessionRequest::new()).await;
        assert!(!response.contains("session"));
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let iface = interface();
        let mut request = SessionRequest::new();
        let first = iface.open(&mut request).await.unwrap();
        let second = iface.open(&mut request).await.unwrap();
        assert!(first.ptr_eq(&second));
        let first_sid = first.lock().await.sid().map(String::from);
        assert!(first_sid.is_some());
        assert_eq!(second.lock().await.sid().map(String::from), first_sid);
    }

    #[tokio::test]
    async fn test_corrupt_payload_is_reported() {
        let iface = interface();
        iface
            .store()
            .store("session:bad", "not json", Duration::from_secs(60))
            .await
            .unwrap();

        let mut request = SessionRequest::new().with_cookie("session", "session:bad");
        let err = iface.open(&mut request).await.unwrap_err();
        assert!(matches!(err, SessionError::CorruptPayload { key } if key == "session:bad"));
    }

    #[tokio::test]
    async fn test_backend_failure_propagates_from_open() {
        let iface = interface_with(DownStore);
        let mut request = SessionRequest::new().with_cookie("session", "session:abc");
        let err = iface.open(&mut request).await.unwrap_err();
        assert!(matches!(err, SessionError::BackendUnavailable(_)));
        assert!(!request.contains("session"));
    }

    #[tokio::test]
    async fn test_backend_failure_propagates_from_save() {
        let iface = interface_with(DownStore);
        // No cookie: open succeeds without touching the backend
        let mut request = SessionRequest::new();
        let handle = iface.open(&mut request).await.unwrap();
        handle.lock().await.insert("k", json!(1));

        let mut response = SessionResponse::new();
        let err = iface.save(&request, &mut response).await.unwrap_err();
        assert!(matches!(err, SessionError::BackendUnavailable(_)));
        assert!(!response.contains("session"));
    }

    #[tokio::test]
    async fn test_secure_and_domain_applied() {
        let mut cfg = HostConfig::new()
            .with(crate::config::SESSION_COOKIE_SECURE, true)
            .with(crate::config::SERVER_NAME, "example.com");
        let iface = ServerSideInterface::init(&mut cfg, "19", InMemoryStore::new()).unwrap();
        let mut request = SessionRequest::new();
        iface.open(&mut request).await.unwrap().lock().await.insert("k", json!(1));

        let response = save(&iface, &request).await;
        let cookie = response.get("session").unwrap();
        assert!(cookie.secure);
        assert_eq!(cookie.domain.as_deref(), Some(".example.com"));
    }
}
