//! Signed-cookie session interface.
//!
//! The whole session travels in the cookie as a timestamped, HMAC-SHA256
//! signed token; nothing is stored server-side.
//!
//! Token format: `base64url(json).base64url(timestamp).base64url(mac)`,
//! where the MAC covers `payload.timestamp` under a key derived from the
//! secret and salt.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use super::base::CookieSettings;
use super::jar::{SessionRequest, SessionResponse};
use super::{Session, SessionHandle, SessionInterface};
use crate::config::{HostConfig, SECRET_KEY, SESSION_COOKIE_SALT, SESSION_COOKIE_SECRET_KEY};
use crate::error::{ConfigError, SessionError};

type HmacSha256 = Hmac<Sha256>;

/// Browsers drop cookies larger than this.
const MAX_COOKIE_SIZE: usize = 4093;

/// Token rejected for any reason: malformed, bad MAC, or outside its
/// validity window. Callers treat all of these as "no session".
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct BadSignature {
    pub reason: String,
    /// Decoded payload, when the token was well-formed enough to have one.
    pub payload: Option<String>,
}

impl BadSignature {
    fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            payload: None,
        }
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Timestamped HMAC signer for session payloads.
#[derive(Clone)]
pub struct TimedSigner {
    key: Vec<u8>,
}

impl TimedSigner {
    pub fn new(secret: &[u8], salt: &[u8]) -> Self {
        let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC key length is always valid");
        mac.update(salt);
        mac.update(b"signer");
        Self {
            key: mac.finalize().into_bytes().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.key).expect("HMAC key length is always valid")
    }

    pub fn sign(&self, payload: &[u8]) -> String {
        self.sign_at(payload, now_secs())
    }

    pub fn sign_at(&self, payload: &[u8], timestamp: u64) -> String {
        let value = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode(encode_timestamp(timestamp))
        );
        let mut mac = self.mac();
        mac.update(value.as_bytes());
        let signature = mac.finalize().into_bytes();
        format!("{}.{}", value, URL_SAFE_NO_PAD.encode(signature))
    }

    /// Verify `token` and return its payload if it is at most `max_age`
    /// seconds old.
    pub fn verify(&self, token: &str, max_age: u64) -> Result<Vec<u8>, BadSignature> {
        self.verify_at(token, max_age, now_secs())
    }

    pub fn verify_at(&self, token: &str, max_age: u64, now: u64) -> Result<Vec<u8>, BadSignature> {
        let (value, sig_part) = token
            .rsplit_once('.')
            .ok_or_else(|| BadSignature::new("No \".\" found in value"))?;
        let signature = URL_SAFE_NO_PAD
            .decode(sig_part)
            .map_err(|_| BadSignature::new("Signature is not valid base64"))?;

        let mut mac = self.mac();
        mac.update(value.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| BadSignature::new(format!("Signature {sig_part:?} does not match")))?;

        let (payload_part, ts_part) = value
            .rsplit_once('.')
            .ok_or_else(|| BadSignature::new("Timestamp missing"))?;
        let payload = URL_SAFE_NO_PAD
            .decode(payload_part)
            .map_err(|_| BadSignature::new("Payload is not valid base64"))?;
        let timestamp = URL_SAFE_NO_PAD
            .decode(ts_part)
            .ok()
            .and_then(|bytes| decode_timestamp(&bytes))
            .ok_or_else(|| BadSignature {
                reason: "Malformed timestamp".into(),
                payload: Some(String::from_utf8_lossy(&payload).into_owned()),
            })?;

        let age = now as i128 - timestamp as i128;
        if age < 0 || age > max_age as i128 {
            let reason = if age < 0 {
                format!("Signature age {age} < 0")
            } else {
                format!("Signature age {age} > {max_age} seconds")
            };
            return Err(BadSignature {
                reason,
                payload: Some(String::from_utf8_lossy(&payload).into_owned()),
            });
        }

        Ok(payload)
    }
}

/// Big-endian with leading zero bytes stripped.
fn encode_timestamp(timestamp: u64) -> Vec<u8> {
    let bytes = timestamp.to_be_bytes();
    let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
    bytes[first..].to_vec()
}

fn decode_timestamp(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 8 {
        return None;
    }
    Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

/// Session interface that keeps the entire session in a signed cookie.
pub struct CookieSessionInterface {
    settings: CookieSettings,
    signer: TimedSigner,
}

impl CookieSessionInterface {
    /// Requires `SESSION_COOKIE_SECRET_KEY` (or `SECRET_KEY`) and
    /// `SESSION_COOKIE_SALT`.
    pub fn init(config: &mut HostConfig, host_version: &str) -> Result<Self, ConfigError> {
        let secret = config
            .get_str(SESSION_COOKIE_SECRET_KEY)
            .or_else(|| config.get_str(SECRET_KEY))
            .map(String::from)
            .ok_or(ConfigError::MissingSecret)?;
        let salt = config
            .get_str(SESSION_COOKIE_SALT)
            .map(String::from)
            .ok_or(ConfigError::MissingSalt)?;

        let settings = CookieSettings::from_config(config, host_version)?;
        Ok(Self {
            settings,
            signer: TimedSigner::new(secret.as_bytes(), salt.as_bytes()),
        })
    }

    pub fn signer(&self) -> &TimedSigner {
        &self.signer
    }

    fn load(&self, token: &str) -> Result<HashMap<String, Value>, BadSignature> {
        let payload = self.signer.verify(token, self.settings.expiry)?;
        serde_json::from_slice(&payload).map_err(|e| BadSignature {
            reason: format!("Payload is not a JSON object: {e}"),
            payload: Some(String::from_utf8_lossy(&payload).into_owned()),
        })
    }
}

impl SessionInterface for CookieSessionInterface {
    fn settings(&self) -> &CookieSettings {
        &self.settings
    }

    async fn open(&self, request: &mut SessionRequest) -> Result<SessionHandle, SessionError> {
        if let Some(existing) = request.get(&self.settings.session_name) {
            return Ok(existing.clone());
        }

        let session = match request.cookie(&self.settings.cookie_name) {
            Some(token) if !token.is_empty() => match self.load(token) {
                Ok(data) => Session::with_data(data, None),
                Err(e) => {
                    tracing::warn!(payload = ?e.payload, "Rejected session cookie: {}", e);
                    Session::new()
                }
            },
            _ => Session::new(),
        };

        let handle = SessionHandle::new(session);
        request.set(&self.settings.session_name, handle.clone());
        Ok(handle)
    }

    async fn save(
        &self,
        request: &SessionRequest,
        response: &mut SessionResponse,
    ) -> Result<(), SessionError> {
        let payload = match request.get(&self.settings.session_name) {
            Some(handle) => serde_json::to_vec(&*handle.lock().await)?,
            None => serde_json::to_vec(&Session::new())?,
        };

        let token = self.signer.sign(&payload);
        if token.len() > MAX_COOKIE_SIZE {
            tracing::warn!(
                size = token.len(),
                "session cookie exceeds {} bytes and may be dropped by the browser",
                MAX_COOKIE_SIZE
            );
        }
        self.settings.set_cookie_attributes(response, token);
        Ok(())
    }
}
