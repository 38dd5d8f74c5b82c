//! Host configuration source.
//!
//! A string-keyed map read by the session interfaces at init time only.
//! Values are JSON values so a key can carry a string, a flag, a number,
//! or the `false` sentinel the cookie-domain resolver caches.

use serde_json::Value;
use std::collections::HashMap;
use std::env;

use crate::error::ConfigError;

pub const SESSION_BACKEND: &str = "SESSION_BACKEND";
pub const SESSION_COOKIE_NAME: &str = "SESSION_COOKIE_NAME";
pub const SESSION_COOKIE_HTTPONLY: &str = "SESSION_COOKIE_HTTPONLY";
pub const SESSION_COOKIE_MAX_AGE: &str = "SESSION_COOKIE_MAX_AGE";
pub const SESSION_COOKIE_SECURE: &str = "SESSION_COOKIE_SECURE";
pub const SESSION_NAME: &str = "SESSION_NAME";
pub const SESSION_COOKIE_DOMAIN: &str = "SESSION_COOKIE_DOMAIN";
pub const SESSION_COOKIE_PATH: &str = "SESSION_COOKIE_PATH";
pub const APPLICATION_ROOT: &str = "APPLICATION_ROOT";
pub const SERVER_NAME: &str = "SERVER_NAME";
pub const SESSION_COOKIE_SECRET_KEY: &str = "SESSION_COOKIE_SECRET_KEY";
pub const SECRET_KEY: &str = "SECRET_KEY";
pub const SESSION_COOKIE_SALT: &str = "SESSION_COOKIE_SALT";
pub const SESSION_REDIS_URI: &str = "SESSION_REDIS_URI";
pub const SESSION_MEMCACHE_URI: &str = "SESSION_MEMCACHE_URI";
pub const SESSION_KEY_PREFIX: &str = "SESSION_KEY_PREFIX";

const BOOL_KEYS: &[&str] = &[SESSION_COOKIE_HTTPONLY, SESSION_COOKIE_SECURE];
const NUMBER_KEYS: &[&str] = &[SESSION_COOKIE_MAX_AGE];
const STRING_KEYS: &[&str] = &[
    SESSION_BACKEND,
    SESSION_COOKIE_NAME,
    SESSION_NAME,
    SESSION_COOKIE_DOMAIN,
    SESSION_COOKIE_PATH,
    APPLICATION_ROOT,
    SERVER_NAME,
    SESSION_COOKIE_SECRET_KEY,
    SECRET_KEY,
    SESSION_COOKIE_SALT,
    SESSION_REDIS_URI,
    SESSION_MEMCACHE_URI,
    SESSION_KEY_PREFIX,
];

/// Configuration mapping with `get` / `setdefault` semantics.
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    values: HashMap<String, Value>,
}

impl HostConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every recognized session key present in the environment.
    ///
    /// Flags accept `true`, `True` or `1`. Numeric keys that fail to parse
    /// are kept as strings so `init` can report them as invalid.
    pub fn from_env() -> Self {
        let mut config = Self::new();
        for key in BOOL_KEYS {
            if let Ok(v) = env::var(key) {
                config.set(key, v == "true" || v == "1" || v == "True");
            }
        }
        for key in NUMBER_KEYS {
            if let Ok(v) = env::var(key) {
                match v.parse::<u64>() {
                    Ok(n) => config.set(key, n),
                    Err(_) => config.set(key, v),
                }
            }
        }
        for key in STRING_KEYS {
            if let Ok(v) = env::var(key) {
                config.set(key, v);
            }
        }
        config
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value of `key`, treating empty strings as unset.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.values.insert(key.to_string(), value.into());
    }

    /// Return the value for `key`, inserting `default` first if absent.
    pub fn setdefault(&mut self, key: &str, default: impl Into<Value>) -> &Value {
        self.values
            .entry(key.to_string())
            .or_insert_with(|| default.into())
    }

    pub fn setdefault_str(&mut self, key: &str, default: &str) -> Result<String, ConfigError> {
        match self.setdefault(key, default) {
            Value::String(s) => Ok(s.clone()),
            other => Err(invalid(key, "a string", other)),
        }
    }

    pub fn setdefault_bool(&mut self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.setdefault(key, default) {
            Value::Bool(b) => Ok(*b),
            other => Err(invalid(key, "a boolean", other)),
        }
    }

    pub fn setdefault_u64(&mut self, key: &str, default: u64) -> Result<u64, ConfigError> {
        let value = self.setdefault(key, default);
        value
            .as_u64()
            .ok_or_else(|| invalid(key, "a non-negative integer", value))
    }

    /// Required string setting; empty counts as missing.
    pub fn required_str(&self, key: &str) -> Result<String, ConfigError> {
        self.get_str(key)
            .map(String::from)
            .ok_or_else(|| ConfigError::MissingSetting(key.to_string()))
    }
}

fn invalid(key: &str, expected: &str, found: &Value) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: format!("expected {expected}, found {found}"),
    }
}
