//! Settings and cookie handling shared by every session interface.

use chrono::{DateTime, TimeDelta, Utc};

use super::domain::{get_cookie_domain, get_cookie_path};
use super::jar::{CookieExpires, SessionResponse};
use crate::config::{
    HostConfig, SESSION_COOKIE_HTTPONLY, SESSION_COOKIE_MAX_AGE, SESSION_COOKIE_NAME,
    SESSION_COOKIE_SECURE, SESSION_NAME,
};
use crate::error::ConfigError;

pub const DEFAULT_COOKIE_NAME: &str = "session";
pub const DEFAULT_SESSION_NAME: &str = "session";
pub const DEFAULT_MAX_AGE_SECS: u64 = 86400;

/// Host major versions above this take `Expires` as a date.
const DATE_OBJECT_MIN_VERSION: u64 = 18;

/// How the host expects the `Expires` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// A date value the host formats itself.
    Timestamp,
    /// A preformatted `Dow, DD-Mon-YYYY HH:MM:SS GMT` string.
    Rfc1123,
}

/// Leading numeric component of a host version string (`"19.12.2"` -> 19).
pub fn parse_major_version(version: &str) -> Option<u64> {
    version.split('.').next()?.trim().parse().ok()
}

pub fn choose_date_format(major_version: Option<u64>) -> DateFormat {
    match major_version {
        Some(major) if major > DATE_OBJECT_MIN_VERSION => DateFormat::Timestamp,
        _ => DateFormat::Rfc1123,
    }
}

/// `now` plus `secs`, or `None` past the representable date range.
fn expires_after(now: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let delta = TimeDelta::try_seconds(i64::try_from(secs).ok()?)?;
    now.checked_add_signed(delta)
}

/// Cookie settings resolved from host configuration at init.
#[derive(Debug, Clone)]
pub struct CookieSettings {
    pub cookie_name: String,
    pub session_name: String,
    pub domain: Option<String>,
    pub path: String,
    pub http_only: bool,
    pub secure: bool,
    /// Seconds; always positive.
    pub expiry: u64,
    pub date_format: DateFormat,
}

impl CookieSettings {
    /// Read the recognized options from `config`, writing defaults back.
    pub fn from_config(config: &mut HostConfig, host_version: &str) -> Result<Self, ConfigError> {
        let cookie_name = config.setdefault_str(SESSION_COOKIE_NAME, DEFAULT_COOKIE_NAME)?;
        let domain = get_cookie_domain(config);
        let path = get_cookie_path(config);
        let http_only = config.setdefault_bool(SESSION_COOKIE_HTTPONLY, true)?;
        let expiry = config.setdefault_u64(SESSION_COOKIE_MAX_AGE, DEFAULT_MAX_AGE_SECS)?;
        let secure = config.setdefault_bool(SESSION_COOKIE_SECURE, false)?;
        let session_name = config.setdefault_str(SESSION_NAME, DEFAULT_SESSION_NAME)?;

        if expiry == 0 {
            return Err(ConfigError::InvalidValue {
                key: SESSION_COOKIE_MAX_AGE.into(),
                reason: "must be positive".into(),
            });
        }
        if expires_after(Utc::now(), expiry).is_none() {
            return Err(ConfigError::InvalidValue {
                key: SESSION_COOKIE_MAX_AGE.into(),
                reason: "expiry date out of range".into(),
            });
        }

        let date_format = choose_date_format(parse_major_version(host_version));
        tracing::debug!(
            cookie_name = %cookie_name,
            domain = ?domain,
            ?date_format,
            "session cookie settings resolved"
        );

        Ok(Self {
            cookie_name,
            session_name,
            domain,
            path,
            http_only,
            secure,
            expiry,
            date_format,
        })
    }

    pub fn get_cookie_expires(&self) -> CookieExpires {
        self.cookie_expires_at(Utc::now())
    }

    pub fn cookie_expires_at(&self, now: DateTime<Utc>) -> CookieExpires {
        let expires = expires_after(now, self.expiry).unwrap_or(DateTime::<Utc>::MAX_UTC);
        match self.date_format {
            DateFormat::Timestamp => CookieExpires::At(expires),
            DateFormat::Rfc1123 => {
                CookieExpires::Formatted(expires.format("%a, %d-%b-%Y %H:%M:%S GMT").to_string())
            }
        }
    }

    /// Write the session cookie with `value` and the configured attributes.
    pub fn set_cookie_attributes(&self, response: &mut SessionResponse, value: impl Into<String>) {
        let expires = self.get_cookie_expires();
        let cookie = response.set(&self.cookie_name, value);
        cookie.expires = Some(expires);
        cookie.max_age = Some(self.expiry);
        cookie.http_only = self.http_only;
        cookie.path = Some(self.path.clone());
        if self.secure {
            cookie.secure = true;
        }
        if let Some(domain) = &self.domain {
            cookie.domain = Some(domain.clone());
        }
    }

    /// Overwrite the session cookie with an already-expired empty one.
    pub fn delete_cookie(&self, response: &mut SessionResponse) {
        let cookie = response.set(&self.cookie_name, "");
        cookie.expires = Some(CookieExpires::At(Utc::now()));
        cookie.max_age = Some(0);
        cookie.http_only = self.http_only;
        cookie.path = Some(self.path.clone());
        cookie.secure = self.secure;
        cookie.domain = self.domain.clone();
    }
}
