//! Host-neutral request and response views used by the session interfaces.
//!
//! `SessionRequest` carries the incoming cookies and an attribute bag the
//! session is attached to. `SessionResponse` is the outgoing cookie jar; the
//! middleware renders it into `Set-Cookie` headers.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

use super::SessionHandle;

/// Incoming request state: cookies plus named session attributes.
#[derive(Default)]
pub struct SessionRequest {
    cookies: HashMap<String, String>,
    attributes: HashMap<String, SessionHandle>,
}

impl SessionRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a raw `Cookie` header value.
    pub fn from_cookie_header(header: &str) -> Self {
        let mut request = Self::new();
        for part in header.split(';') {
            if let Some((name, value)) = part.trim().split_once('=') {
                // First occurrence wins, as browsers send the most specific first
                request
                    .cookies
                    .entry(name.to_string())
                    .or_insert_with(|| value.to_string());
            }
        }
        request
    }

    pub fn with_cookie(mut self, name: &str, value: &str) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&SessionHandle> {
        self.attributes.get(name)
    }

    pub fn set(&mut self, name: &str, session: SessionHandle) {
        self.attributes.insert(name.into(), session);
    }
}

/// Value of a cookie's `Expires` attribute.
///
/// Newer hosts take a date and format it themselves; older ones expect a
/// preformatted string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CookieExpires {
    At(DateTime<Utc>),
    Formatted(String),
}

impl CookieExpires {
    fn render(&self) -> String {
        match self {
            CookieExpires::At(at) => at.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            CookieExpires::Formatted(s) => s.clone(),
        }
    }
}

/// One outgoing cookie and its attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseCookie {
    pub value: String,
    pub expires: Option<CookieExpires>,
    pub max_age: Option<u64>,
    pub http_only: bool,
    pub secure: bool,
    pub domain: Option<String>,
    pub path: Option<String>,
}

impl ResponseCookie {
    /// Render as a `Set-Cookie` header value.
    pub fn to_header(&self, name: &str) -> String {
        let mut parts = vec![format!("{}={}", name, self.value)];
        if let Some(expires) = &self.expires {
            parts.push(format!("Expires={}", expires.render()));
        }
        if let Some(max_age) = self.max_age {
            parts.push(format!("Max-Age={max_age}"));
        }
        if let Some(domain) = &self.domain {
            parts.push(format!("Domain={domain}"));
        }
        if let Some(path) = &self.path {
            parts.push(format!("Path={path}"));
        }
        if self.http_only {
            parts.push("HttpOnly".into());
        }
        if self.secure {
            parts.push("Secure".into());
        }
        parts.join("; ")
    }
}

/// Outgoing cookie jar.
#[derive(Debug, Default)]
pub struct SessionResponse {
    cookies: BTreeMap<String, ResponseCookie>,
}

impl SessionResponse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cookie `name` with a bare `value`, returning it for
    /// attribute assignment.
    pub fn set(&mut self, name: &str, value: impl Into<String>) -> &mut ResponseCookie {
        let cookie = self.cookies.entry(name.to_string()).or_default();
        *cookie = ResponseCookie {
            value: value.into(),
            ..ResponseCookie::default()
        };
        cookie
    }

    pub fn get(&self, name: &str) -> Option<&ResponseCookie> {
        self.cookies.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub fn set_cookie_headers(&self) -> Vec<String> {
        self.cookies
            .iter()
            .map(|(name, cookie)| cookie.to_header(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_cookie_found() {
        let request = SessionRequest::from_cookie_header("session=abc123; other=xyz");
        assert_eq!(request.cookie("session"), Some("abc123"));
        assert_eq!(request.cookie("other"), Some("xyz"));
    }

    #[test]
    fn test_parse_cookie_not_found() {
        let request = SessionRequest::from_cookie_header("other=xyz");
        assert_eq!(request.cookie("session"), None);
    }

    #[test]
    fn test_parse_cookie_empty() {
        let request = SessionRequest::from_cookie_header("");
        assert_eq!(request.cookie("session"), None);
    }

    #[test]
    fn test_parse_cookie_value_with_equals() {
        let request = SessionRequest::from_cookie_header("session=a=b.c");
        assert_eq!(request.cookie("session"), Some("a=b.c"));
    }

    #[test]
    fn test_set_replaces_previous_attributes() {
        let mut response = SessionResponse::new();
        response.set("session", "one").secure = true;
        response.set("session", "two");

        let cookie = response.get("session").unwrap();
        assert_eq!(cookie.value, "two");
        assert!(!cookie.secure);
    }

    #[test]
    fn test_header_rendering() {
        let at = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let cookie = ResponseCookie {
            value: "v".into(),
            expires: Some(CookieExpires::At(at)),
            max_age: Some(60),
            http_only: true,
            secure: true,
            domain: Some(".example.com".into()),
            path: Some("/".into()),
        };
        assert_eq!(
            cookie.to_header("session"),
            "session=v; Expires=Fri, 02 Jan 2026 03:04:05 GMT; Max-Age=60; \
             Domain=.example.com; Path=/; HttpOnly; Secure"
        );
    }

    #[test]
    fn test_header_rendering_minimal() {
        let mut response = SessionResponse::new();
        response.set("session", "");
        assert_eq!(response.set_cookie_headers(), vec!["session=".to_string()]);
    }
}
