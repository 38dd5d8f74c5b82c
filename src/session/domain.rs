//! Cookie domain and path resolution.
//!
//! The domain comes from `SESSION_COOKIE_DOMAIN` when set, otherwise it is
//! derived from `SERVER_NAME`. The result is written back into the config
//! (`false` when scoping is disabled) so later interfaces reuse it.

use serde_json::Value;
use std::net::IpAddr;

use crate::config::{
    APPLICATION_ROOT, HostConfig, SERVER_NAME, SESSION_COOKIE_DOMAIN, SESSION_COOKIE_PATH,
};

/// Non-fatal cookie domain misconfiguration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CookieDomainWarning {
    #[error(
        "\"{0}\" is not a valid cookie domain, it must contain a \".\". Add an entry to your \
         hosts file, for example \"{0}.localdomain\", and use that instead."
    )]
    MissingDot(String),

    #[error(
        "The session cookie domain is an IP address. This may not work as intended in some \
         browsers. Add an entry to your hosts file, for example \"localhost.localdomain\", \
         and use that instead."
    )]
    IpAddress(String),

    #[error("SESSION_COOKIE_DOMAIN must be a string, found {0}")]
    NotAString(String),
}

/// Outcome of deriving a domain from a server name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainResolution {
    pub domain: Option<String>,
    pub warning: Option<CookieDomainWarning>,
}

pub fn is_ip(value: &str) -> bool {
    value.parse::<IpAddr>().is_ok()
}

/// Derive the cookie domain for `server_name` served under `cookie_path`.
///
/// Pure; the caller logs the warning and caches the domain.
pub fn derive_cookie_domain(server_name: &str, cookie_path: &str) -> DomainResolution {
    let host = server_name
        .rsplit_once(':')
        .map_or(server_name, |(host, _port)| host)
        .trim_start_matches('.');

    if !host.contains('.') {
        return DomainResolution {
            domain: None,
            warning: Some(CookieDomainWarning::MissingDot(host.to_string())),
        };
    }

    let ip = is_ip(host);
    let warning = ip.then(|| CookieDomainWarning::IpAddress(host.to_string()));

    // Root-mounted apps on a hostname get subdomain matching
    let domain = if cookie_path == "/" && !ip {
        format!(".{host}")
    } else {
        host.to_string()
    };

    DomainResolution {
        domain: Some(domain),
        warning,
    }
}

/// Effective cookie domain for `config`, computed once and cached in it.
pub fn get_cookie_domain(config: &mut HostConfig) -> Option<String> {
    match config.get(SESSION_COOKIE_DOMAIN) {
        None | Some(Value::Null) => {}
        Some(Value::String(s)) => return (!s.is_empty()).then(|| s.clone()),
        Some(Value::Bool(false)) => return None,
        Some(other) => {
            let warning = CookieDomainWarning::NotAString(other.to_string());
            tracing::warn!("{}", warning);
            return None;
        }
    }

    let Some(server_name) = config.get_str(SERVER_NAME).map(String::from) else {
        config.set(SESSION_COOKIE_DOMAIN, false);
        return None;
    };

    let resolution = derive_cookie_domain(&server_name, &get_cookie_path(config));
    if let Some(warning) = &resolution.warning {
        tracing::warn!("{}", warning);
    }

    match &resolution.domain {
        Some(domain) => config.set(SESSION_COOKIE_DOMAIN, domain.as_str()),
        None => config.set(SESSION_COOKIE_DOMAIN, false),
    }
    resolution.domain
}

/// Path the cookie is valid for: `SESSION_COOKIE_PATH`, else
/// `APPLICATION_ROOT`, else `/`.
pub fn get_cookie_path(config: &HostConfig) -> String {
    config
        .get_str(SESSION_COOKIE_PATH)
        .or_else(|| config.get_str(APPLICATION_ROOT))
        .unwrap_or("/")
        .to_string()
}
