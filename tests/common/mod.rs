//! Test utilities: app builders for each backend and cookie helpers.

#![allow(dead_code)]

use axum::http::HeaderMap;
use l42_sessions::config::{
    HostConfig, SESSION_BACKEND, SESSION_COOKIE_SALT, SESSION_COOKIE_SECRET_KEY,
};
use l42_sessions::session::AnyInterface;
use l42_sessions::session::middleware::SessionLayer;
use l42_sessions::{AppState, create_app};
use std::sync::Arc;

pub const TEST_SECRET: &str = "test-secret-key";
pub const TEST_SALT: &str = "test-salt";

/// Config for the signed-cookie backend.
pub fn cookie_config() -> HostConfig {
    HostConfig::new()
        .with(SESSION_BACKEND, "cookie")
        .with(SESSION_COOKIE_SECRET_KEY, TEST_SECRET)
        .with(SESSION_COOKIE_SALT, TEST_SALT)
}

/// Config for the in-memory server-side backend.
pub fn memory_config() -> HostConfig {
    HostConfig::new().with(SESSION_BACKEND, "memory")
}

/// Build a test app from `config`.
pub async fn build_test_app(mut config: HostConfig) -> (axum::Router, Arc<AppState>) {
    let interface = AnyInterface::init(&mut config, "19.12")
        .await
        .expect("session interface initializes");

    let state = Arc::new(AppState {
        session_layer: Arc::new(SessionLayer::new(interface)),
    });

    let app = create_app(state.clone());
    (app, state)
}

/// All `Set-Cookie` header values on a response.
pub fn set_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all("set-cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .map(String::from)
        .collect()
}

/// `name=value` pair of the session cookie, suitable for a `Cookie` header.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    set_cookies(headers)
        .into_iter()
        .find(|c| c.starts_with("session="))
        .and_then(|c| c.split(';').next().map(String::from))
}
