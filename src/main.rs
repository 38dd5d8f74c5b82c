//! Demo server: session middleware over a handful of routes.
//!
//! Session settings come from the environment (and `.env`); see
//! `HostConfig::from_env` for the recognized keys.

use std::env;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

use l42_sessions::config::HostConfig;
use l42_sessions::session::AnyInterface;
use l42_sessions::session::middleware::SessionLayer;
use l42_sessions::{AppState, create_app};

/// Cookie-date convention of the host; axum takes preformatted dates.
const DEFAULT_HOST_VERSION: &str = "0.8";

#[tokio::main]
async fn main() {
    // Load .env for local dev
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env::var("LOG_FORMAT").is_ok_and(|v| v == "json") {
        fmt().json().with_env_filter(filter).init();
    } else {
        fmt().with_env_filter(filter).init();
    }

    let mut config = HostConfig::from_env();
    let host_version = env::var("HOST_VERSION").unwrap_or_else(|_| DEFAULT_HOST_VERSION.into());
    let interface = AnyInterface::init(&mut config, &host_version)
        .await
        .expect("Failed to initialize session interface");

    let state = Arc::new(AppState {
        session_layer: Arc::new(SessionLayer::new(interface)),
    });

    let app = create_app(state);

    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3001);
    let addr = format!("0.0.0.0:{}", port);
    tracing::info!("Starting local server on {}", addr);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");
    axum::serve(listener, app).await.expect("Server error");
}
