//! L42 Sessions — pluggable server-side session management for axum.
//!
//! A session interface opens a per-client key-value session before each
//! handler and saves it afterwards, with the session kept either in a signed
//! cookie or in a server-side store keyed by a cookie-held id.

pub mod config;
pub mod error;
pub mod routes;
pub mod session;
pub mod types;

use axum::Router;
use axum::middleware::from_fn;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::session::AnyInterface;
use crate::session::middleware::{SessionLayer, session_middleware};

/// Shared application state available to all route handlers.
pub struct AppState {
    pub session_layer: Arc<SessionLayer<AnyInterface>>,
}

/// Build the Axum router with the session middleware and demo routes.
pub fn create_app(state: Arc<AppState>) -> Router {
    let session_layer = state.session_layer.clone();

    Router::new()
        .route("/health", axum::routing::get(routes::health::health))
        .route(
            "/session",
            axum::routing::get(routes::session::get_session)
                .post(routes::session::update_session),
        )
        .route("/logout", axum::routing::post(routes::logout::logout))
        .layer(from_fn(move |req, next| {
            let layer = session_layer.clone();
            session_middleware(layer, req, next)
        }))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
