//! Axum session middleware.
//!
//! Opens the session from the request cookies before the handler runs,
//! exposes it to handlers as a `SessionHandle` extension, and saves it after
//! the handler returns, appending the resulting `Set-Cookie` headers.

use axum::extract::{FromRequestParts, Request};
use axum::http::header;
use axum::http::request::Parts;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

use super::jar::{SessionRequest, SessionResponse};
use super::{SessionHandle, SessionInterface};
use crate::error::AppError;

/// Extract SessionHandle from request extensions (put there by session middleware).
impl<S> FromRequestParts<S> for SessionHandle
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionHandle>()
            .cloned()
            .ok_or(AppError::Internal("Session middleware not configured".into()))
    }
}

/// Session middleware configuration.
pub struct SessionLayer<I: SessionInterface> {
    pub interface: I,
}

impl<I: SessionInterface> SessionLayer<I> {
    pub fn new(interface: I) -> Self {
        Self { interface }
    }
}

/// Axum middleware function for session handling.
///
/// A backend failure in `open` answers 503 without running the handler; a
/// failure in `save` replaces the handler's response with 503.
pub async fn session_middleware<I: SessionInterface + 'static>(
    layer: Arc<SessionLayer<I>>,
    mut req: Request,
    next: Next,
) -> Response {
    let cookie_header = req
        .headers()
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ");

    let mut session_req = SessionRequest::from_cookie_header(&cookie_header);
    let handle = match layer.interface.open(&mut session_req).await {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!("Failed to open session: {}", e);
            return AppError::from(e).into_response();
        }
    };
    req.extensions_mut().insert(handle);

    // Run the route handler
    let mut response = next.run(req).await;

    let mut session_resp = SessionResponse::new();
    if let Err(e) = layer.interface.save(&session_req, &mut session_resp).await {
        tracing::error!("Failed to save session: {}", e);
        return AppError::from(e).into_response();
    }

    for cookie in session_resp.set_cookie_headers() {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
            Err(e) => tracing::error!("Dropping unencodable session cookie: {}", e),
        }
    }

    response
}
