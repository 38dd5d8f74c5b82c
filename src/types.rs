//! Shared request/response DTOs for the demo routes.

use serde::Serialize;

/// GET /health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub backend: String,
}

/// POST /logout response.
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}
