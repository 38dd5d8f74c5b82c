//! POST /logout

use axum::Json;

use crate::session::SessionHandle;
use crate::types::SuccessResponse;

/// Empty the session. Server-side backends delete the stored entry and clear
/// the cookie when the middleware saves it.
pub async fn logout(session: SessionHandle) -> Json<SuccessResponse> {
    let mut data = session.lock().await;
    let had_data = !data.is_empty();
    data.clear();
    tracing::info!(had_data, "Session cleared");

    Json(SuccessResponse { success: true })
}
