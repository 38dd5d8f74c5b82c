//! GET /session, POST /session

use axum::Json;
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::session::{Session, SessionHandle};

fn contents(session: &Session) -> Value {
    Value::Object(
        session
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Map<String, Value>>(),
    )
}

/// Current session contents.
pub async fn get_session(session: SessionHandle) -> Json<Value> {
    let data = session.lock().await;
    Json(contents(&data))
}

/// Merge a JSON object into the session; `null` values remove their key.
pub async fn update_session(
    session: SessionHandle,
    Json(body): Json<Value>,
) -> Result<Json<Value>, AppError> {
    let Value::Object(updates) = body else {
        return Err(AppError::BadRequest("Expected a JSON object".into()));
    };

    let mut data = session.lock().await;
    for (key, value) in updates {
        if value.is_null() {
            data.remove(&key);
        } else {
            data.insert(key, value);
        }
    }

    Ok(Json(contents(&data)))
}
