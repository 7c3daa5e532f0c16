use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::AppState;

#[axum::debug_handler]
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    state.sessions.prune().await;
    let body = json!({
        "status": "ok",
        "sessions": state.sessions.len().await,
        "channels": state.realtime.active_channels().len(),
    });
    (StatusCode::OK, Json(body))
}
