use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;

use crate::api_state::ApiState;

/// Readiness probe: returns 200 if both stores answer, else 503.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    match state.lifecycle.check_ready().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "checks": { "records": "ok", "documents": "ok" }
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "error",
                "reason": e.to_string()
            })),
        ),
    }
}
