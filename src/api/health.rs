use crate::api::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once the reconciliation loop is running.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    if state.driver.is_running() {
        let tracked = state.reconciler.snapshot().len();
        (
            StatusCode::OK,
            Json(serde_json::json!({"status": "ready", "tracked": tracked})),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({"status": "stopped"})),
        )
    }
}
