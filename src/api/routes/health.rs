//! Health check endpoint

use axum::Json;
use axum::extract::State;

use crate::api::state::ApiState;
use crate::api::types::HealthResponse;

/// GET /api/v1/health
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        service_state: state.service_state.as_ref().map(|rx| *rx.borrow()),
    })
}
