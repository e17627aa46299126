use axum::Json;
use axum::extract::State;

use crate::api::state::ApiState;
use crate::api::types::NotificatorsResponse;

/// GET /api/v1/notificators
pub async fn list_notificators(State(state): State<ApiState>) -> Json<NotificatorsResponse> {
    let notificators = state.router.ids();

    Json(NotificatorsResponse {
        count: notificators.len(),
        notificators,
    })
}
