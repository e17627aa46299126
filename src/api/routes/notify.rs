use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::ApiState;
use crate::api::types::{NotifyRequest, NotifyResponse};
use crate::router::RouterError;

/// POST /api/v1/notify
///
/// Validates the request and dispatches in the background. A 200 only means
/// the dispatch was started.
pub async fn notify(
    State(state): State<ApiState>,
    payload: Result<Json<NotifyRequest>, JsonRejection>,
) -> ApiResult<Json<NotifyResponse>> {
    let Json(NotifyRequest {
        notificator_id,
        message,
    }) = payload?;

    if message.trim().is_empty() {
        return Err(ApiError::InvalidRequest("message must not be empty".into()));
    }

    if !state.router.contains(&notificator_id) {
        return Err(RouterError::NotFound(notificator_id).into());
    }

    info!("notify request for notificator '{}'", notificator_id);

    let router = state.router.clone();
    let id = notificator_id.clone();
    tokio::spawn(async move {
        if let Err(e) = router.dispatch(&id, &message).await {
            warn!("background dispatch failed: {e}");
        }
    });

    Ok(Json(NotifyResponse {
        success: true,
        message: format!("Notification dispatched via notificator '{notificator_id}'"),
        notificator_id,
    }))
}
