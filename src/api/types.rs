//! API request and response types

use serde::{Deserialize, Serialize};

use crate::service::ServiceState;

/// Response for GET /api/v1/health
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_state: Option<ServiceState>,
}

/// Response for GET /api/v1/notificators
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificatorsResponse {
    pub notificators: Vec<String>,
    pub count: usize,
}

/// Body of POST /api/v1/notify
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyRequest {
    #[serde(alias = "notificatorId")]
    pub notificator_id: String,
    pub message: String,
}

/// Response for POST /api/v1/notify
///
/// `success` means the dispatch was accepted, not that any sink delivered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyResponse {
    pub success: bool,
    pub message: String,
    pub notificator_id: String,
}
