//! API shared state

use std::sync::Arc;

use tokio::sync::watch;

use crate::router::Router;
use crate::service::ServiceState;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Notificator map, shared read-only with the poller
    pub router: Arc<Router>,

    /// Lifecycle state of the alert service, if one is running
    pub service_state: Option<watch::Receiver<ServiceState>>,
}

impl ApiState {
    pub fn new(router: Arc<Router>) -> Self {
        Self {
            router,
            service_state: None,
        }
    }

    pub fn with_service_state(mut self, state: watch::Receiver<ServiceState>) -> Self {
        self.service_state = Some(state);
        self
    }
}
