//! Notify-now HTTP API
//!
//! Lets other systems push an ad-hoc message through a notificator without going
//! through the search index. Handlers only read the shared [`crate::router::Router`];
//! they never touch the poller's state.
//!
//! ## Architecture
//!
//! - **Axum** web framework with Tower middleware
//! - Optional bearer token auth and CORS
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check (with service state when known)
//! - `GET /api/v1/notificators` - Known notificator ids and their count
//! - `POST /api/v1/notify` - Dispatch `{notificator_id, message}` in the background

#[cfg(feature = "api")]
pub mod error;
#[cfg(feature = "api")]
pub mod middleware;
#[cfg(feature = "api")]
pub mod routes;
#[cfg(feature = "api")]
pub mod state;
#[cfg(feature = "api")]
pub mod types;

#[cfg(feature = "api")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "api")]
pub use state::ApiState;
#[cfg(feature = "api")]
pub use types::{HealthResponse, NotificatorsResponse, NotifyRequest, NotifyResponse};

#[cfg(feature = "api")]
use std::net::SocketAddr;

#[cfg(feature = "api")]
use crate::config::ApiSettings;

/// Build the API router with all routes and layers
#[cfg(feature = "api")]
pub fn build_app(config: &ApiSettings, state: ApiState) -> axum::Router {
    use axum::routing::{get, post};
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let mut app = axum::Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route(
            "/api/v1/notificators",
            get(routes::notificators::list_notificators),
        )
        .route("/api/v1/notify", post(routes::notify::notify))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    if let Some(token) = config.auth_token.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    // cors wraps auth: preflight requests carry no token
    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// This starts an Axum HTTP server in a background task.
/// Returns the server's local address.
#[cfg(feature = "api")]
pub async fn spawn_api_server(config: ApiSettings, state: ApiState) -> anyhow::Result<SocketAddr> {
    use anyhow::Context;
    use tracing::info;

    info!("starting API server on {}", config.bind_addr);

    let app = build_app(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {}", config.bind_addr))?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
