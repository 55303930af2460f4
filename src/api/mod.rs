//! HTTP surface of the hub
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check with the number of connected clients
//! - `WS /api/v1/stream` - Real-time event stream (see [`crate::hub`])
//!
//! When a token is configured, every route requires `Authorization: Bearer <token>`.

pub mod middleware;
pub mod routes;
pub mod state;
pub mod types;

pub use state::ApiState;
pub use types::HealthResponse;

use axum::{Router, routing::get};
use std::net::SocketAddr;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Optional authentication token
    pub auth_token: Option<String>,

    /// Enable CORS for browser dashboards served elsewhere
    pub enable_cors: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            auth_token: None,
            enable_cors: true,
        }
    }
}

/// Assemble every route, the hub endpoint and the middleware stack
pub fn router(config: &ApiConfig, state: ApiState) -> Router {
    use tower_http::cors::{Any, CorsLayer};
    use tower_http::trace::TraceLayer;

    let stream = state.hub.handler();

    let mut app = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .with_state(state)
        .route("/api/v1/stream", stream);

    if let Some(token) = config.auth_token.clone() {
        app = app.layer(axum::middleware::from_fn_with_state(
            token,
            middleware::auth::auth_middleware,
        ));
    }

    // outside of auth so preflight requests are answered without credentials
    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app.layer(TraceLayer::new_for_http())
}

/// Bind and serve `app` in a background task until `shutdown` is cancelled
///
/// Returns the server's local address.
pub async fn spawn_api_server(
    bind_addr: SocketAddr,
    app: Router,
    shutdown: CancellationToken,
) -> anyhow::Result<SocketAddr> {
    info!("starting API server on {}", bind_addr);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
        {
            tracing::error!("API server error: {}", e);
        }
    });

    Ok(addr)
}
