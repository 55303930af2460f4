//! Health check endpoint

use crate::api::{state::ApiState, types::HealthResponse};
use axum::{Json, extract::State};

/// GET /api/v1/health
///
/// Returns a simple health check response
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        clients: state.hub.client_count(),
    })
}
