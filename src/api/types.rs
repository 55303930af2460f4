//! API response types

use serde::{Deserialize, Serialize};

/// Response of `GET /api/v1/health`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    /// Number of WebSocket clients currently connected
    pub clients: usize,
}
