//! API shared state

use crate::hub::Hub;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Hub serving the event stream, queried for diagnostics
    pub hub: Hub,
}

impl ApiState {
    pub fn new(hub: Hub) -> Self {
        Self { hub }
    }
}
