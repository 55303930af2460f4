//! Capability set the monitor consumes from service backends
//!
//! A provider knows how to list the current state of every service on a host
//! and, optionally, how to open a native push channel. Concrete providers are
//! chosen by the bootstrap layer; the monitor only sees this trait.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::{ProviderError, SubscriptionError};
use crate::events::LifecycleState;

/// One reading of a service's current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub service_name: String,
    pub state: LifecycleState,
    /// Free-form status reported by the backend (e.g. "Up 3 hours")
    pub status_text: String,
}

impl Observation {
    pub fn new(service_name: impl Into<String>, state: LifecycleState) -> Self {
        Self {
            service_name: service_name.into(),
            state,
            status_text: String::new(),
        }
    }

    pub fn with_status(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
        self
    }
}

/// Stream of native notifications; dropping it closes the subscription
pub type NativeStream = BoxStream<'static, Result<Observation, SubscriptionError>>;

#[async_trait]
pub trait ServiceProvider: Send + Sync {
    /// Name recorded as the `source` of every event from this provider
    fn source(&self) -> &str;

    /// Query the current state of every service on `host`
    async fn list_observations(&self, host: &str) -> Result<Vec<Observation>, ProviderError>;

    /// Whether [`ServiceProvider::subscribe_native`] is implemented
    fn supports_push(&self) -> bool {
        false
    }

    /// Open a push channel delivering one observation per lifecycle transition
    async fn subscribe_native(&self, _host: &str) -> Result<NativeStream, SubscriptionError> {
        Err(SubscriptionError::Unsupported)
    }
}
