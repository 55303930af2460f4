//! Error types for the monitoring pipeline
//!
//! Every error here is recovered locally by the component that produces it:
//! provider and subscription errors become host reachability events, notifier
//! errors are logged per backend and transport errors only drop one client.

use std::time::Duration;

use thiserror::Error;

/// A single observation attempt against a provider failed
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The backend could not be reached (connection refused, DNS, TLS, ...)
    #[error("connection failed: {0}")]
    Connection(String),

    /// The call did not complete within the configured timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with a non-success status
    #[error("unexpected status code: {0}")]
    Status(u16),

    /// The backend answered, but the response could not be understood
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The backend is permanently unavailable on this host (e.g. no process manager)
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl ProviderError {
    /// Whether retrying can ever succeed
    pub fn is_permanent(&self) -> bool {
        matches!(self, ProviderError::Unavailable(_))
    }
}

/// A native push channel failed to open or closed unexpectedly
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SubscriptionError {
    /// The provider has no push capability
    #[error("native subscriptions are not supported by this provider")]
    Unsupported,

    /// Opening the subscription failed
    #[error("failed to open subscription: {0}")]
    Open(#[from] ProviderError),

    /// An open subscription was closed or broke mid-stream
    #[error("subscription closed: {0}")]
    Closed(String),
}

/// A notification backend failed to deliver or shut down
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotifierError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("backend responded with status {0}")]
    Status(u16),

    #[error("notifier closed")]
    Closed,
}

/// A client connection of the WebSocket hub failed
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("write timed out")]
    WriteTimeout,

    #[error("connection closed")]
    Closed,

    #[error("websocket error: {0}")]
    WebSocket(#[from] axum::Error),

    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Lifecycle misuse of a [`Monitor`](crate::monitor::Monitor)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MonitorError {
    #[error("monitor is already running")]
    AlreadyStarted,

    #[error("monitor was stopped, construct a new one")]
    Stopped,
}

/// Invalid configuration detected at startup
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("host name must not be empty")]
    EmptyHostName,

    #[error("host `{0}` is configured more than once")]
    DuplicateHost(String),

    #[error("host `{host}` has an invalid url: {reason}")]
    InvalidUrl { host: String, reason: String },

    #[error("poll interval must be greater than zero")]
    ZeroPollInterval,
}
