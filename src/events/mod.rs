//! Event model shared by the monitor and every consumer
//!
//! Events are immutable values describing "what happened". The monitor is the
//! only producer; the hub and the notifier manager consume them through the
//! [`EventBus`].
//!
//! ## Message Flow
//!
//! ```text
//! Providers → Monitor (reconcile) → EventBus → [Hub, NotifierManager, ...]
//! ```

pub mod bus;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use bus::{DispatchMode, EventBus, Subscription};

/// Lifecycle state of a single service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Nothing has been observed yet
    #[default]
    Unknown,
    Running,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            LifecycleState::Unknown => "unknown",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(text)
    }
}

/// Discriminator used to subscribe to a subset of events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ServiceStateChanged,
    HostUnreachable,
    HostRecovered,
}

impl EventKind {
    /// Every kind the bus knows about
    pub const ALL: [EventKind; 3] = [
        EventKind::ServiceStateChanged,
        EventKind::HostUnreachable,
        EventKind::HostRecovered,
    ];
}

/// A service changed its lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceStateChanged {
    pub host: String,
    pub service_name: String,
    /// Provider the observation came from (e.g. "agent", "docker")
    pub source: String,
    pub old_state: LifecycleState,
    pub new_state: LifecycleState,
    pub timestamp: DateTime<Utc>,
}

/// A host stopped answering observation attempts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostUnreachable {
    pub host: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// A previously unreachable host answered again
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecovered {
    pub host: String,
    pub timestamp: DateTime<Utc>,
}

/// Everything the monitor can report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    ServiceStateChanged(ServiceStateChanged),
    HostUnreachable(HostUnreachable),
    HostRecovered(HostRecovered),
}

impl Event {
    pub fn service_state_changed(
        host: impl Into<String>,
        service_name: impl Into<String>,
        source: impl Into<String>,
        old_state: LifecycleState,
        new_state: LifecycleState,
    ) -> Self {
        Event::ServiceStateChanged(ServiceStateChanged {
            host: host.into(),
            service_name: service_name.into(),
            source: source.into(),
            old_state,
            new_state,
            timestamp: Utc::now(),
        })
    }

    pub fn host_unreachable(host: impl Into<String>, reason: impl Into<String>) -> Self {
        Event::HostUnreachable(HostUnreachable {
            host: host.into(),
            reason: reason.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn host_recovered(host: impl Into<String>) -> Self {
        Event::HostRecovered(HostRecovered {
            host: host.into(),
            timestamp: Utc::now(),
        })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Event::ServiceStateChanged(_) => EventKind::ServiceStateChanged,
            Event::HostUnreachable(_) => EventKind::HostUnreachable,
            Event::HostRecovered(_) => EventKind::HostRecovered,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Event::ServiceStateChanged(e) => e.timestamp,
            Event::HostUnreachable(e) => e.timestamp,
            Event::HostRecovered(e) => e.timestamp,
        }
    }

    /// Host the event refers to
    pub fn host(&self) -> &str {
        match self {
            Event::ServiceStateChanged(e) => &e.host,
            Event::HostUnreachable(e) => &e.host,
            Event::HostRecovered(e) => &e.host,
        }
    }

    /// One-line human readable summary, used by log output and notifiers
    pub fn summary(&self) -> String {
        match self {
            Event::ServiceStateChanged(e) => format!(
                "{} on {} ({}) changed from {} to {}",
                e.service_name, e.host, e.source, e.old_state, e.new_state
            ),
            Event::HostUnreachable(e) => format!("host unreachable: {} ({})", e.host, e.reason),
            Event::HostRecovered(e) => format!("host recovered: {}", e.host),
        }
    }
}
