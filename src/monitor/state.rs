//! Last-known state and reconciliation
//!
//! ## Service state machine
//!
//! ```text
//! last == Unknown && skip_first_event → store, no event
//! last != observed                    → store, ServiceStateChanged{last, observed}
//! last == observed                    → no-op
//! observed == Unknown                 → ignored
//! ```
//!
//! ## Host state machine
//!
//! ```text
//!              failure                    success
//! Unknown     → Unreachable (event)      → Reachable (silent)
//! Reachable   → Unreachable (event)      → no-op
//! Unreachable → no-op                    → Reachable (HostRecovered)
//! ```
//!
//! Both tables live behind a single lock. Each call performs its
//! read-modify-write atomically and returns the event to publish, so the
//! caller never publishes while holding the lock.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::events::{Event, LifecycleState};

use super::provider::Observation;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ServiceKey {
    host: String,
    service_name: String,
    source: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Reachability {
    #[default]
    Unknown,
    Reachable,
    Unreachable,
}

#[derive(Debug, Default)]
struct HostState {
    reachability: Reachability,
    last_failure: Option<String>,
}

#[derive(Debug, Default)]
struct Tables {
    services: HashMap<ServiceKey, LifecycleState>,
    hosts: HashMap<String, HostState>,
}

/// Reconciles observations against last-known state
#[derive(Debug)]
pub struct StateTracker {
    skip_first_event: bool,
    tables: Mutex<Tables>,
}

impl StateTracker {
    pub fn new(skip_first_event: bool) -> Self {
        Self {
            skip_first_event,
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Reconcile one service observation, returning the event to publish (if any)
    pub fn observe_service(&self, host: &str, source: &str, observation: &Observation) -> Option<Event> {
        if observation.state == LifecycleState::Unknown {
            trace!(host, service = %observation.service_name, "ignoring unclassified observation");
            return None;
        }

        let key = ServiceKey {
            host: host.to_string(),
            service_name: observation.service_name.clone(),
            source: source.to_string(),
        };

        let mut tables = self.tables.lock();
        let last = tables.services.entry(key).or_default();
        let previous = *last;

        if previous == observation.state {
            return None;
        }
        *last = observation.state;

        if previous == LifecycleState::Unknown && self.skip_first_event {
            trace!(host, service = %observation.service_name, state = %observation.state, "first observation");
            return None;
        }

        Some(Event::service_state_changed(
            host,
            observation.service_name.clone(),
            source,
            previous,
            observation.state,
        ))
    }

    /// Record a successful observation attempt against `host`
    pub fn observe_success(&self, host: &str) -> Option<Event> {
        let mut tables = self.tables.lock();
        let state = tables.hosts.entry(host.to_string()).or_default();

        match state.reachability {
            Reachability::Reachable => None,
            Reachability::Unknown => {
                state.reachability = Reachability::Reachable;
                None
            }
            Reachability::Unreachable => {
                state.reachability = Reachability::Reachable;
                state.last_failure = None;
                Some(Event::host_recovered(host))
            }
        }
    }

    /// Record a failed observation attempt against `host`
    pub fn observe_failure(&self, host: &str, reason: &str) -> Option<Event> {
        let mut tables = self.tables.lock();
        let state = tables.hosts.entry(host.to_string()).or_default();
        let previous_reason = state.last_failure.replace(reason.to_string());

        match state.reachability {
            Reachability::Unreachable => {
                if previous_reason.as_deref() != Some(reason) {
                    debug!(host, reason, "host still unreachable, failure reason changed");
                }
                None
            }
            Reachability::Unknown | Reachability::Reachable => {
                state.reachability = Reachability::Unreachable;
                Some(Event::host_unreachable(host, reason))
            }
        }
    }
}
