//! Typed publish/subscribe router for [`Event`]s
//!
//! Handlers register for one [`EventKind`] (or all of them) and receive a clone
//! of every event of that kind published afterwards. There is no replay: a
//! handler only sees events published while it is registered.
//!
//! ## Dispatch modes
//!
//! - [`DispatchMode::Sync`]: handlers run on the publisher's task, in
//!   subscription order, before [`EventBus::publish`] returns. A slow handler
//!   delays the publisher and every handler after it.
//! - [`DispatchMode::Async`]: every handler invocation is spawned as its own
//!   task and `publish` returns immediately. There is no ordering between
//!   handlers, and a slow handler may observe two consecutive events out of
//!   order. Consumers that need strict ordering must use `Sync` or sequence
//!   events themselves (events carry timestamps).
//!
//! A panicking handler is caught and logged; it never affects delivery to the
//! other handlers or the publisher.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{error, trace};

use super::{Event, EventKind};

type BoxedHandler = Arc<dyn Fn(Event) -> BoxFuture<'static, ()> + Send + Sync>;

/// How published events reach their handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchMode {
    Sync,
    #[default]
    Async,
}

struct Registration {
    id: u64,
    kind: EventKind,
    handler: BoxedHandler,
}

struct BusInner {
    mode: DispatchMode,
    next_id: AtomicU64,
    registrations: RwLock<Vec<Registration>>,
}

/// Publish/subscribe router, cheap to clone
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("mode", &self.inner.mode)
            .field("registrations", &self.inner.registrations.read().len())
            .finish()
    }
}

impl EventBus {
    pub fn new(mode: DispatchMode) -> Self {
        Self {
            inner: Arc::new(BusInner {
                mode,
                next_id: AtomicU64::new(0),
                registrations: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn mode(&self) -> DispatchMode {
        self.inner.mode
    }

    /// Register `handler` for every event of `kind`
    pub fn subscribe<F, Fut>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.register(kind, Arc::new(move |event| handler(event).boxed()))
    }

    /// Register the same handler for every known event kind
    pub fn subscribe_all<F, Fut>(&self, handler: F) -> Vec<Subscription>
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: BoxedHandler = Arc::new(move |event| handler(event).boxed());
        EventKind::ALL
            .iter()
            .map(|kind| self.register(*kind, Arc::clone(&handler)))
            .collect()
    }

    fn register(&self, kind: EventKind, handler: BoxedHandler) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .registrations
            .write()
            .push(Registration { id, kind, handler });
        trace!(id, ?kind, "handler subscribed");

        Subscription {
            bus: Arc::downgrade(&self.inner),
            id,
            kind,
        }
    }

    /// Deliver `event` to every handler currently subscribed to its kind
    pub async fn publish(&self, event: Event) {
        let kind = event.kind();

        // snapshot so no lock is held while handlers run
        let handlers: Vec<(u64, BoxedHandler)> = self
            .inner
            .registrations
            .read()
            .iter()
            .filter(|registration| registration.kind == kind)
            .map(|registration| (registration.id, Arc::clone(&registration.handler)))
            .collect();

        if handlers.is_empty() {
            trace!(?kind, "no subscribers for event");
            return;
        }

        match self.inner.mode {
            DispatchMode::Sync => {
                for (id, handler) in handlers {
                    invoke(id, kind, handler, event.clone()).await;
                }
            }
            DispatchMode::Async => {
                for (id, handler) in handlers {
                    tokio::spawn(invoke(id, kind, handler, event.clone()));
                }
            }
        }
    }

    /// Number of handlers registered for `kind`
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .registrations
            .read()
            .iter()
            .filter(|registration| registration.kind == kind)
            .count()
    }
}

async fn invoke(id: u64, kind: EventKind, handler: BoxedHandler, event: Event) {
    let outcome = AssertUnwindSafe(async move { handler(event).await })
        .catch_unwind()
        .await;

    if outcome.is_err() {
        error!(id, ?kind, "event handler panicked");
    }
}

/// Handle for one registered handler
///
/// Dropping a subscription does not unregister the handler; call
/// [`Subscription::unsubscribe`] for that. Unsubscribing is idempotent.
#[derive(Debug)]
pub struct Subscription {
    bus: Weak<BusInner>,
    id: u64,
    kind: EventKind,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        let Some(inner) = self.bus.upgrade() else {
            return;
        };

        let mut registrations = inner.registrations.write();
        let before = registrations.len();
        registrations.retain(|registration| registration.id != self.id);

        if registrations.len() != before {
            trace!(id = self.id, kind = ?self.kind, "handler unsubscribed");
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }
}
