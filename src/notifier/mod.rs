//! Best-effort forwarding of events to external notification backends
//!
//! The [`NotifierManager`] subscribes to every event kind and hands each event
//! to every registered [`Notifier`]. Backends run concurrently for a single
//! event; a failing backend is logged and never affects the others or the bus.
//! Failed deliveries are not retried.

pub mod discord;
pub mod webhook;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, error, instrument, trace};

use crate::config::NotifierConfig;
use crate::error::NotifierError;
use crate::events::{Event, EventBus, Subscription};

pub use discord::DiscordNotifier;
pub use webhook::WebhookNotifier;

/// A notification backend
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, event: &Event) -> Result<(), NotifierError>;

    async fn close(&self) -> Result<(), NotifierError> {
        Ok(())
    }
}

/// Build the backend described by `config`
pub fn from_config(config: &NotifierConfig) -> Arc<dyn Notifier> {
    match config {
        NotifierConfig::Discord(discord) => Arc::new(DiscordNotifier::new(discord.clone())),
        NotifierConfig::Webhook(webhook) => Arc::new(WebhookNotifier::new(webhook.clone())),
    }
}

type Registry = Arc<RwLock<Vec<Arc<dyn Notifier>>>>;

/// Owns the registered backends and their bus subscriptions
pub struct NotifierManager {
    notifiers: Registry,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl NotifierManager {
    pub fn new(bus: &EventBus) -> Self {
        let notifiers: Registry = Arc::new(RwLock::new(Vec::new()));

        let registry = Arc::clone(&notifiers);
        let subscriptions = bus.subscribe_all(move |event| {
            let registry = Arc::clone(&registry);
            async move { dispatch(&registry, event).await }
        });

        Self {
            notifiers,
            subscriptions: Mutex::new(subscriptions),
        }
    }

    pub fn register(&self, notifier: Arc<dyn Notifier>) {
        debug!("registering notifier {}", notifier.name());
        self.notifiers.write().push(notifier);
    }

    pub fn notifier_count(&self) -> usize {
        self.notifiers.read().len()
    }

    /// Unsubscribe from the bus and close every backend
    ///
    /// Every backend is closed even if an earlier one fails; the last error is
    /// returned.
    pub async fn close(&self) -> Result<(), NotifierError> {
        for subscription in self.subscriptions.lock().drain(..) {
            subscription.unsubscribe();
        }

        let notifiers: Vec<Arc<dyn Notifier>> = self.notifiers.write().drain(..).collect();

        let mut last_error = None;
        for notifier in notifiers {
            if let Err(e) = notifier.close().await {
                error!("failed to close notifier {}: {e}", notifier.name());
                last_error = Some(e);
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[instrument(skip_all, fields(kind = ?event.kind(), host = %event.host()))]
async fn dispatch(registry: &Registry, event: Event) {
    let notifiers: Vec<Arc<dyn Notifier>> = registry.read().clone();
    if notifiers.is_empty() {
        trace!("no notifiers registered");
        return;
    }

    let deliveries = notifiers.iter().map(|notifier| {
        let event = &event;
        async move {
            match notifier.notify(event).await {
                Ok(()) => trace!("notified {}", notifier.name()),
                Err(e) => error!("notifier {} failed: {e}", notifier.name()),
            }
        }
    });

    join_all(deliveries).await;
}
