//! Monitor - the sole producer of [`Event`]s
//!
//! The monitor runs one task per tracked target. Each task observes its host
//! either through a native push subscription or by polling, and feeds every
//! observation through the shared [`StateTracker`]. Whatever the tracker
//! reports as a change is published on the [`EventBus`].
//!
//! ## Message Flow
//!
//! ```text
//! Push: subscribe → resync (list) → notification → reconcile → publish
//!          ↑                                  │
//!          └──── backoff ←── stream lost ─────┘
//!
//! Poll: tick → list → reconcile → publish
//! ```
//!
//! Failures never end a task: they are turned into `HostUnreachable` events and
//! the task retries on its normal schedule. The one exception is a provider
//! reporting itself permanently unavailable on the very first attempt, which is
//! logged and ends only that task.

pub mod backoff;
pub mod provider;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::{ConfigError, MonitorError, ProviderError, SubscriptionError};
use crate::events::{Event, EventBus};

pub use backoff::BackoffPolicy;
pub use provider::{NativeStream, Observation, ServiceProvider};
pub use state::StateTracker;

/// How a target is observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Native push subscription, falling back to polling when unsupported
    Push,
    #[default]
    Poll,
}

/// One host observed through one provider
#[derive(Clone)]
pub struct MonitorTarget {
    pub host: String,
    pub provider: Arc<dyn ServiceProvider>,
    pub strategy: Strategy,
}

impl MonitorTarget {
    pub fn new(host: impl Into<String>, provider: Arc<dyn ServiceProvider>, strategy: Strategy) -> Self {
        Self {
            host: host.into(),
            provider,
            strategy,
        }
    }
}

impl std::fmt::Debug for MonitorTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorTarget")
            .field("host", &self.host)
            .field("source", &self.provider.source())
            .field("strategy", &self.strategy)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Delay between two polls of the same target
    pub poll_interval: Duration,

    /// Suppress the event for the first observation of every service
    pub skip_first_event: bool,

    /// Upper bound for every provider call and subscription attempt
    pub timeout: Duration,

    /// Reconnect policy for native subscriptions
    pub backoff: BackoffPolicy,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(60),
            skip_first_event: true,
            timeout: Duration::from_secs(5),
            backoff: BackoffPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Stopped,
}

/// Owns one observation task per target
///
/// Lifecycle: `new` → `start` → `stop`. A stopped monitor cannot be restarted.
pub struct Monitor {
    targets: Vec<MonitorTarget>,
    bus: EventBus,
    config: MonitorConfig,
    tracker: Arc<StateTracker>,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    lifecycle: Mutex<Lifecycle>,
}

impl Monitor {
    pub fn new(
        targets: Vec<MonitorTarget>,
        bus: EventBus,
        config: MonitorConfig,
    ) -> Result<Self, ConfigError> {
        if config.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval);
        }

        Ok(Self {
            targets,
            bus,
            tracker: Arc::new(StateTracker::new(config.skip_first_event)),
            config,
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
            lifecycle: Mutex::new(Lifecycle::Idle),
        })
    }

    /// Launch one task per target
    pub fn start(&self) -> Result<(), MonitorError> {
        {
            let mut lifecycle = self.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Idle => *lifecycle = Lifecycle::Running,
                Lifecycle::Running => return Err(MonitorError::AlreadyStarted),
                Lifecycle::Stopped => return Err(MonitorError::Stopped),
            }
        }

        debug!("starting monitor with {} targets", self.targets.len());

        for target in &self.targets {
            let worker = TargetWorker {
                target: target.clone(),
                bus: self.bus.clone(),
                tracker: Arc::clone(&self.tracker),
                config: self.config.clone(),
                shutdown: self.shutdown.child_token(),
            };
            self.tasks.spawn(worker.run());
        }
        self.tasks.close();

        Ok(())
    }

    /// Cancel every task and wait until all of them have exited
    pub async fn stop(&self) {
        *self.lifecycle.lock() = Lifecycle::Stopped;

        self.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        debug!("monitor stopped");
    }

    /// Number of targets whose task is still running
    pub fn running_tasks(&self) -> usize {
        self.tasks.len()
    }
}

/// State of one observation task
struct TargetWorker {
    target: MonitorTarget,
    bus: EventBus,
    tracker: Arc<StateTracker>,
    config: MonitorConfig,
    shutdown: CancellationToken,
}

impl TargetWorker {
    #[instrument(skip(self), fields(host = %self.target.host, source = %self.target.provider.source()))]
    async fn run(self) {
        debug!("starting monitor task");

        match self.target.strategy {
            Strategy::Push if self.target.provider.supports_push() => self.run_push().await,
            Strategy::Push => {
                warn!("provider has no native subscriptions, polling instead");
                self.run_poll(true).await;
            }
            Strategy::Poll => self.run_poll(true).await,
        }

        debug!("monitor task stopped");
    }

    /// Fixed-interval poll loop; `startup` marks whether nothing was attempted yet
    async fn run_poll(&self, mut startup: bool) {
        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,

                _ = ticker.tick() => {
                    let result = self.query().await;

                    if startup
                        && let Err(e) = &result
                        && e.is_permanent()
                    {
                        error!("giving up on host: {e}");
                        return;
                    }
                    startup = false;

                    self.apply(result).await;
                }
            }
        }
    }

    async fn run_push(&self) {
        let mut failures: u32 = 0;
        let mut startup = true;

        loop {
            let Some(opened) = self.open_subscription().await else {
                return;
            };

            match opened {
                Ok(mut stream) => {
                    debug!("native subscription opened");
                    startup = false;
                    failures = 0;

                    let snapshot = self.query().await;
                    self.apply(snapshot).await;

                    let reason = loop {
                        tokio::select! {
                            _ = self.shutdown.cancelled() => return,

                            item = stream.next() => {
                                match item {
                                    Some(Ok(observation)) => {
                                        self.record_success().await;
                                        self.reconcile(&observation).await;
                                    }
                                    Some(Err(e)) => break e.to_string(),
                                    None => break String::from("subscription closed by provider"),
                                }
                            }
                        }
                    };

                    warn!("native subscription lost: {reason}");
                    self.record_failure(&reason).await;
                    failures += 1;
                }
                Err(SubscriptionError::Unsupported) => {
                    warn!("provider rejected native subscription, polling instead");
                    return self.run_poll(startup).await;
                }
                Err(SubscriptionError::Open(e)) if startup && e.is_permanent() => {
                    error!("giving up on host: {e}");
                    return;
                }
                Err(e) => {
                    warn!("failed to open native subscription: {e}");
                    startup = false;
                    self.record_failure(&e.to_string()).await;
                    failures += 1;
                }
            }

            if self.config.backoff.exhausted(failures) {
                warn!("native subscription failed {failures} times in a row, degrading to polling");
                return self.run_poll(false).await;
            }

            let delay = self.config.backoff.next(failures.saturating_sub(1));
            trace!("reconnecting in {delay:?}");

            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// `None` when the monitor is stopped before the subscription opens
    async fn open_subscription(&self) -> Option<Result<NativeStream, SubscriptionError>> {
        let host = &self.target.host;
        tokio::select! {
            _ = self.shutdown.cancelled() => None,
            result = tokio::time::timeout(self.config.timeout, self.target.provider.subscribe_native(host)) => {
                Some(result.unwrap_or_else(|_| Err(ProviderError::Timeout(self.config.timeout).into())))
            }
        }
    }

    async fn query(&self) -> Result<Vec<Observation>, ProviderError> {
        trace!("querying services");
        let host = &self.target.host;
        tokio::time::timeout(self.config.timeout, self.target.provider.list_observations(host))
            .await
            .unwrap_or_else(|_| Err(ProviderError::Timeout(self.config.timeout)))
    }

    async fn apply(&self, result: Result<Vec<Observation>, ProviderError>) {
        match result {
            Ok(observations) => {
                self.record_success().await;
                for observation in &observations {
                    self.reconcile(observation).await;
                }
            }
            Err(e) => {
                warn!("observation failed: {e}");
                self.record_failure(&e.to_string()).await;
            }
        }
    }

    async fn reconcile(&self, observation: &Observation) {
        let event = self.tracker.observe_service(
            &self.target.host,
            self.target.provider.source(),
            observation,
        );
        self.publish(event).await;
    }

    async fn record_success(&self) {
        let event = self.tracker.observe_success(&self.target.host);
        self.publish(event).await;
    }

    async fn record_failure(&self, reason: &str) {
        let event = self.tracker.observe_failure(&self.target.host, reason);
        self.publish(event).await;
    }

    async fn publish(&self, event: Option<Event>) {
        if let Some(event) = event {
            info!("{}", event.summary());
            self.bus.publish(event).await;
        }
    }
}
