//! Helper types for integration tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use servicewatch::{
    error::{ProviderError, SubscriptionError},
    events::{Event, EventBus, LifecycleState},
    monitor::{BackoffPolicy, MonitorConfig, NativeStream, Observation, ServiceProvider},
};
use tokio::sync::mpsc;

pub type PushSender = mpsc::UnboundedSender<Result<Observation, SubscriptionError>>;
type PushReceiver = mpsc::UnboundedReceiver<Result<Observation, SubscriptionError>>;

/// Provider that replays a fixed script of poll results
///
/// Once the script runs out, the last result is repeated forever.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Vec<Observation>, ProviderError>>>,
    last: Mutex<Result<Vec<Observation>, ProviderError>>,
    push_supported: bool,
    push: Mutex<Option<PushReceiver>>,
    pub list_calls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn polling(script: Vec<Result<Vec<Observation>, ProviderError>>) -> Arc<Self> {
        Arc::new(Self::build(script, false, None))
    }

    /// Push-capable provider; the returned sender feeds the first subscription
    pub fn pushing(script: Vec<Result<Vec<Observation>, ProviderError>>) -> (Arc<Self>, PushSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self::build(script, true, Some(rx))), tx)
    }

    /// Push-capable provider whose subscriptions never open
    pub fn broken_push(script: Vec<Result<Vec<Observation>, ProviderError>>) -> Arc<Self> {
        Arc::new(Self::build(script, true, None))
    }

    fn build(
        script: Vec<Result<Vec<Observation>, ProviderError>>,
        push_supported: bool,
        push: Option<PushReceiver>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(Ok(Vec::new())),
            push_supported,
            push: Mutex::new(push),
            list_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ServiceProvider for ScriptedProvider {
    fn source(&self) -> &str {
        "scripted"
    }

    async fn list_observations(&self, _host: &str) -> Result<Vec<Observation>, ProviderError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let mut last = self.last.lock();
        if let Some(next) = self.script.lock().pop_front() {
            *last = next;
        }
        last.clone()
    }

    fn supports_push(&self) -> bool {
        self.push_supported
    }

    async fn subscribe_native(&self, _host: &str) -> Result<NativeStream, SubscriptionError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        let rx = self
            .push
            .lock()
            .take()
            .ok_or_else(|| ProviderError::Connection("connection refused".into()))?;

        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}

pub fn running(name: &str) -> Observation {
    Observation::new(name, LifecycleState::Running)
}

pub fn stopped(name: &str) -> Observation {
    Observation::new(name, LifecycleState::Stopped)
}

pub fn refused() -> ProviderError {
    ProviderError::Connection("connection refused".into())
}

pub fn fast_config() -> MonitorConfig {
    MonitorConfig {
        poll_interval: Duration::from_millis(20),
        skip_first_event: true,
        timeout: Duration::from_millis(500),
        backoff: BackoffPolicy {
            first: Duration::from_millis(5),
            max: Duration::from_millis(20),
            factor: 2.0,
            max_retries: 3,
        },
    }
}

/// Collect every event published on `bus`
pub fn record(bus: &EventBus) -> Arc<Mutex<Vec<Event>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    bus.subscribe_all(move |event| {
        let sink = Arc::clone(&sink);
        async move { sink.lock().push(event) }
    });
    events
}

/// Poll `condition` until it holds or two seconds pass
pub async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
