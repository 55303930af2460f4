//! WebSocket hub for real-time event streaming
//!
//! The hub subscribes to every event kind and broadcasts each event, as a
//! [`WireMessage`], to every connected client. Each client owns a bounded
//! outbound queue drained by its own write task; a client whose queue is full
//! or whose connection failed is dropped without affecting anyone else.
//!
//! ```text
//! EventBus → dispatch loop → try_send ─┬→ queue → write task → socket
//!                                      ├→ queue → write task → socket
//!                                      └→ ...
//! ```

pub mod wire;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use axum::{
    extract::{
        WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::{MethodRouter, get},
};
use futures::{
    SinkExt,
    stream::{SplitSink, SplitStream, StreamExt},
};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::TransportError;
use crate::events::{Event, EventBus, EventKind, Subscription};

pub use wire::{WireMessage, WireType};

#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Outbound messages buffered per client before it is considered lost
    pub queue_capacity: usize,

    /// Idle time after which a keepalive ping is written
    pub ping_interval: Duration,

    /// Deadline for a single write to a client
    pub write_timeout: Duration,

    /// Events buffered between the bus and the dispatch loop
    pub dispatch_capacity: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 64,
            ping_interval: Duration::from_secs(30),
            write_timeout: Duration::from_secs(10),
            dispatch_capacity: 256,
        }
    }
}

struct ClientEntry {
    queue: mpsc::Sender<String>,
    cancel: CancellationToken,
}

struct HubInner {
    bus: EventBus,
    config: HubConfig,
    clients: Mutex<HashMap<u64, ClientEntry>>,
    next_client_id: AtomicU64,
    subscriptions: Mutex<Vec<Subscription>>,
    started: AtomicBool,
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

/// Fan-out of bus events to WebSocket clients, cheap to clone
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    pub fn new(bus: EventBus, config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                bus,
                config,
                clients: Mutex::new(HashMap::new()),
                next_client_id: AtomicU64::new(0),
                subscriptions: Mutex::new(Vec::new()),
                started: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
            }),
        }
    }

    /// Start the dispatch loop and subscribe to the bus
    pub fn start(&self) {
        if self.inner.started.swap(true, Ordering::SeqCst) {
            warn!("hub already started");
            return;
        }

        let (tx, mut rx) = mpsc::channel::<Event>(self.inner.config.dispatch_capacity.max(1));

        let mut subscriptions = self.inner.subscriptions.lock();
        for kind in [
            EventKind::ServiceStateChanged,
            EventKind::HostUnreachable,
            EventKind::HostRecovered,
        ] {
            let tx = tx.clone();
            subscriptions.push(self.inner.bus.subscribe(kind, move |event| {
                let tx = tx.clone();
                async move {
                    if tx.send(event).await.is_err() {
                        trace!("hub stopped, dropping event");
                    }
                }
            }));
        }
        drop(subscriptions);

        let hub = self.clone();
        let shutdown = self.inner.shutdown.clone();
        self.inner.tasks.spawn(async move {
            debug!("hub dispatch loop started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,

                    event = rx.recv() => {
                        let Some(event) = event else { break };
                        hub.broadcast(&event);
                    }
                }
            }
            debug!("hub dispatch loop stopped");
        });
    }

    /// Upgrade endpoint to be mounted by the router
    pub fn handler(&self) -> MethodRouter {
        let hub = self.clone();
        get(move |ws: WebSocketUpgrade| {
            let hub = hub.clone();
            async move { hub.upgrade(ws) }
        })
    }

    fn upgrade(&self, ws: WebSocketUpgrade) -> Response {
        let hub = self.clone();
        ws.on_upgrade(move |socket| async move { hub.accept(socket).await })
    }

    /// Number of currently registered clients
    pub fn client_count(&self) -> usize {
        self.inner.clients.lock().len()
    }

    /// Send `event` to every registered client, returning how many accepted it
    pub fn broadcast(&self, event: &Event) -> usize {
        let text = match WireMessage::from_event(event).and_then(|m| serde_json::to_string(&m)) {
            Ok(text) => text,
            Err(e) => {
                error!("failed to encode event for clients: {e}");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut lost = Vec::new();
        {
            let clients = self.inner.clients.lock();
            for (id, client) in clients.iter() {
                match client.queue.try_send(text.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        warn!(client = id, "client queue full, dropping client");
                        lost.push(*id);
                    }
                    Err(TrySendError::Closed(_)) => lost.push(*id),
                }
            }
        }

        for id in lost {
            self.unregister(id);
        }

        trace!("broadcast {:?} to {delivered} clients", event.kind());
        delivered
    }

    /// Stop accepting events, disconnect every client and wait for their tasks
    pub async fn stop(&self) {
        for subscription in self.inner.subscriptions.lock().drain(..) {
            subscription.unsubscribe();
        }

        self.inner.shutdown.cancel();

        let clients: Vec<ClientEntry> = self
            .inner
            .clients
            .lock()
            .drain()
            .map(|(_, client)| client)
            .collect();
        for client in &clients {
            client.cancel.cancel();
        }

        self.inner.tasks.close();
        self.inner.tasks.wait().await;

        info!("hub stopped, {} clients disconnected", clients.len());
    }

    fn register(&self) -> Option<(u64, mpsc::Receiver<String>, CancellationToken)> {
        let (queue, rx) = mpsc::channel(self.inner.config.queue_capacity.max(1));
        let cancel = self.inner.shutdown.child_token();
        let id = self.inner.next_client_id.fetch_add(1, Ordering::Relaxed);

        let mut clients = self.inner.clients.lock();
        // checked under the lock so `stop` cannot miss a late registration
        if self.inner.shutdown.is_cancelled() {
            return None;
        }
        clients.insert(
            id,
            ClientEntry {
                queue,
                cancel: cancel.clone(),
            },
        );

        Some((id, rx, cancel))
    }

    fn unregister(&self, id: u64) {
        if let Some(client) = self.inner.clients.lock().remove(&id) {
            client.cancel.cancel();
            debug!(client = id, "client unregistered");
        }
    }

    #[instrument(skip_all)]
    async fn accept(self, mut socket: WebSocket) {
        let Some((id, queue, cancel)) = self.register() else {
            debug!("hub stopped, rejecting connection");
            let _ = socket.send(Message::Close(None)).await;
            return;
        };

        info!(client = id, "WebSocket client connected ({} total)", self.client_count());

        let (sink, stream) = socket.split();
        let config = self.inner.config.clone();

        let hub = self.clone();
        let write_cancel = cancel.clone();
        self.inner.tasks.spawn(async move {
            if let Err(e) = write_loop(sink, queue, write_cancel, &config).await {
                debug!(client = id, "write task ended: {e}");
            }
            hub.unregister(id);
        });

        let hub = self.clone();
        self.inner.tasks.spawn(async move {
            if let Err(e) = read_loop(stream, cancel).await {
                debug!(client = id, "read task ended: {e}");
            }
            hub.unregister(id);
            info!(client = id, "WebSocket client disconnected");
        });
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut queue: mpsc::Receiver<String>,
    cancel: CancellationToken,
    config: &HubConfig,
) -> Result<(), TransportError> {
    let idle = tokio::time::sleep(config.ping_interval);
    tokio::pin!(idle);

    loop {
        let text = tokio::select! {
            _ = cancel.cancelled() => break,

            message = queue.recv() => {
                match message {
                    Some(text) => text,
                    None => break,
                }
            }

            _ = &mut idle => serde_json::to_string(&WireMessage::ping())?,
        };

        tokio::time::timeout(config.write_timeout, sink.send(Message::Text(text)))
            .await
            .map_err(|_| TransportError::WriteTimeout)??;

        idle.as_mut().reset(Instant::now() + config.ping_interval);
    }

    let _ = tokio::time::timeout(config.write_timeout, sink.send(Message::Close(None))).await;
    Ok(())
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    cancel: CancellationToken,
) -> Result<(), TransportError> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),

            message = stream.next() => {
                match message {
                    None | Some(Ok(Message::Close(_))) => return Err(TransportError::Closed),
                    Some(Err(e)) => return Err(e.into()),
                    // client messages carry no meaning, pongs are handled by axum
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}
