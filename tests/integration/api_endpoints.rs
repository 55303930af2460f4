//! Integration tests for the HTTP surface and the WebSocket hub
//!
//! These tests verify that:
//! - Every connected client receives every event exactly once
//! - A disconnecting client does not disturb the others
//! - Health reports the number of connected clients
//! - Idle connections receive keepalive pings
//! - A client that stops reading is dropped
//! - Authentication middleware guards every route

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use servicewatch::{
    api::{ApiConfig, ApiState, HealthResponse, router, spawn_api_server},
    events::{DispatchMode, Event, EventBus, LifecycleState},
    hub::{Hub, HubConfig, WireMessage, WireType},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

use crate::helpers::wait_until;

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    bus: EventBus,
    hub: Hub,
    addr: SocketAddr,
    shutdown: CancellationToken,
}

impl TestServer {
    async fn spawn(auth_token: Option<&str>) -> Self {
        Self::spawn_with(auth_token, HubConfig::default()).await
    }

    async fn spawn_with(auth_token: Option<&str>, hub_config: HubConfig) -> Self {
        let bus = EventBus::new(DispatchMode::Sync);
        let hub = Hub::new(bus.clone(), hub_config);
        hub.start();

        let config = ApiConfig {
            bind_addr: "127.0.0.1:0".parse().unwrap(), // Random port
            auth_token: auth_token.map(str::to_owned),
            enable_cors: true,
        };
        let shutdown = CancellationToken::new();
        let app = router(&config, ApiState::new(hub.clone()));
        let addr = spawn_api_server(config.bind_addr, app, shutdown.clone())
            .await
            .unwrap();

        Self {
            bus,
            hub,
            addr,
            shutdown,
        }
    }

    async fn connect(&self) -> Client {
        let (client, _) = connect_async(format!("ws://{}/api/v1/stream", self.addr))
            .await
            .unwrap();
        client
    }

    async fn stop(self) {
        self.hub.stop().await;
        self.shutdown.cancel();
    }
}

async fn next_wire_message(client: &mut Client) -> WireMessage {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

fn stopped_event() -> Event {
    Event::service_state_changed(
        "nas",
        "db",
        "agent",
        LifecycleState::Running,
        LifecycleState::Stopped,
    )
}

#[tokio::test]
async fn test_every_client_receives_every_event() {
    let server = TestServer::spawn(None).await;

    let mut clients = Vec::new();
    for _ in 0..3 {
        clients.push(server.connect().await);
    }
    assert!(wait_until(|| server.hub.client_count() == 3).await);

    server.bus.publish(stopped_event()).await;
    server.bus.publish(Event::host_unreachable("edge1", "refused")).await;

    for client in &mut clients {
        let first = next_wire_message(client).await;
        assert_eq!(first.kind, WireType::ServiceUpdate);
        assert_eq!(first.payload["service_name"], "db");
        assert_eq!(first.payload["new_state"], "stopped");

        let second = next_wire_message(client).await;
        assert_eq!(second.kind, WireType::HostUnreachable);
        assert_eq!(second.payload["host"], "edge1");
    }

    server.stop().await;
}

#[tokio::test]
async fn test_disconnected_client_does_not_affect_others() {
    let server = TestServer::spawn(None).await;

    let mut staying = server.connect().await;
    let mut leaving = server.connect().await;
    assert!(wait_until(|| server.hub.client_count() == 2).await);

    leaving.close(None).await.unwrap();
    drop(leaving);
    assert!(wait_until(|| server.hub.client_count() == 1).await);

    server.bus.publish(Event::host_recovered("edge1")).await;

    let message = next_wire_message(&mut staying).await;
    assert_eq!(message.kind, WireType::HostRecovered);
    assert_eq!(message.payload["host"], "edge1");

    server.stop().await;
}

#[tokio::test]
async fn test_stop_closes_clients() {
    let server = TestServer::spawn(None).await;

    let mut client = server.connect().await;
    assert!(wait_until(|| server.hub.client_count() == 1).await);

    server.hub.stop().await;
    assert_eq!(server.hub.client_count(), 0);

    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match client.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "client should observe the close");

    server.shutdown.cancel();
}

#[tokio::test]
async fn test_health_reports_clients() {
    let server = TestServer::spawn(None).await;
    let _client = server.connect().await;
    assert!(wait_until(|| server.hub.client_count() == 1).await);

    let response = reqwest::get(format!("http://{}/api/v1/health", server.addr))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health: HealthResponse = response.json().await.unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.clients, 1);

    server.stop().await;
}

#[tokio::test]
async fn test_auth_rejects_missing_and_wrong_tokens() {
    let server = TestServer::spawn(Some("test-token")).await;
    let url = format!("http://{}/api/v1/health", server.addr);
    let client = reqwest::Client::new();

    let missing = client.get(&url).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);

    let wrong = client.get(&url).bearer_auth("nope").send().await.unwrap();
    assert_eq!(wrong.status(), StatusCode::FORBIDDEN);

    let valid = client.get(&url).bearer_auth("test-token").send().await.unwrap();
    assert_eq!(valid.status(), StatusCode::OK);

    let rejected = connect_async(format!("ws://{}/api/v1/stream", server.addr)).await;
    assert!(rejected.is_err(), "handshake without token must fail");

    let (_ws, _) = connect_async(format!("ws://{}/api/v1/stream?token=test-token", server.addr))
        .await
        .unwrap();
    assert!(wait_until(|| server.hub.client_count() == 1).await);

    server.stop().await;
}

#[tokio::test]
async fn test_client_messages_are_ignored() {
    let server = TestServer::spawn(None).await;
    let mut client = server.connect().await;
    assert!(wait_until(|| server.hub.client_count() == 1).await);

    client.send(Message::Text("hello".into())).await.unwrap();
    server.bus.publish(Event::host_recovered("nas")).await;

    let message = next_wire_message(&mut client).await;
    assert_eq!(message.kind, WireType::HostRecovered);
    assert_eq!(server.hub.client_count(), 1);

    server.stop().await;
}

#[tokio::test]
async fn test_idle_client_receives_keepalive_pings() {
    let server = TestServer::spawn_with(
        None,
        HubConfig {
            ping_interval: Duration::from_millis(50),
            ..HubConfig::default()
        },
    )
    .await;
    let mut client = server.connect().await;
    assert!(wait_until(|| server.hub.client_count() == 1).await);

    let mut pings = 0;
    let deadline = tokio::time::Instant::now() + Duration::from_millis(400);
    while let Ok(Some(Ok(message))) = tokio::time::timeout_at(deadline, client.next()).await {
        if let Message::Text(text) = message {
            let wire: WireMessage = serde_json::from_str(&text).unwrap();
            assert_eq!(wire.kind, WireType::Ping);
            assert!(wire.payload.is_null());
            pings += 1;
        }
    }

    assert!(pings >= 3, "expected several pings in 400ms, got {pings}");
    server.stop().await;
}

#[tokio::test]
async fn test_client_that_stops_reading_is_dropped() {
    let server = TestServer::spawn_with(
        None,
        HubConfig {
            queue_capacity: 4,
            write_timeout: Duration::from_millis(100),
            ..HubConfig::default()
        },
    )
    .await;

    // connected but never polled again, so the socket buffers fill up
    let _stalled = server.connect().await;
    assert!(wait_until(|| server.hub.client_count() == 1).await);

    let reason = "x".repeat(64 * 1024);
    for _ in 0..500 {
        server
            .bus
            .publish(Event::host_unreachable("edge1", reason.clone()))
            .await;
        if server.hub.client_count() == 0 {
            break;
        }
    }

    assert!(
        wait_until(|| server.hub.client_count() == 0).await,
        "stalled client should be dropped by write timeout or full queue"
    );
    server.stop().await;
}
