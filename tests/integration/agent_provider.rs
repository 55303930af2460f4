//! Tests for the HTTP agent provider against a mock agent

use std::time::Duration;

use assert_matches::assert_matches;
use futures::StreamExt;
use pretty_assertions::assert_eq;
use servicewatch::{
    error::{ProviderError, SubscriptionError},
    events::LifecycleState,
    monitor::{Observation, ServiceProvider},
    providers::HttpAgentProvider,
};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> HttpAgentProvider {
    HttpAgentProvider::new(server.uri(), Some("test-token".into()), Duration::from_secs(2))
}

#[tokio::test]
async fn test_list_observations_maps_agent_states() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/services"))
        .and(header("X-MONITORING-SECRET", "test-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
            {"name": "db", "state": "running", "status": "Up 3 hours"},
            {"name": "web", "state": "exited"},
            {"name": "cron", "state": "restarting"}
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let observations = provider(&mock_server).list_observations("nas").await.unwrap();

    assert_eq!(
        observations,
        vec![
            Observation::new("db", LifecycleState::Running).with_status("Up 3 hours"),
            Observation::new("web", LifecycleState::Stopped),
            Observation::new("cron", LifecycleState::Unknown),
        ]
    );
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/services"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let result = provider(&mock_server).list_observations("nas").await;
    assert_matches!(result, Err(ProviderError::Status(500)));
}

#[tokio::test]
async fn test_malformed_body_is_invalid_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/services"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&mock_server)
        .await;

    let result = provider(&mock_server).list_observations("nas").await;
    assert_matches!(result, Err(ProviderError::InvalidResponse(_)));
}

#[tokio::test]
async fn test_slow_agent_times_out() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/services"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!([]))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&mock_server)
        .await;

    let provider = HttpAgentProvider::new(mock_server.uri(), None, Duration::from_millis(200));
    let result = provider.list_observations("nas").await;
    assert_matches!(result, Err(ProviderError::Timeout(_)));
}

#[tokio::test]
async fn test_unreachable_agent_is_connection_error() {
    // nothing listens on the discard port
    let provider = HttpAgentProvider::new("http://127.0.0.1:9", None, Duration::from_secs(1));
    let result = provider.list_observations("nas").await;
    assert_matches!(result, Err(ProviderError::Connection(_) | ProviderError::Timeout(_)));
}

#[tokio::test]
async fn test_event_stream_yields_one_observation_per_line() {
    let mock_server = MockServer::start().await;

    let body = concat!(
        "{\"name\": \"db\", \"state\": \"stopped\"}\n",
        "\n",
        "{\"name\": \"db\", \"state\": \"running\"}\n",
    );
    Mock::given(method("GET"))
        .and(path("/services/events"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&mock_server)
        .await;

    let Ok(stream) = provider(&mock_server).subscribe_native("nas").await else {
        panic!("event stream should open");
    };
    let items: Vec<_> = stream.collect().await;

    assert_eq!(
        items,
        vec![
            Ok(Observation::new("db", LifecycleState::Stopped)),
            Ok(Observation::new("db", LifecycleState::Running)),
        ]
    );
}

#[tokio::test]
async fn test_missing_event_endpoint_is_unsupported() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/services/events"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let error = provider(&mock_server).subscribe_native("nas").await.err();
    assert_matches!(error, Some(SubscriptionError::Unsupported));
}

#[tokio::test]
async fn test_rejected_event_stream_is_open_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/services/events"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&mock_server)
        .await;

    let error = provider(&mock_server).subscribe_native("nas").await.err();
    assert_matches!(error, Some(SubscriptionError::Open(ProviderError::Status(401))));
}

#[tokio::test]
async fn test_unterminated_event_line_closes_subscription() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/services/events"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(256 * 1024)))
        .mount(&mock_server)
        .await;

    let Ok(stream) = provider(&mock_server).subscribe_native("nas").await else {
        panic!("event stream should open");
    };
    let items: Vec<_> = stream.collect().await;

    assert_eq!(items.len(), 1);
    assert_matches!(&items[0], Err(SubscriptionError::Closed(_)));
}
