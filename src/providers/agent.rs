//! Provider talking to the remote monitoring agent over HTTP
//!
//! - `GET {base}/services` returns the current state of every service
//! - `GET {base}/services/events` streams newline-delimited JSON, one service
//!   per line, whenever a service changes; blank lines are keepalives
//!
//! Both carry the agent secret in the `X-MONITORING-SECRET` header.

use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::config::HostConfig;
use crate::error::{ProviderError, SubscriptionError};
use crate::events::LifecycleState;
use crate::monitor::{NativeStream, Observation, ServiceProvider};

const SECRET_HEADER: &str = "X-MONITORING-SECRET";

/// Upper bound for a single NDJSON line of the event stream
const MAX_LINE_BYTES: usize = 64 * 1024;

/// Service entry as reported by the agent
#[derive(Debug, Clone, Deserialize)]
pub struct AgentService {
    pub name: String,
    pub state: String,
    #[serde(default)]
    pub status: String,
}

impl AgentService {
    fn lifecycle(&self) -> LifecycleState {
        match self.state.to_ascii_lowercase().as_str() {
            "running" | "active" | "up" => LifecycleState::Running,
            "stopped" | "exited" | "dead" | "inactive" | "failed" | "down" => LifecycleState::Stopped,
            _ => LifecycleState::Unknown,
        }
    }
}

impl From<AgentService> for Observation {
    fn from(service: AgentService) -> Self {
        let state = service.lifecycle();
        Observation::new(service.name, state).with_status(service.status)
    }
}

#[derive(Debug, Clone)]
pub struct HttpAgentProvider {
    base_url: String,
    token: Option<String>,
    client: Client,
    request_timeout: Duration,
}

impl HttpAgentProvider {
    pub fn new(base_url: impl Into<String>, token: Option<String>, request_timeout: Duration) -> Self {
        // no client-wide timeout: it would also cut the long-lived event stream
        let client = Client::builder()
            .connect_timeout(request_timeout)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client,
            request_timeout,
        }
    }

    pub fn from_config(config: &HostConfig, request_timeout: Duration) -> Self {
        Self::new(config.url.clone(), config.token.clone(), request_timeout)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.client
            .get(format!("{}{path}", self.base_url))
            .header(SECRET_HEADER, self.token.as_deref().unwrap_or_default())
    }

    fn map_error(&self, error: reqwest::Error) -> ProviderError {
        if error.is_timeout() {
            ProviderError::Timeout(self.request_timeout)
        } else if error.is_decode() {
            ProviderError::InvalidResponse(error.to_string())
        } else {
            ProviderError::Connection(error.to_string())
        }
    }
}

#[async_trait]
impl ServiceProvider for HttpAgentProvider {
    fn source(&self) -> &str {
        "agent"
    }

    async fn list_observations(&self, _host: &str) -> Result<Vec<Observation>, ProviderError> {
        trace!("{}: requesting services", self.base_url);

        let response = self
            .get("/services")
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        let services: Vec<AgentService> = response.json().await.map_err(|e| self.map_error(e))?;
        Ok(services.into_iter().map(Observation::from).collect())
    }

    fn supports_push(&self) -> bool {
        true
    }

    async fn subscribe_native(&self, _host: &str) -> Result<NativeStream, SubscriptionError> {
        let response = self
            .get("/services/events")
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(SubscriptionError::Unsupported),
            status => return Err(ProviderError::Status(status.as_u16()).into()),
        }

        debug!("{}: event stream opened", self.base_url);

        Ok(ndjson_lines(response.bytes_stream()))
    }
}

/// Split a byte stream into observations, one per line
///
/// A line longer than [`MAX_LINE_BYTES`] fails the subscription.
fn ndjson_lines<S, B, E>(bytes: S) -> NativeStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = Some((bytes.boxed(), Vec::new()));
    futures::stream::unfold(state, |state| async move {
        let (mut bytes, mut buffer) = state?;
        loop {
            if let Some(position) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=position).collect();
                match parse_line(&line) {
                    Some(item) => return Some((item, Some((bytes, buffer)))),
                    None => continue,
                }
            }

            if buffer.len() > MAX_LINE_BYTES {
                let error = SubscriptionError::Closed(format!(
                    "event line exceeds {MAX_LINE_BYTES} bytes"
                ));
                return Some((Err(error), None));
            }

            match bytes.next().await {
                Some(Ok(chunk)) => buffer.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    let error = SubscriptionError::Closed(e.to_string());
                    return Some((Err(error), None));
                }
                None => return None,
            }
        }
    })
    .boxed()
}

/// Parse one NDJSON line; `None` for keepalive blank lines
fn parse_line(line: &[u8]) -> Option<Result<Observation, SubscriptionError>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    Some(
        serde_json::from_str::<AgentService>(text)
            .map(Observation::from)
            .map_err(|e| SubscriptionError::Closed(format!("invalid event: {e}"))),
    )
}
