use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, instrument};

use crate::config::WebhookConfig;
use crate::error::NotifierError;
use crate::events::Event;

use super::Notifier;

/// Posts a small JSON document per event to an arbitrary URL
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    config: WebhookConfig,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    fn payload(event: &Event) -> serde_json::Value {
        json!({
            "message": event.summary(),
            "host": event.host(),
            "event": event,
            "timestamp": event.timestamp().to_rfc3339(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip_all, fields(host = %event.host()))]
    async fn notify(&self, event: &Event) -> Result<(), NotifierError> {
        let response = self
            .client
            .post(&self.config.url)
            .json(&Self::payload(event))
            .send()
            .await
            .map_err(|e| NotifierError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotifierError::Status(response.status().as_u16()));
        }

        debug!("successfully sent webhook notification");
        Ok(())
    }
}
