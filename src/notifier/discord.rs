use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::DiscordConfig;
use crate::error::NotifierError;
use crate::events::{Event, LifecycleState};

use super::Notifier;

const COLOR_RED: u32 = 15158332;
const COLOR_ORANGE: u32 = 15105570;
const COLOR_GREEN: u32 = 3066993;
const COLOR_BLUE: u32 = 5793266;

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

fn field(name: &str, value: impl ToString, inline: bool) -> EmbedField {
    EmbedField {
        name: name.to_string(),
        value: value.to_string(),
        inline,
    }
}

/// Posts one embed per event to a Discord webhook
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: Client,
    config: DiscordConfig,
}

impl DiscordNotifier {
    pub fn new(config: DiscordConfig) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    pub fn build_embed(&self, event: &Event) -> Embed {
        let (title, description, color, fields) = match event {
            Event::ServiceStateChanged(e) => {
                let (title, color) = match e.new_state {
                    LifecycleState::Running => ("✅ Service Started", COLOR_GREEN),
                    LifecycleState::Stopped => ("🔴 Service Stopped", COLOR_RED),
                    LifecycleState::Unknown => ("❔ Service State Unknown", COLOR_BLUE),
                };
                (
                    title,
                    format!("Service **{}** on **{}** is now {}", e.service_name, e.host, e.new_state),
                    color,
                    vec![
                        field("Previous", e.old_state, true),
                        field("Current", e.new_state, true),
                        field("Source", &e.source, true),
                    ],
                )
            }
            Event::HostUnreachable(e) => (
                "⚠️ Host Unreachable",
                format!("Host **{}** is not responding", e.host),
                COLOR_ORANGE,
                vec![field("Reason", &e.reason, false)],
            ),
            Event::HostRecovered(e) => (
                "✅ Host Recovered",
                format!("Host **{}** is reachable again", e.host),
                COLOR_GREEN,
                vec![],
            ),
        };

        Embed {
            title: Some(title.to_string()),
            description: Some(description),
            color: Some(color),
            fields,
            footer: Some(EmbedFooter {
                text: format!("Host: {}", event.host()),
            }),
            timestamp: Some(event.timestamp().to_rfc3339()),
        }
    }

    pub fn build_message(&self, event: &Event) -> Message {
        let mut builder = MessageBuilder::new().add_embed(self.build_embed(event));
        if let Some(user_id) = &self.config.user_id {
            builder = builder.content(format!("{} <@{user_id}>", event.summary()));
        }
        builder.build()
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn name(&self) -> &str {
        "discord"
    }

    #[instrument(skip_all, fields(host = %event.host()))]
    async fn notify(&self, event: &Event) -> Result<(), NotifierError> {
        let message = self.build_message(event);

        let response = self
            .client
            .post(&self.config.url)
            .json(&message)
            .send()
            .await
            .map_err(|e| NotifierError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            if let Ok(body) = response.text().await {
                debug!("Discord API error response: {body}");
            }
            return Err(NotifierError::Status(status));
        }

        debug!("successfully sent Discord message");
        Ok(())
    }
}
