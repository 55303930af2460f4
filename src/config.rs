use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use tracing::trace;

use crate::error::ConfigError;
use crate::events::DispatchMode;
use crate::monitor::{MonitorConfig, Strategy};

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorSettings,

    #[serde(default)]
    pub hosts: Vec<HostConfig>,

    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,

    #[serde(default)]
    pub api: ApiSettings,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitorSettings {
    /// Poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval: usize,

    #[serde(default = "default_true")]
    pub skip_first_event: bool,

    /// Timeout for a single provider call in seconds
    #[serde(default = "default_timeout")]
    pub timeout: usize,

    /// Bus dispatch mode
    #[serde(default)]
    pub dispatch: DispatchMode,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            skip_first_event: true,
            timeout: default_timeout(),
            dispatch: DispatchMode::default(),
        }
    }
}

impl MonitorSettings {
    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_secs(self.poll_interval as u64),
            skip_first_event: self.skip_first_event,
            timeout: Duration::from_secs(self.timeout as u64),
            ..Default::default()
        }
    }
}

/// A host running the monitoring agent
#[derive(Debug, Clone, serde::Deserialize)]
pub struct HostConfig {
    pub name: String,
    pub url: String,
    pub token: Option<String>,
    #[serde(default)]
    pub mode: Strategy,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierConfig {
    Discord(DiscordConfig),
    Webhook(WebhookConfig),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct DiscordConfig {
    pub url: String,
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct WebhookConfig {
    pub url: String,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    /// Bind address, falls back to the environment and then the default
    pub bind: Option<SocketAddr>,

    /// Optional bearer token required on every route
    pub token: Option<String>,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind: None,
            token: None,
            enable_cors: true,
        }
    }
}

fn default_poll_interval() -> usize {
    60
}

fn default_timeout() -> usize {
    5
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Reject configurations the monitor cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.monitor.poll_interval == 0 {
            return Err(ConfigError::ZeroPollInterval);
        }

        let mut seen = HashSet::new();
        for host in &self.hosts {
            if host.name.trim().is_empty() {
                return Err(ConfigError::EmptyHostName);
            }
            if !seen.insert(host.name.as_str()) {
                return Err(ConfigError::DuplicateHost(host.name.clone()));
            }
            reqwest::Url::parse(&host.url).map_err(|e| ConfigError::InvalidUrl {
                host: host.name.clone(),
                reason: e.to_string(),
            })?;
        }

        Ok(())
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    let config: Config =
        serde_json::from_str(&file_content).context("Invalid configuration file provided!")?;
    config.validate()?;
    trace!("loaded config: {config:?}");
    Ok(config)
}
