//! JSON messages sent to WebSocket clients

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireType {
    ServiceUpdate,
    HostUnreachable,
    HostRecovered,
    Ping,
}

/// One message on the wire: `{type, timestamp, payload}`
///
/// `payload` carries the fields of the event variant, `null` for pings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    #[serde(rename = "type")]
    pub kind: WireType,
    pub timestamp: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl WireMessage {
    pub fn from_event(event: &Event) -> Result<Self, serde_json::Error> {
        let (kind, payload) = match event {
            Event::ServiceStateChanged(e) => (WireType::ServiceUpdate, serde_json::to_value(e)?),
            Event::HostUnreachable(e) => (WireType::HostUnreachable, serde_json::to_value(e)?),
            Event::HostRecovered(e) => (WireType::HostRecovered, serde_json::to_value(e)?),
        };

        Ok(Self {
            kind,
            timestamp: event.timestamp(),
            payload,
        })
    }

    pub fn ping() -> Self {
        Self {
            kind: WireType::Ping,
            timestamp: Utc::now(),
            payload: serde_json::Value::Null,
        }
    }
}
