//! Page ↔ agent message protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::notification::NotificationOptions;
use crate::{Result, ServiceWorkerError};

/// Messages a page posts to the agent, discriminated by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Promote the waiting generation immediately.
    SkipWaiting,

    /// Display a local notification.
    ShowNotification {
        title: String,
        #[serde(default)]
        options: NotificationOptions,
    },

    /// Delete every cache store of the origin.
    ClearCache,
}

impl ClientMessage {
    /// Decode a structured message posted by a page.
    pub fn from_value(value: JsonValue) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| ServiceWorkerError::Payload(e.to_string()))
    }
}

/// Messages the agent posts to its clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentMessage {
    /// A new generation took control.
    SwActivated { version: String, timestamp: u64 },
}

/// Reply sent back on the message's port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageReply {
    pub success: bool,
}
