//! Notification requests, push payloads, and the notification surface.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map as JsonMap, Value as JsonValue};
use tokio::sync::RwLock;
use tracing::debug;

use crate::config::NotificationDefaults;
use crate::{Result, ServiceWorkerError};

/// Action that dismisses a notification without opening a window.
pub const DISMISS_ACTION: &str = "close";

/// Options passed to `showNotification`, using the web field names.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vibrate: Option<VibratePattern>,

    /// Notifications with the same tag replace each other.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    /// Stay visible until the user dismisses it.
    #[serde(default)]
    pub require_interaction: bool,

    /// Alert again when replacing a notification with the same tag.
    #[serde(default)]
    pub renotify: bool,

    #[serde(default)]
    pub silent: bool,

    /// Arbitrary caller data. An object `url` field is the click target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,

    /// Caller fields the agent does not interpret; passed through untouched.
    #[serde(flatten)]
    pub extra: JsonMap<String, JsonValue>,
}

/// Vibration pattern in milliseconds: a single duration, or alternating
/// vibrate/pause durations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VibratePattern {
    Single(u32),
    Pattern(Vec<u32>),
}

impl From<Vec<u32>> for VibratePattern {
    fn from(pattern: Vec<u32>) -> Self {
        Self::Pattern(pattern)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

impl NotificationAction {
    pub fn new(action: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            title: title.into(),
        }
    }
}

impl NotificationOptions {
    /// Options for a `SHOW_NOTIFICATION` message: caller values win, defaults
    /// fill icon/badge/vibrate, and the notification always demands interaction.
    pub fn from_message(options: NotificationOptions, defaults: &NotificationDefaults) -> Self {
        Self {
            icon: options.icon.or_else(|| Some(defaults.icon.clone())),
            badge: options.badge.or_else(|| Some(defaults.badge.clone())),
            vibrate: options
                .vibrate
                .or_else(|| Some(defaults.vibrate.clone().into())),
            require_interaction: true,
            renotify: true,
            silent: false,
            ..options
        }
    }

    /// Options for a push message.
    pub fn from_push(payload: &PushPayload, defaults: &NotificationDefaults, now: u64) -> Self {
        Self {
            body: payload.body.clone(),
            icon: Some(defaults.icon.clone()),
            badge: Some(defaults.badge.clone()),
            vibrate: Some(defaults.vibrate.clone().into()),
            tag: Some(
                payload
                    .tag
                    .clone()
                    .unwrap_or_else(|| defaults.default_tag.clone()),
            ),
            require_interaction: true,
            renotify: true,
            silent: false,
            data: Some(json!({
                "url": payload.url.as_deref().unwrap_or(defaults.default_url.as_str()),
                "dateOfArrival": now,
                "primaryKey": 1,
            })),
            actions: vec![
                NotificationAction::new("view", "View"),
                NotificationAction::new(DISMISS_ACTION, "Dismiss"),
            ],
            extra: JsonMap::new(),
        }
    }

    /// Click target carried in `data.url`, if the data is an object with one.
    pub fn target_url(&self) -> Option<&str> {
        self.data.as_ref()?.get("url")?.as_str()
    }
}

// ==================== Push ====================

/// JSON body of a push message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// A push event as delivered by the push service.
#[derive(Debug, Clone, Default)]
pub struct PushEvent {
    pub data: Option<Bytes>,
}

impl PushEvent {
    /// A push without a payload.
    pub fn empty() -> Self {
        Self { data: None }
    }

    pub fn with_data(data: impl Into<Bytes>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    pub fn with_json(value: &JsonValue) -> Self {
        Self::with_data(value.to_string())
    }

    /// Decode the payload. `Ok(None)` when the push carries no data.
    pub fn payload(&self) -> Result<Option<PushPayload>> {
        match self.data {
            None => Ok(None),
            Some(ref data) => serde_json::from_slice(data)
                .map(Some)
                .map_err(|e| ServiceWorkerError::Payload(e.to_string())),
        }
    }
}

// ==================== Surface ====================

/// A notification currently handed to the platform.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedNotification {
    pub id: u64,
    pub title: String,
    pub options: NotificationOptions,
}

/// A click on a displayed notification.
#[derive(Debug, Clone)]
pub struct NotificationClick {
    pub notification: DisplayedNotification,

    /// Action button chosen, `None` for a click on the body.
    pub action: Option<String>,
}

impl NotificationClick {
    pub fn new(notification: DisplayedNotification) -> Self {
        Self {
            notification,
            action: None,
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }
}

/// Platform notification surface (`registration.showNotification`).
#[async_trait]
pub trait NotificationSurface: Send + Sync {
    async fn show(&self, title: &str, options: &NotificationOptions) -> Result<DisplayedNotification>;

    async fn close(&self, id: u64) -> Result<()>;
}

/// In-memory [`NotificationSurface`] with tag replacement.
#[derive(Debug, Default)]
pub struct NotificationCenter {
    displayed: RwLock<Vec<DisplayedNotification>>,
    dispatched: AtomicU64,
    alerts: AtomicU64,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notifications currently visible, oldest first.
    pub async fn displayed(&self) -> Vec<DisplayedNotification> {
        self.displayed.read().await.clone()
    }

    pub async fn get(&self, id: u64) -> Option<DisplayedNotification> {
        self.displayed
            .read()
            .await
            .iter()
            .find(|n| n.id == id)
            .cloned()
    }

    /// Total number of `show` calls.
    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Number of times the user was alerted (sound/vibration).
    pub fn alerts(&self) -> u64 {
        self.alerts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NotificationSurface for NotificationCenter {
    async fn show(&self, title: &str, options: &NotificationOptions) -> Result<DisplayedNotification> {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);

        let notification = DisplayedNotification {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            title: title.to_string(),
            options: options.clone(),
        };

        let mut displayed = self.displayed.write().await;
        let existing = options
            .tag
            .as_ref()
            .and_then(|tag| displayed.iter().position(|n| n.options.tag.as_ref() == Some(tag)));

        let alert = match existing {
            Some(index) => {
                debug!(tag = ?options.tag, "Replacing notification with same tag");
                displayed[index] = notification.clone();
                options.renotify
            }
            None => {
                displayed.push(notification.clone());
                true
            }
        };

        self.dispatched.fetch_add(1, Ordering::Relaxed);
        if alert && !options.silent {
            self.alerts.fetch_add(1, Ordering::Relaxed);
        }

        Ok(notification)
    }

    async fn close(&self, id: u64) -> Result<()> {
        self.displayed.write().await.retain(|n| n.id != id);
        Ok(())
    }
}
