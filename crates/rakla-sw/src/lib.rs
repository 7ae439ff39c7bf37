//! # Rakla Service Worker
//!
//! Offline cache and notification agent for the Rakla web app.
//!
//! ## Features
//!
//! - **Lifecycle**: install, skip-waiting, activate, redundant generations
//! - **Cache API**: versioned cache generations, cache-first fetch interception
//! - **Notifications**: in-page `SHOW_NOTIFICATION` messages and push events
//! - **Clients API**: claim on activation, open/focus on notification click
//!
//! ## Architecture
//!
//! ```text
//! Host (browser / harness / tests)
//!     │  install · activate · fetch · message · push · notificationclick
//!     ▼
//! ServiceWorkerAgent ── Registration (installing / waiting / active)
//!     ├── CacheStore           (caches)
//!     ├── Network              (fetch)
//!     ├── NotificationSurface  (registration.showNotification)
//!     └── ClientHost           (clients)
//! ```
//!
//! Every handler is an `async fn`; the host keeps the event alive by awaiting
//! the returned future to completion.

use thiserror::Error;

pub mod agent;
pub mod cache;
pub mod clients;
pub mod config;
pub mod fetch;
pub mod lifecycle;
pub mod message;
pub mod notification;

pub use agent::{HostServices, ServiceWorkerAgent};
pub use cache::{CacheEntry, CacheStore, MemoryCacheStorage};
pub use clients::{Client, ClientHost, ClientRegistry, ClientType};
pub use config::{AgentConfig, NotificationDefaults};
pub use fetch::{
    FetchOutcome, FetchRequest, FetchResponse, HttpNetwork, Network, NetworkConfig, ResponseType,
};
pub use lifecycle::{GenerationId, Registration, ServiceWorkerState};
pub use message::{AgentMessage, ClientMessage, MessageReply};
pub use notification::{
    DisplayedNotification, NotificationAction, NotificationCenter, NotificationClick,
    NotificationOptions, NotificationSurface, PushEvent, PushPayload, VibratePattern,
    DISMISS_ACTION,
};

// ==================== Errors ====================

/// Errors that can occur in service worker operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceWorkerError {
    #[error("Install failed for {asset}: {reason}")]
    InstallFailed { asset: String, reason: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Client error: {0}")]
    Client(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Payload error: {0}")]
    Payload(String),
}

impl From<url::ParseError> for ServiceWorkerError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

/// Result type alias for service worker operations.
pub type Result<T> = std::result::Result<T, ServiceWorkerError>;

// ==================== Helpers ====================

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
