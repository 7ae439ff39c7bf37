//! The offline cache and notification agent.

use std::sync::Arc;

use hashbrown::HashSet;
use http::Method;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::cache::CacheStore;
use crate::clients::{Client, ClientHost};
use crate::config::AgentConfig;
use crate::fetch::{FetchOutcome, FetchRequest, FetchResponse, Network};
use crate::lifecycle::{GenerationId, Registration, ServiceWorkerState};
use crate::message::{AgentMessage, ClientMessage, MessageReply};
use crate::notification::{
    DisplayedNotification, NotificationClick, NotificationOptions, NotificationSurface, PushEvent,
    DISMISS_ACTION,
};
use crate::{now_millis, Result, ServiceWorkerError};

/// Host-provided services an agent runs against.
#[derive(Clone)]
pub struct HostServices {
    pub caches: Arc<dyn CacheStore>,
    pub network: Arc<dyn Network>,
    pub notifications: Arc<dyn NotificationSurface>,
    pub clients: Arc<dyn ClientHost>,

    /// Registration shared by every generation of the scope.
    pub registration: Arc<RwLock<Registration>>,
}

/// One generation of the offline agent.
pub struct ServiceWorkerAgent {
    id: GenerationId,
    config: AgentConfig,
    cache_name: String,
    static_urls: Vec<Url>,
    static_keys: HashSet<String>,
    host: HostServices,
}

impl ServiceWorkerAgent {
    /// Create an agent generation. Fails if a static asset path cannot be
    /// resolved against the origin.
    pub fn new(config: AgentConfig, host: HostServices) -> Result<Self> {
        let static_urls = config.static_asset_urls()?;
        let static_keys = static_urls.iter().map(|url| url.to_string()).collect();

        Ok(Self {
            id: GenerationId::new(),
            cache_name: config.cache_name(),
            config,
            static_urls,
            static_keys,
            host,
        })
    }

    pub fn id(&self) -> GenerationId {
        self.id
    }

    /// Cache store name of this generation.
    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Current lifecycle state of this generation.
    pub async fn state(&self) -> ServiceWorkerState {
        self.host.registration.read().await.state_of(self.id)
    }

    // ==================== Lifecycle ====================

    /// Install event: precache the static asset set.
    ///
    /// On any failure the generation is discarded and no partial cache is kept.
    /// The generation is left waiting; it is not activated here.
    pub async fn install(&self) -> Result<()> {
        info!(cache = %self.cache_name, "Service worker installing");
        self.host
            .registration
            .write()
            .await
            .start_install(self.id, &self.cache_name);

        let existed = self.host.caches.has(&self.cache_name).await.unwrap_or(false);

        match self.precache().await {
            Ok(()) => {
                self.host
                    .registration
                    .write()
                    .await
                    .install_complete(self.id)?;
                info!(
                    cache = %self.cache_name,
                    assets = self.static_urls.len(),
                    "Static assets cached, waiting for activation"
                );
                Ok(())
            }
            Err(e) => {
                error!(cache = %self.cache_name, error = %e, "Failed to cache static assets");
                if !existed {
                    if let Err(cleanup) = self.host.caches.delete(&self.cache_name).await {
                        warn!(cache = %self.cache_name, error = %cleanup, "Failed to discard partial cache");
                    }
                }
                self.host.registration.write().await.install_failed(self.id);
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<()> {
        self.host.caches.open(&self.cache_name).await?;

        let mut entries = Vec::with_capacity(self.static_urls.len());
        for url in &self.static_urls {
            let request = FetchRequest::get(url.clone());
            let response = self.host.network.fetch(&request).await.map_err(|e| {
                ServiceWorkerError::InstallFailed {
                    asset: url.to_string(),
                    reason: e.to_string(),
                }
            })?;

            if !response.ok() {
                return Err(ServiceWorkerError::InstallFailed {
                    asset: url.to_string(),
                    reason: format!("status {}", response.status),
                });
            }
            entries.push((url.to_string(), response));
        }

        self.host.caches.put_all(&self.cache_name, entries).await
    }

    /// Activate event: drop every other cache generation, claim the clients
    /// and announce the new version to them.
    pub async fn activate(&self) -> Result<()> {
        let replaced = self
            .host
            .registration
            .write()
            .await
            .start_activate(self.id)?;
        info!(cache = %self.cache_name, replaced = ?replaced, "Service worker activating");

        match self.delete_stale_caches().await {
            Ok(deleted) => info!(deleted, "Old caches deleted"),
            Err(e) => error!(error = %e, "Failed to delete old caches"),
        }

        match self.host.clients.claim(self.id).await {
            Ok(claimed) => debug!(claimed, "Clients claimed"),
            Err(e) => warn!(error = %e, "Failed to claim clients"),
        }

        self.broadcast_activated().await;

        self.host
            .registration
            .write()
            .await
            .activate_complete(self.id)?;
        info!(cache = %self.cache_name, "Service worker activated");
        Ok(())
    }

    /// Activate if this generation is waiting and nothing holds it back:
    /// there is no active generation, or no client is controlled by it.
    ///
    /// Returns whether activation ran.
    pub async fn try_activate_waiting(&self) -> Result<bool> {
        let active = {
            let registration = self.host.registration.read().await;
            if registration.state_of(self.id) != ServiceWorkerState::Installed {
                return Ok(false);
            }
            registration.active.as_ref().map(|generation| generation.id)
        };

        if let Some(active) = active {
            let clients = self.host.clients.match_all().await?;
            if clients.iter().any(|client| client.controller == Some(active)) {
                debug!(
                    cache = %self.cache_name,
                    "Clients still controlled by the active generation, staying in waiting"
                );
                return Ok(false);
            }
        }

        self.activate().await?;
        Ok(true)
    }

    /// Skip-waiting: promote this generation now if it is waiting.
    pub async fn skip_waiting(&self) -> Result<()> {
        if self.state().await != ServiceWorkerState::Installed {
            debug!(cache = %self.cache_name, "Skip waiting ignored, generation is not waiting");
            return Ok(());
        }
        self.activate().await
    }

    async fn delete_stale_caches(&self) -> Result<usize> {
        let mut deleted = 0;
        for name in self.host.caches.keys().await? {
            if name != self.cache_name {
                info!(cache = %name, "Deleting old cache");
                if self.host.caches.delete(&name).await? {
                    deleted += 1;
                }
            }
        }
        Ok(deleted)
    }

    async fn broadcast_activated(&self) {
        let clients = match self.host.clients.match_all().await {
            Ok(clients) => clients,
            Err(e) => {
                warn!(error = %e, "Failed to list clients");
                return;
            }
        };

        let message = AgentMessage::SwActivated {
            version: self.config.version.clone(),
            timestamp: now_millis(),
        };
        for client in clients {
            if let Err(e) = self.host.clients.post_message(&client.id, &message).await {
                warn!(client = %client.id, error = %e, "Failed to notify client");
            }
        }
    }

    // ==================== Fetch ====================

    /// Fetch event: cache-first for same-origin GETs outside the API prefixes.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> FetchOutcome {
        if self.state().await != ServiceWorkerState::Activated {
            return FetchOutcome::Passthrough;
        }

        if request.url.origin() != self.config.origin.origin() {
            debug!(url = %request.url, "Cross-origin request, not intercepted");
            return FetchOutcome::Passthrough;
        }

        if self.config.is_bypassed(request.url.path()) {
            debug!(url = %request.url, "API request, not intercepted");
            return FetchOutcome::Passthrough;
        }

        if request.method != Method::GET {
            return FetchOutcome::Passthrough;
        }

        let key = request.cache_key();
        match self.host.caches.match_request(&self.cache_name, &key).await {
            Ok(Some(entry)) => {
                let age_ms = now_millis().saturating_sub(entry.cached_at);
                debug!(url = %request.url, age_ms, "Serving from cache");
                return FetchOutcome::Respond(entry.to_response());
            }
            Ok(None) => {}
            Err(e) => {
                warn!(url = %request.url, error = %e, "Cache lookup failed, using network");
                return FetchOutcome::Respond(self.fetch_network(request).await);
            }
        }

        let response = self.fetch_network(request).await;
        if response.is_cacheable() {
            if let Err(e) = self.store(&key, response.clone()).await {
                warn!(url = %request.url, error = %e, "Failed to cache response");
            }
        }
        FetchOutcome::Respond(response)
    }

    async fn fetch_network(&self, request: &FetchRequest) -> FetchResponse {
        match self.host.network.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %request.url, error = %e, "Network fetch failed");
                FetchResponse::network_error()
            }
        }
    }

    async fn store(&self, key: &str, response: FetchResponse) -> Result<()> {
        self.host.caches.put(&self.cache_name, key, response).await?;
        if let Some(limit) = self.config.max_dynamic_entries {
            self.trim_cache(limit).await?;
        }
        Ok(())
    }

    /// Evict the oldest runtime-cached entries beyond `limit`. Static assets stay.
    async fn trim_cache(&self, limit: usize) -> Result<usize> {
        let dynamic: Vec<String> = self
            .host
            .caches
            .entry_keys(&self.cache_name)
            .await?
            .into_iter()
            .filter(|key| !self.static_keys.contains(key))
            .collect();

        if dynamic.len() <= limit {
            return Ok(0);
        }

        let excess = dynamic.len() - limit;
        for key in dynamic.iter().take(excess) {
            self.host.caches.delete_entry(&self.cache_name, key).await?;
        }
        debug!(cache = %self.cache_name, evicted = excess, "Cleaned old cache entries");
        Ok(excess)
    }

    // ==================== Messages ====================

    /// Message event with an undecoded payload. Unknown messages are ignored.
    pub async fn handle_raw_message(&self, data: JsonValue) -> Option<MessageReply> {
        match ClientMessage::from_value(data) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognized message");
                None
            }
        }
    }

    /// Message event. Returns the reply to post back, if the message has one.
    pub async fn handle_message(&self, message: ClientMessage) -> Option<MessageReply> {
        match message {
            ClientMessage::SkipWaiting => {
                if let Err(e) = self.skip_waiting().await {
                    error!(error = %e, "Skip waiting failed");
                }
                None
            }
            ClientMessage::ShowNotification { title, options } => {
                let options = NotificationOptions::from_message(options, &self.config.notification);
                self.show_notification(&title, &options).await;
                None
            }
            ClientMessage::ClearCache => Some(self.clear_caches().await),
        }
    }

    async fn clear_caches(&self) -> MessageReply {
        let names = match self.host.caches.keys().await {
            Ok(names) => names,
            Err(e) => {
                error!(error = %e, "Failed to list caches");
                return MessageReply { success: false };
            }
        };

        let mut success = true;
        for name in names {
            if let Err(e) = self.host.caches.delete(&name).await {
                error!(cache = %name, error = %e, "Failed to delete cache");
                success = false;
            }
        }
        if success {
            info!("All caches cleared");
        }
        MessageReply { success }
    }

    // ==================== Notifications ====================

    /// Push event. Pushes without a usable payload show nothing.
    pub async fn handle_push(&self, event: &PushEvent) -> Option<DisplayedNotification> {
        let payload = match event.payload() {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!("Push without data, ignored");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "Malformed push payload, ignored");
                return None;
            }
        };

        let options =
            NotificationOptions::from_push(&payload, &self.config.notification, now_millis());
        self.show_notification(&payload.title, &options).await
    }

    /// Notification click: close it, then open or focus its target window.
    /// The dismiss action only closes.
    pub async fn handle_notification_click(&self, click: &NotificationClick) -> Option<Client> {
        let notification = &click.notification;
        if let Err(e) = self.host.notifications.close(notification.id).await {
            warn!(notification = notification.id, error = %e, "Failed to close notification");
        }

        if click.action.as_deref() == Some(DISMISS_ACTION) {
            debug!(notification = notification.id, "Notification dismissed");
            return None;
        }

        let target = notification
            .options
            .target_url()
            .unwrap_or(self.config.notification.default_url.as_str());

        match self.open_or_focus(target).await {
            Ok(client) => {
                info!(client = %client.id, url = %client.url, "Notification target opened");
                Some(client)
            }
            Err(e) => {
                warn!(url = target, error = %e, "Failed to open notification target");
                None
            }
        }
    }

    async fn open_or_focus(&self, target: &str) -> Result<Client> {
        let url = self.config.origin.join(target)?;
        let clients = self.host.clients.match_all().await?;

        match clients
            .iter()
            .find(|client| client.is_window() && client.url == url)
        {
            Some(existing) => self.host.clients.focus(&existing.id).await,
            None => self.host.clients.open_window(&url, self.id).await,
        }
    }

    async fn show_notification(
        &self,
        title: &str,
        options: &NotificationOptions,
    ) -> Option<DisplayedNotification> {
        match self.host.notifications.show(title, options).await {
            Ok(notification) => {
                debug!(title, tag = ?options.tag, "Notification shown");
                Some(notification)
            }
            Err(e) => {
                error!(title, error = %e, "Failed to show notification");
                None
            }
        }
    }
}
