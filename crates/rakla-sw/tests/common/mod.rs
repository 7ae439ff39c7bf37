//! Shared test doubles for the agent integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rakla_sw::{
    AgentConfig, CacheEntry, CacheStore, ClientRegistry, DisplayedNotification, FetchRequest,
    FetchResponse, HostServices, MemoryCacheStorage, Network, NotificationCenter,
    NotificationOptions, NotificationSurface, Registration, Result, ServiceWorkerAgent,
    ServiceWorkerError,
};
use tokio::sync::RwLock;
use url::Url;

pub const ORIGIN: &str = "https://rakla.app/";

pub fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn config() -> AgentConfig {
    AgentConfig {
        origin: Url::parse(ORIGIN).unwrap(),
        ..Default::default()
    }
}

// ==================== Network ====================

/// Network double answering from a script and counting calls.
#[derive(Default)]
pub struct ScriptedNetwork {
    responses: Mutex<HashMap<String, std::result::Result<FetchResponse, String>>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Network that serves every static asset of the default config.
    pub fn serving_static_assets() -> Self {
        let network = Self::new();
        for path in ["/", "/index.html", "/manifest.json"] {
            network.respond(path, FetchResponse::new(200, format!("asset {}", path)));
        }
        network
    }

    pub fn respond(&self, path: &str, response: FetchResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url(path).to_string(), Ok(response));
    }

    pub fn respond_url(&self, url: &Url, response: FetchResponse) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(response));
    }

    pub fn fail(&self, path: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url(path).to_string(), Err("connection refused".to_string()));
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls_for(&self, path: &str) -> usize {
        let target = url(path).to_string();
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| **call == target)
            .count()
    }

    pub fn reset_calls(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl Network for ScriptedNetwork {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        // Fragments never reach the server.
        let key = request.cache_key();
        self.calls.lock().unwrap().push(key.clone());

        match self.responses.lock().unwrap().get(&key) {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(reason)) => Err(ServiceWorkerError::Network(reason.clone())),
            None => Ok(FetchResponse::new(404, "not found")),
        }
    }
}

// ==================== Cache ====================

/// Cache store whose reads and writes can be switched to fail.
#[derive(Default)]
pub struct FlakyCacheStore {
    pub inner: MemoryCacheStorage,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

impl FlakyCacheStore {
    fn read_guard(&self) -> Result<()> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(ServiceWorkerError::Cache("storage unavailable".to_string()));
        }
        Ok(())
    }

    fn write_guard(&self) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ServiceWorkerError::Cache("quota exceeded".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for FlakyCacheStore {
    async fn open(&self, name: &str) -> Result<()> {
        self.write_guard()?;
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool> {
        self.read_guard()?;
        self.inner.has(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        self.write_guard()?;
        self.inner.delete(name).await
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.read_guard()?;
        self.inner.keys().await
    }

    async fn match_request(&self, name: &str, url: &str) -> Result<Option<CacheEntry>> {
        self.read_guard()?;
        self.inner.match_request(name, url).await
    }

    async fn put(&self, name: &str, url: &str, response: FetchResponse) -> Result<()> {
        self.write_guard()?;
        self.inner.put(name, url, response).await
    }

    async fn put_all(&self, name: &str, entries: Vec<(String, FetchResponse)>) -> Result<()> {
        self.write_guard()?;
        self.inner.put_all(name, entries).await
    }

    async fn entry_keys(&self, name: &str) -> Result<Vec<String>> {
        self.read_guard()?;
        self.inner.entry_keys(name).await
    }

    async fn delete_entry(&self, name: &str, url: &str) -> Result<bool> {
        self.write_guard()?;
        self.inner.delete_entry(name, url).await
    }
}

// ==================== Notifications ====================

/// Notification surface that always refuses to display.
#[derive(Default)]
pub struct DeniedSurface {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl NotificationSurface for DeniedSurface {
    async fn show(&self, _title: &str, _options: &NotificationOptions) -> Result<DisplayedNotification> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ServiceWorkerError::Notification(
            "permission denied".to_string(),
        ))
    }

    async fn close(&self, _id: u64) -> Result<()> {
        Err(ServiceWorkerError::Notification("not shown".to_string()))
    }
}

// ==================== Harness ====================

/// An agent wired to in-memory host services.
pub struct Harness {
    pub agent: ServiceWorkerAgent,
    pub caches: Arc<MemoryCacheStorage>,
    pub network: Arc<ScriptedNetwork>,
    pub notifications: Arc<NotificationCenter>,
    pub clients: Arc<ClientRegistry>,
    pub registration: Arc<RwLock<Registration>>,
}

impl Harness {
    pub fn new(config: AgentConfig) -> Self {
        Self::with_network(config, ScriptedNetwork::serving_static_assets())
    }

    pub fn with_network(config: AgentConfig, network: ScriptedNetwork) -> Self {
        let caches = Arc::new(MemoryCacheStorage::new());
        let network = Arc::new(network);
        let notifications = Arc::new(NotificationCenter::new());
        let clients = Arc::new(ClientRegistry::new());
        let registration = Arc::new(RwLock::new(Registration::new()));

        let host = HostServices {
            caches: caches.clone(),
            network: network.clone(),
            notifications: notifications.clone(),
            clients: clients.clone(),
            registration: registration.clone(),
        };

        Self {
            agent: ServiceWorkerAgent::new(config, host).unwrap(),
            caches,
            network,
            notifications,
            clients,
            registration,
        }
    }

    /// Another generation sharing this harness' host services.
    pub fn next_generation(&self, config: AgentConfig) -> ServiceWorkerAgent {
        ServiceWorkerAgent::new(config, self.host()).unwrap()
    }

    pub fn host(&self) -> HostServices {
        HostServices {
            caches: self.caches.clone(),
            network: self.network.clone(),
            notifications: self.notifications.clone(),
            clients: self.clients.clone(),
            registration: self.registration.clone(),
        }
    }

    /// Install and activate, then forget the network calls made doing so.
    pub async fn activated(config: AgentConfig) -> Self {
        let harness = Self::new(config);
        harness.agent.install().await.unwrap();
        harness.agent.activate().await.unwrap();
        harness.network.reset_calls();
        harness
    }
}
