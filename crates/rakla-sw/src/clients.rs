//! Clients API: the pages controlled by the agent.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

use crate::lifecycle::GenerationId;
use crate::message::AgentMessage;
use crate::{Result, ServiceWorkerError};

/// Client type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientType {
    #[default]
    Window,
    Worker,
}

/// A client (controlled page).
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Client URL.
    pub url: Url,

    pub client_type: ClientType,

    /// Whether focused.
    pub focused: bool,

    /// Generation controlling this client, if any.
    pub controller: Option<GenerationId>,
}

impl Client {
    /// Create an uncontrolled, unfocused window client.
    pub fn window(url: Url) -> Self {
        Self {
            id: next_client_id(),
            url,
            client_type: ClientType::Window,
            focused: false,
            controller: None,
        }
    }

    pub fn is_window(&self) -> bool {
        self.client_type == ClientType::Window
    }
}

fn next_client_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    format!("client-{}", COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Host side of the Clients API.
#[async_trait]
pub trait ClientHost: Send + Sync {
    /// Make every client controlled by `controller`. Returns the number claimed.
    async fn claim(&self, controller: GenerationId) -> Result<usize>;

    /// All clients of the origin.
    async fn match_all(&self) -> Result<Vec<Client>>;

    /// Open a new focused window at `url`, controlled by `controller`.
    async fn open_window(&self, url: &Url, controller: GenerationId) -> Result<Client>;

    /// Focus an existing window client.
    async fn focus(&self, id: &str) -> Result<Client>;

    /// Post a message to a client.
    async fn post_message(&self, id: &str, message: &AgentMessage) -> Result<()>;
}

/// In-memory [`ClientHost`].
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: RwLock<HashMap<String, Client>>,
    inboxes: RwLock<HashMap<String, Vec<AgentMessage>>>,
}

impl ClientRegistry {
    /// Create new clients manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client.
    pub async fn add(&self, client: Client) {
        self.clients.write().await.insert(client.id.clone(), client);
    }

    /// Remove a client.
    pub async fn remove(&self, id: &str) -> Option<Client> {
        self.inboxes.write().await.remove(id);
        self.clients.write().await.remove(id)
    }

    /// Get a client by ID.
    pub async fn get(&self, id: &str) -> Option<Client> {
        self.clients.read().await.get(id).cloned()
    }

    /// Messages posted to a client, oldest first.
    pub async fn messages_for(&self, id: &str) -> Vec<AgentMessage> {
        self.inboxes
            .read()
            .await
            .get(id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ClientHost for ClientRegistry {
    async fn claim(&self, controller: GenerationId) -> Result<usize> {
        let mut clients = self.clients.write().await;
        for client in clients.values_mut() {
            client.controller = Some(controller);
        }
        debug!(generation = controller.raw(), count = clients.len(), "Clients claimed");
        Ok(clients.len())
    }

    async fn match_all(&self) -> Result<Vec<Client>> {
        let mut clients: Vec<Client> = self.clients.read().await.values().cloned().collect();
        clients.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(clients)
    }

    async fn open_window(&self, url: &Url, controller: GenerationId) -> Result<Client> {
        let mut clients = self.clients.write().await;
        for other in clients.values_mut() {
            other.focused = false;
        }

        let client = Client {
            focused: true,
            controller: Some(controller),
            ..Client::window(url.clone())
        };
        clients.insert(client.id.clone(), client.clone());
        Ok(client)
    }

    async fn focus(&self, id: &str) -> Result<Client> {
        let mut clients = self.clients.write().await;
        match clients.get(id) {
            None => return Err(ServiceWorkerError::Client(format!("unknown client {}", id))),
            Some(client) if !client.is_window() => {
                return Err(ServiceWorkerError::Client(
                    "Can only focus window clients".to_string(),
                ))
            }
            Some(_) => {}
        }

        for client in clients.values_mut() {
            client.focused = client.id == id;
        }
        clients
            .get(id)
            .cloned()
            .ok_or_else(|| ServiceWorkerError::Client(format!("unknown client {}", id)))
    }

    async fn post_message(&self, id: &str, message: &AgentMessage) -> Result<()> {
        if !self.clients.read().await.contains_key(id) {
            return Err(ServiceWorkerError::Client(format!("unknown client {}", id)));
        }
        self.inboxes
            .write()
            .await
            .entry(id.to_string())
            .or_default()
            .push(message.clone());
        Ok(())
    }
}
