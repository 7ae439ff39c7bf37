//! Event dispatch between the JSON-line protocol and the agent.

use std::sync::Arc;

use http::Method;
use rakla_common::{OptionExt, RaklaError, Result, ResultExt};
use rakla_sw::{
    AgentConfig, CacheStore, Client, ClientHost, ClientRegistry, FetchOutcome, FetchRequest,
    HostServices, MemoryCacheStorage, MessageReply, Network, NotificationCenter,
    NotificationClick, PushEvent, Registration, ServiceWorkerAgent, ServiceWorkerState,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// One input line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    Fetch {
        url: String,
        #[serde(default)]
        method: Option<String>,
    },
    Message {
        data: JsonValue,
    },
    /// `data` is the push body: a JSON value, or a string sent as raw bytes.
    Push {
        #[serde(default)]
        data: Option<JsonValue>,
    },
    NotificationClick {
        id: u64,
        #[serde(default)]
        action: Option<String>,
    },
    OpenClient {
        url: String,
    },
    State,
}

/// One output line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Passthrough,
    Respond {
        status: u16,
        from_cache: bool,
    },
    Handled {
        #[serde(skip_serializing_if = "Option::is_none")]
        reply: Option<MessageReply>,
        #[serde(skip_serializing_if = "Option::is_none")]
        notification: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        client: Option<String>,
    },
    Client {
        id: String,
        url: String,
    },
    State {
        state: String,
        caches: Vec<CacheSummary>,
        notifications: Vec<NotificationSummary>,
        clients: usize,
    },
    Error {
        message: String,
    },
}

impl Outcome {
    fn notification(notification: Option<u64>) -> Self {
        Self::Handled {
            reply: None,
            notification,
            client: None,
        }
    }

    fn client(client: Option<String>) -> Self {
        Self::Handled {
            reply: None,
            notification: None,
            client,
        }
    }

    pub fn error(err: &RaklaError) -> Self {
        Self::Error {
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSummary {
    pub name: String,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationSummary {
    pub id: u64,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

/// An agent generation wired to in-process host services.
pub struct Host {
    agent: ServiceWorkerAgent,
    caches: Arc<MemoryCacheStorage>,
    notifications: Arc<NotificationCenter>,
    clients: Arc<ClientRegistry>,
}

impl Host {
    pub fn new(config: AgentConfig, network: Arc<dyn Network>) -> Result<Self> {
        let caches = Arc::new(MemoryCacheStorage::new());
        let notifications = Arc::new(NotificationCenter::new());
        let clients = Arc::new(ClientRegistry::new());

        let services = HostServices {
            caches: caches.clone(),
            network,
            notifications: notifications.clone(),
            clients: clients.clone(),
            registration: Arc::new(RwLock::new(Registration::new())),
        };
        let agent = ServiceWorkerAgent::new(config, services).context("invalid agent config")?;

        Ok(Self {
            agent,
            caches,
            notifications,
            clients,
        })
    }

    pub fn agent(&self) -> &ServiceWorkerAgent {
        &self.agent
    }

    /// Install the generation and activate it if nothing holds it back.
    pub async fn start(&self) -> Result<()> {
        self.agent.install().await.context("install failed")?;
        let activated = self
            .agent
            .try_activate_waiting()
            .await
            .context("activation failed")?;
        info!(cache = %self.agent.cache_name(), activated, "Agent started");
        Ok(())
    }

    /// Decode and dispatch one input line.
    pub async fn handle_line(&self, line: &str) -> Outcome {
        let event = match serde_json::from_str::<HostEvent>(line) {
            Ok(event) => event,
            Err(e) => return Outcome::error(&e.into()),
        };

        match self.dispatch(event).await {
            Ok(outcome) => outcome,
            Err(e) => {
                debug!(category = e.category(), error = %e, "Event rejected");
                Outcome::error(&e)
            }
        }
    }

    pub async fn dispatch(&self, event: HostEvent) -> Result<Outcome> {
        match event {
            HostEvent::Fetch { url, method } => {
                let url = self.resolve(&url)?;
                let method = match method {
                    Some(method) => Method::from_bytes(method.as_bytes()).map_err(|_| {
                        RaklaError::InvalidArgument(format!("invalid method: {}", method))
                    })?,
                    None => Method::GET,
                };

                Ok(
                    match self.agent.handle_fetch(&FetchRequest::new(method, url)).await {
                        FetchOutcome::Passthrough => Outcome::Passthrough,
                        FetchOutcome::Respond(response) => Outcome::Respond {
                            status: response.status,
                            from_cache: response.from_cache,
                        },
                    },
                )
            }
            HostEvent::Message { data } => Ok(Outcome::Handled {
                reply: self.agent.handle_raw_message(data).await,
                notification: None,
                client: None,
            }),
            HostEvent::Push { data } => {
                let event = match data {
                    None | Some(JsonValue::Null) => PushEvent::empty(),
                    Some(JsonValue::String(raw)) => PushEvent::with_data(raw),
                    Some(value) => PushEvent::with_json(&value),
                };
                let shown = self.agent.handle_push(&event).await;
                Ok(Outcome::notification(shown.map(|n| n.id)))
            }
            HostEvent::NotificationClick { id, action } => {
                let notification = self
                    .notifications
                    .get(id)
                    .await
                    .ok_or_not_found(format!("notification {}", id))?;
                let mut click = NotificationClick::new(notification);
                click.action = action;

                let client = self.agent.handle_notification_click(&click).await;
                Ok(Outcome::client(client.map(|c| c.id)))
            }
            HostEvent::OpenClient { url } => {
                let mut client = Client::window(self.resolve(&url)?);
                if self.agent.state().await == ServiceWorkerState::Activated {
                    client.controller = Some(self.agent.id());
                }
                self.clients.add(client.clone()).await;
                Ok(Outcome::Client {
                    id: client.id,
                    url: client.url.to_string(),
                })
            }
            HostEvent::State => self.state().await,
        }
    }

    async fn state(&self) -> Result<Outcome> {
        let mut caches = Vec::new();
        for name in self.caches.keys().await.context("failed to list caches")? {
            let entries = self.caches.entry_count(&name).await.unwrap_or(0);
            caches.push(CacheSummary { name, entries });
        }
        let clients = self
            .clients
            .match_all()
            .await
            .context("failed to list clients")?;
        let notifications = self
            .notifications
            .displayed()
            .await
            .into_iter()
            .map(|n| NotificationSummary {
                id: n.id,
                title: n.title,
                tag: n.options.tag,
            })
            .collect();

        Ok(Outcome::State {
            state: format!("{:?}", self.agent.state().await).to_lowercase(),
            caches,
            notifications,
            clients: clients.len(),
        })
    }

    fn resolve(&self, url: &str) -> Result<url::Url> {
        self.agent
            .config()
            .origin
            .join(url)
            .map_err(|e| RaklaError::InvalidArgument(format!("invalid url {}: {}", url, e)))
    }
}
