//! Agent configuration

use serde::{Deserialize, Serialize};
use url::Url;

/// Offline agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Origin the agent is registered for. Static assets resolve against it.
    pub origin: Url,

    /// Cache store name prefix
    pub cache_prefix: String,

    /// Generation version. Bumping it invalidates every cached asset.
    pub version: String,

    /// Root-relative paths cached at install time
    pub static_assets: Vec<String>,

    /// Path prefixes reserved for live API traffic; never intercepted
    pub bypass_prefixes: Vec<String>,

    /// Maximum number of runtime-cached entries kept next to the static set
    pub max_dynamic_entries: Option<usize>,

    /// Notification defaults
    pub notification: NotificationDefaults,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    /// Icon shown when the caller gives none
    pub icon: String,

    /// Badge shown when the caller gives none
    pub badge: String,

    /// Vibration pattern in milliseconds
    pub vibrate: Vec<u32>,

    /// Tag for pushes that carry none
    pub default_tag: String,

    /// Click target for pushes that carry none
    pub default_url: String,
}

impl AgentConfig {
    /// Name of the cache store for this generation, e.g. `rakla-pwa-v1.5.0`.
    pub fn cache_name(&self) -> String {
        format!("{}-{}", self.cache_prefix, self.version)
    }

    /// Whether `path` falls under a reserved API prefix.
    pub fn is_bypassed(&self, path: &str) -> bool {
        self.bypass_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Static asset URLs resolved against the origin, in declaration order.
    pub fn static_asset_urls(&self) -> Result<Vec<Url>, url::ParseError> {
        self.static_assets
            .iter()
            .map(|path| self.origin.join(path))
            .collect()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            origin: Url::parse("http://localhost:5173/").expect("static origin is valid"),
            cache_prefix: "rakla-pwa".to_string(),
            version: "v1.5.0".to_string(),
            static_assets: vec![
                "/".to_string(),
                "/index.html".to_string(),
                "/manifest.json".to_string(),
            ],
            bypass_prefixes: vec!["/rest/v1/".to_string(), "/auth/v1/".to_string()],
            max_dynamic_entries: Some(100),
            notification: NotificationDefaults::default(),
        }
    }
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            icon: "/icons/pwa-192x192.png".to_string(),
            badge: "/icons/pwa-192x192.png".to_string(),
            vibrate: vec![200, 100, 200, 100, 200],
            default_tag: "notification".to_string(),
            default_url: "/".to_string(),
        }
    }
}
