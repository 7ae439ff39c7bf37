//! Cache storage: named, origin-scoped stores of request URL → response.

use async_trait::async_trait;
use hashbrown::HashMap;
use tokio::sync::RwLock;
use tracing::trace;

use crate::fetch::FetchResponse;
use crate::{now_millis, Result};

/// A cached request/response pair.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Request URL.
    pub url: String,

    /// Stored response snapshot.
    pub response: FetchResponse,

    /// Cached at timestamp (ms since epoch).
    pub cached_at: u64,
}

impl CacheEntry {
    /// Response to hand back to the page, marked as served from cache.
    pub fn to_response(&self) -> FetchResponse {
        let mut response = self.response.clone();
        response.from_cache = true;
        response
    }
}

/// Origin-scoped cache storage (the `caches` global).
///
/// Every method is fallible so hosts backed by real storage can report quota
/// or I/O failures; the agent decides which failures are fatal.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Open a cache, creating it if it doesn't exist.
    async fn open(&self, name: &str) -> Result<()>;

    /// Check if a cache exists.
    async fn has(&self, name: &str) -> Result<bool>;

    /// Delete a cache. Returns whether it existed.
    async fn delete(&self, name: &str) -> Result<bool>;

    /// Names of all caches.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Look up a request URL in one cache.
    async fn match_request(&self, name: &str, url: &str) -> Result<Option<CacheEntry>>;

    /// Store a response, replacing any entry for the same URL.
    async fn put(&self, name: &str, url: &str, response: FetchResponse) -> Result<()>;

    /// Store several responses at once; either all are stored or none.
    async fn put_all(&self, name: &str, entries: Vec<(String, FetchResponse)>) -> Result<()>;

    /// URLs stored in one cache, oldest first.
    async fn entry_keys(&self, name: &str) -> Result<Vec<String>>;

    /// Delete one entry. Returns whether it existed.
    async fn delete_entry(&self, name: &str, url: &str) -> Result<bool>;
}

// ==================== Cache ====================

/// Entries of one cache, keyed by request URL.
#[derive(Debug, Default)]
pub struct Cache {
    entries: HashMap<String, CacheEntry>,

    /// Insertion order, oldest first.
    order: Vec<String>,
}

impl Cache {
    /// Create a new cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a request.
    pub fn match_request(&self, url: &str) -> Option<&CacheEntry> {
        self.entries.get(url)
    }

    /// Add entry. A replaced entry moves to the newest position.
    pub fn put(&mut self, url: &str, response: FetchResponse) {
        let entry = CacheEntry {
            url: url.to_string(),
            response,
            cached_at: now_millis(),
        };
        if self.entries.insert(url.to_string(), entry).is_some() {
            self.order.retain(|key| key != url);
        }
        self.order.push(url.to_string());
    }

    /// Delete entry.
    pub fn delete(&mut self, url: &str) -> bool {
        let removed = self.entries.remove(url).is_some();
        if removed {
            self.order.retain(|key| key != url);
        }
        removed
    }

    /// Get all keys (URLs), oldest first.
    pub fn keys(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==================== Memory Cache Storage ====================

/// In-memory [`CacheStore`].
#[derive(Debug, Default)]
pub struct MemoryCacheStorage {
    caches: RwLock<HashMap<String, Cache>>,
}

impl MemoryCacheStorage {
    /// Create new cache storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a cache, if it exists.
    pub async fn entry_count(&self, name: &str) -> Option<usize> {
        self.caches.read().await.get(name).map(Cache::len)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStorage {
    async fn open(&self, name: &str) -> Result<()> {
        self.caches.write().await.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn has(&self, name: &str) -> Result<bool> {
        Ok(self.caches.read().await.contains_key(name))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.caches.write().await.remove(name).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn match_request(&self, name: &str, url: &str) -> Result<Option<CacheEntry>> {
        let caches = self.caches.read().await;
        Ok(caches
            .get(name)
            .and_then(|cache| cache.match_request(url))
            .cloned())
    }

    async fn put(&self, name: &str, url: &str, response: FetchResponse) -> Result<()> {
        trace!(cache = name, url, "Cache put");
        self.caches
            .write()
            .await
            .entry(name.to_string())
            .or_default()
            .put(url, response);
        Ok(())
    }

    async fn put_all(&self, name: &str, entries: Vec<(String, FetchResponse)>) -> Result<()> {
        let mut caches = self.caches.write().await;
        let cache = caches.entry(name.to_string()).or_default();
        for (url, response) in entries {
            cache.put(&url, response);
        }
        Ok(())
    }

    async fn entry_keys(&self, name: &str) -> Result<Vec<String>> {
        let caches = self.caches.read().await;
        Ok(caches
            .get(name)
            .map(|cache| cache.keys().into_iter().map(str::to_string).collect())
            .unwrap_or_default())
    }

    async fn delete_entry(&self, name: &str, url: &str) -> Result<bool> {
        let mut caches = self.caches.write().await;
        Ok(caches
            .get_mut(name)
            .map(|cache| cache.delete(url))
            .unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache() {
        let mut cache = Cache::new();

        cache.put("https://rakla.app/style.css", FetchResponse::new(200, "body{}"));

        assert!(cache.match_request("https://rakla.app/style.css").is_some());
        assert!(cache.match_request("https://rakla.app/other.css").is_none());
    }

    #[test]
    fn test_cache_overwrite_moves_to_newest() {
        let mut cache = Cache::new();
        cache.put("https://rakla.app/a.js", FetchResponse::new(200, "a1"));
        cache.put("https://rakla.app/b.js", FetchResponse::new(200, "b"));
        cache.put("https://rakla.app/a.js", FetchResponse::new(200, "a2"));

        assert_eq!(cache.len(), 2);
        assert_eq!(
            cache.keys(),
            vec!["https://rakla.app/b.js", "https://rakla.app/a.js"]
        );
        let entry = cache.match_request("https://rakla.app/a.js").unwrap();
        assert_eq!(entry.response.body.as_ref(), b"a2");
    }

    #[test]
    fn test_cache_delete() {
        let mut cache = Cache::new();

        cache.put("https://rakla.app/style.css", FetchResponse::new(200, ""));
        assert!(cache.delete("https://rakla.app/style.css"));
        assert!(!cache.delete("https://rakla.app/style.css"));
        assert!(cache.is_empty());
        assert!(cache.keys().is_empty());
    }

    #[test]
    fn test_entry_marks_from_cache() {
        let mut cache = Cache::new();
        cache.put("https://rakla.app/", FetchResponse::new(200, "<html>"));

        let response = cache.match_request("https://rakla.app/").unwrap().to_response();
        assert!(response.from_cache);
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryCacheStorage::new();

        assert!(!storage.has("v1").await.unwrap());

        storage.open("v1").await.unwrap();
        storage.open("v0").await.unwrap();
        assert!(storage.has("v1").await.unwrap());
        assert_eq!(storage.keys().await.unwrap(), vec!["v0", "v1"]);

        assert!(storage.delete("v1").await.unwrap());
        assert!(!storage.has("v1").await.unwrap());
        assert!(!storage.delete("v1").await.unwrap());
    }

    #[tokio::test]
    async fn test_memory_storage_entries() {
        let storage = MemoryCacheStorage::new();
        storage
            .put_all(
                "v1",
                vec![
                    ("https://rakla.app/".to_string(), FetchResponse::new(200, "")),
                    ("https://rakla.app/a".to_string(), FetchResponse::new(200, "")),
                ],
            )
            .await
            .unwrap();

        assert_eq!(storage.entry_count("v1").await, Some(2));
        assert!(storage
            .match_request("v1", "https://rakla.app/a")
            .await
            .unwrap()
            .is_some());
        assert!(storage
            .match_request("missing", "https://rakla.app/a")
            .await
            .unwrap()
            .is_none());

        assert!(storage.delete_entry("v1", "https://rakla.app/").await.unwrap());
        assert_eq!(
            storage.entry_keys("v1").await.unwrap(),
            vec!["https://rakla.app/a"]
        );
    }
}
