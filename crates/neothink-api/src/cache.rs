//! TTL cache for bridge documents.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;

/// Cache entry with expiration.
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    /// Unix timestamp in milliseconds.
    expires_at: i64,
}

impl CacheEntry {
    fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// In-memory JSON cache with a fixed TTL. Clones share entries.
#[derive(Clone)]
pub struct TtlCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value if present and not expired.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let now = now_millis();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    pub async fn put(&self, key: impl Into<String>, value: Value) {
        let entry = CacheEntry {
            value,
            expires_at: now_millis() + self.ttl.as_millis() as i64,
        };
        self.entries.write().await.insert(key.into(), entry);
    }

    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    /// Remove expired entries. Returns how many were removed.
    pub async fn cleanup(&self) -> usize {
        let now = now_millis();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub async fn stats(&self) -> CacheStats {
        let now = now_millis();
        let entries = self.entries.read().await;
        let active = entries.values().filter(|e| !e.is_expired(now)).count();
        CacheStats {
            total_entries: entries.len(),
            active_entries: active,
            expired_entries: entries.len() - active,
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total_entries: usize,
    pub active_entries: usize,
    pub expired_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_invalidate() {
        let cache = TtlCache::new(Duration::from_secs(300));
        cache.put("prefs:hub:u1", json!({ "theme": "dark" })).await;
        assert_eq!(
            cache.get("prefs:hub:u1").await,
            Some(json!({ "theme": "dark" }))
        );

        cache.invalidate("prefs:hub:u1").await;
        assert_eq!(cache.get("prefs:hub:u1").await, None);
    }

    #[tokio::test]
    async fn test_expiry_and_cleanup() {
        let cache = TtlCache::new(Duration::from_millis(20));
        cache.put("a", json!(1)).await;
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert_eq!(cache.get("a").await, None);
        assert_eq!(cache.stats().await.expired_entries, 1);
        assert_eq!(cache.cleanup().await, 1);
        assert_eq!(cache.stats().await.total_entries, 0);
    }
}
