//! Keyed TTL flags used for job deduplication and negative caching (spec.md
//! §4.1), grounded in `querymt::mcp::cache::RegistryCache`'s TTL-staleness
//! check and `querymt::session::in_memory::InMemorySessionStore`'s
//! `Arc<Mutex<HashMap<_, _>>>` shape.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::RegistryError;

/// A keyed flag service with TTL semantics (spec.md §4.1). Every operation
/// is advisory: a backend error must never crash a request, so callers are
/// expected to treat `Err` the same as "unknown" and fall through to
/// [`crate::store::ChapterStore`].
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Atomically sets `key` to present with the given TTL, but only if it
    /// wasn't already present (and not expired). Returns `true` if this call
    /// won the race.
    async fn try_set(&self, key: &str, ttl: Duration) -> Result<bool, RegistryError>;

    /// Whether `key` is currently present and unexpired.
    async fn exists(&self, key: &str) -> Result<bool, RegistryError>;

    /// Extends `key`'s expiry to `ttl` from now. A no-op if `key` isn't set.
    async fn refresh(&self, key: &str, ttl: Duration) -> Result<(), RegistryError>;

    /// Removes `key` regardless of its expiry.
    async fn clear(&self, key: &str) -> Result<(), RegistryError>;
}

/// `summarizing(vid)` key, namespaced to avoid collision with `no_captions_key`.
pub fn summarizing_key(vid: &str) -> String {
    format!("summarizing:{vid}")
}

/// `no-captions(vid)` key.
pub fn no_captions_key(vid: &str) -> String {
    format!("no-captions:{vid}")
}

/// In-process implementation backed by a lock-guarded map of expiry
/// instants. Suitable for a single-process deployment or for tests; a
/// multi-process deployment needs a shared backend (Redis, etc.) behind the
/// same trait.
#[derive(Default)]
pub struct InMemoryJobRegistry {
    entries: Arc<Mutex<HashMap<String, Instant>>>,
}

impl InMemoryJobRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRegistry for InMemoryJobRegistry {
    async fn try_set(&self, key: &str, ttl: Duration) -> Result<bool, RegistryError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        if let Some(expires_at) = entries.get(key) {
            if *expires_at > now {
                return Ok(false);
            }
        }
        entries.insert(key.to_string(), now + ttl);
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, RegistryError> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get(key) {
            Some(expires_at) if *expires_at > now => Ok(true),
            Some(_) => {
                entries.remove(key);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn refresh(&self, key: &str, ttl: Duration) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().await;
        if let Some(expires_at) = entries.get_mut(key) {
            *expires_at = Instant::now() + ttl;
        }
        Ok(())
    }

    async fn clear(&self, key: &str) -> Result<(), RegistryError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn try_set_wins_once_then_loses_until_cleared() {
        let registry = InMemoryJobRegistry::new();
        let key = summarizing_key("vid1");
        assert!(registry.try_set(&key, Duration::from_secs(60)).await.unwrap());
        assert!(!registry.try_set(&key, Duration::from_secs(60)).await.unwrap());
        assert!(registry.exists(&key).await.unwrap());

        registry.clear(&key).await.unwrap();
        assert!(!registry.exists(&key).await.unwrap());
        assert!(registry.try_set(&key, Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn entries_expire_after_their_ttl() {
        let registry = InMemoryJobRegistry::new();
        let key = no_captions_key("vid2");
        assert!(registry.try_set(&key, Duration::from_millis(10)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!registry.exists(&key).await.unwrap());
        // Expiry frees the key up for a fresh try_set.
        assert!(registry.try_set(&key, Duration::from_secs(60)).await.unwrap());
    }

    #[tokio::test]
    async fn refresh_extends_expiry() {
        let registry = InMemoryJobRegistry::new();
        let key = summarizing_key("vid3");
        registry.try_set(&key, Duration::from_millis(10)).await.unwrap();
        registry.refresh(&key, Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(registry.exists(&key).await.unwrap());
    }

    #[tokio::test]
    async fn refresh_on_missing_key_is_a_no_op() {
        let registry = InMemoryJobRegistry::new();
        registry.refresh("absent", Duration::from_secs(60)).await.unwrap();
        assert!(!registry.exists("absent").await.unwrap());
    }
}
