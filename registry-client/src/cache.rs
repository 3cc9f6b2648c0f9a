//! A scoped, resettable memoization cache.
//!
//! Grounded on `release_cache`/`registry_cache` in the teacher's
//! `release_scrape_dockerv2::registry` module: an `Arc<RwLock<HashMap<K, V>>>`
//! that call sites clone cheaply and that a single entity can clear on
//! demand. Spec §4.1 requires the cache to be reset between execution
//! batches rather than living for the whole process, so unlike the teacher
//! (whose cache lives for the process lifetime) this one exposes an explicit
//! [`Cache::clear`].
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct Cache<K, V> {
    inner: Arc<RwLock<HashMap<K, V>>>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new() -> Self {
        Cache {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.inner.read().await.get(key).cloned()
    }

    pub async fn insert(&self, key: K, value: V) {
        self.inner.write().await.insert(key, value);
    }

    /// Get the memoized value for `key`, computing and storing it via `f` on
    /// a miss. `f` may be awaited concurrently by other callers racing on the
    /// same key; the last writer wins, which is harmless since `f` is
    /// expected to be idempotent (a registry digest/tag-list lookup).
    pub async fn get_or_try_insert_with<E, Fut>(
        &self,
        key: K,
        f: impl FnOnce() -> Fut,
    ) -> Result<V, E>
    where
        Fut: std::future::Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.get(&key).await {
            return Ok(value);
        }
        let value = f().await?;
        self.insert(key, value.clone()).await;
        Ok(value)
    }

    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }
}

impl<K, V> Default for Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
