//! TTL-capable in-memory key-value map.
//!
//! Every write refreshes the entry's deadline; reads treat expired entries
//! as absent. The TTL is a leak safety net; owners are expected to delete
//! their keys explicitly.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

pub struct TtlMemoryStore<K, V>
where
    K: Eq + Hash + Send,
    V: Clone + Send,
{
    store: Mutex<HashMap<K, Entry<V>>>,
    ttl: Duration,
}

impl<K, V> TtlMemoryStore<K, V>
where
    K: Eq + Hash + Send + Clone + Sync,
    V: Clone + Send + Sync,
{
    pub fn new(ttl: Duration) -> Self {
        Self {
            store: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        let mut store = self.store.lock().await;
        if store.get(key).is_some_and(|e| e.expires_at <= Instant::now()) {
            store.remove(key);
            return None;
        }
        store.get(key).map(|e| e.value.clone())
    }

    pub async fn put(&self, key: K, value: V) {
        let mut store = self.store.lock().await;
        store.insert(
            key,
            Entry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub async fn contains(&self, key: &K) -> bool {
        self.get(key).await.is_some()
    }

    pub async fn remove(&self, key: &K) -> Option<V> {
        self.store.lock().await.remove(key).map(|e| e.value)
    }

    /// Run `f` against the live entry under the map lock, refreshing its
    /// TTL. Returns `None` if the key is absent or expired.
    pub async fn update<F, R>(&self, key: &K, f: F) -> Option<R>
    where
        F: FnOnce(&mut V) -> R,
    {
        let mut store = self.store.lock().await;
        let now = Instant::now();
        if store.get(key).is_some_and(|e| e.expires_at <= now) {
            store.remove(key);
            return None;
        }
        let entry = store.get_mut(key)?;
        let result = f(&mut entry.value);
        entry.expires_at = now + self.ttl;
        Some(result)
    }

    /// Like [`update`](Self::update), but inserts `default()` first when the
    /// key is absent or expired.
    pub async fn upsert<F, R>(&self, key: K, default: impl FnOnce() -> V, f: F) -> R
    where
        F: FnOnce(&mut V) -> R,
    {
        let mut store = self.store.lock().await;
        let now = Instant::now();
        if store.get(&key).is_some_and(|e| e.expires_at <= now) {
            store.remove(&key);
        }
        let entry = store.entry(key).or_insert_with(|| Entry {
            value: default(),
            expires_at: now + self.ttl,
        });
        let result = f(&mut entry.value);
        entry.expires_at = now + self.ttl;
        result
    }

    pub async fn values(&self) -> Vec<V> {
        let now = Instant::now();
        self.store
            .lock()
            .await
            .values()
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone())
            .collect()
    }

    /// Drop every expired entry.
    pub async fn purge_expired(&self) -> usize {
        let mut store = self.store.lock().await;
        let now = Instant::now();
        let before = store.len();
        store.retain(|_, e| e.expires_at > now);
        before - store.len()
    }
}
