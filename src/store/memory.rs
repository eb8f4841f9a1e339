//! In-process key-value store with TTL expiry
//!
//! Behaves like the remote store (string payloads, `EX` expiry, glob key
//! listing) without the network. Used when no endpoint is configured and as
//! the store under test.

use crate::clock::{SharedClock, SystemClock};
use crate::store::pattern::glob_match;
use crate::store::wire::{decode_value, encode_value};
use crate::store::KeyValueStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// A stored payload and its expiry
#[derive(Debug, Clone)]
struct StoredEntry {
    raw: String,
    expires_at: DateTime<Utc>,
}

impl StoredEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// In-memory store honouring per-key TTLs
#[derive(Debug)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, StoredEntry>>,
    clock: SharedClock,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Create an empty store on the system clock
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store reading time from `clock`
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// List live keys matching a glob pattern
    pub async fn keys(&self, pattern: &str) -> Vec<String> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Raw stored string for a key, if live
    pub async fn get_raw(&self, key: &str) -> Option<String> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.raw.clone())
    }

    /// Remaining lifetime of a key, if live
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entries = self.entries.read().await;
        let entry = entries.get(key).filter(|entry| !entry.is_expired(now))?;
        (entry.expires_at - now).to_std().ok()
    }

    /// Number of stored entries, expired ones not yet purged included
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Check if the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Remove every expired entry, returning how many were dropped
    pub async fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        let purged = before - entries.len();
        if purged > 0 {
            debug!("Purged {} expired entries", purged);
        }
        purged
    }
}

/// Background task that periodically purges expired entries
pub async fn start_auto_purge(store: Arc<InMemoryStore>, interval: Duration) {
    info!("Starting in-memory store purge task (interval: {:?})", interval);

    loop {
        tokio::time::sleep(interval).await;
        store.purge_expired().await;
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now();
        let mut entries = self.entries.write().await;

        match entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                debug!("Store entry expired: {}", key);
                entries.remove(key);
                None
            }
            Some(entry) => Some(decode_value(&entry.raw)),
            None => None,
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl_seconds: u64) -> bool {
        if ttl_seconds == 0 {
            warn!("Refusing to store {} with a zero TTL", key);
            return false;
        }

        let ttl = match chrono::Duration::from_std(Duration::from_secs(ttl_seconds)) {
            Ok(ttl) => ttl,
            Err(_) => {
                warn!("TTL of {}s for {} is out of range", ttl_seconds, key);
                return false;
            }
        };

        let entry = StoredEntry {
            raw: encode_value(value),
            expires_at: self.clock.now() + ttl,
        };
        self.entries.write().await.insert(key.to_string(), entry);
        true
    }

    async fn delete(&self, key: &str) -> bool {
        self.entries.write().await.remove(key);
        true
    }

    async fn delete_pattern(&self, pattern: &str) -> bool {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !glob_match(pattern, key));
        debug!("Deleted {} keys matching {}", before - entries.len(), pattern);
        true
    }

    async fn ping(&self) -> bool {
        true
    }
}
