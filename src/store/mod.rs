//! Key-value stores backing the read-through cache
//!
//! Every store is fail-open: operations never return errors. A failing
//! backend shows up as misses (`None`) and `false` acknowledgements, which
//! costs hit rate but never correctness.

pub mod breaker;
pub mod memory;
pub mod pattern;
pub mod remote;
pub mod wire;

use crate::config::{StoreConfig, ENV_ENDPOINT};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

pub use breaker::{BreakerState, CircuitBreaker};
pub use memory::InMemoryStore;
pub use pattern::{escape_glob, glob_match};
pub use remote::RemoteStore;

/// Uniform, fail-open interface to a key-value store
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &'static str;

    /// Fetch a value. `None` on a miss or on any failure.
    ///
    /// Stored strings that are not valid JSON come back as a JSON string.
    async fn get(&self, key: &str) -> Option<Value>;

    /// Store a value with an expiry. Strings are stored as-is, anything
    /// else as JSON text.
    async fn set(&self, key: &str, value: &Value, ttl_seconds: u64) -> bool;

    /// Remove a key. Removing an absent key is a success.
    async fn delete(&self, key: &str) -> bool;

    /// Remove every key matching a glob pattern. No match is a success.
    async fn delete_pattern(&self, pattern: &str) -> bool;

    /// Liveness probe, for diagnostics only
    async fn ping(&self) -> bool;
}

/// Shared store handle, constructed once and injected everywhere
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Build the store the environment asks for: the remote store when an
/// endpoint is configured, an in-memory store otherwise
pub fn from_env() -> Result<SharedStore> {
    dotenv::dotenv().ok();

    if std::env::var(ENV_ENDPOINT).map_or(true, |endpoint| endpoint.trim().is_empty()) {
        info!("{} not set, caching in memory", ENV_ENDPOINT);
        return Ok(Arc::new(InMemoryStore::new()));
    }

    Ok(Arc::new(RemoteStore::new(StoreConfig::from_env()?)?))
}
