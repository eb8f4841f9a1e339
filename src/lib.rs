//! # classcache
//!
//! Read-through caching for the aggregation queries of a classroom
//! management backend, over a remote key-value store reached through a
//! single HTTP endpoint.
//!
//! ## Features
//!
//! - Fail-open remote store client with a circuit breaker
//! - In-memory store with the same semantics, for tests and local runs
//! - Per-key queries with TTL, stale-while-revalidate and cancellation on
//!   key change
//! - Namespaced keys and invalidation triggers for domain mutations
//!
//! ## Remote Store
//!
//! Every store operation degrades to a miss or a `false` acknowledgement
//! when the backend is unreachable. After the first hard failure the
//! breaker opens and no further requests are sent.
//!
//! ```no_run
//! use classcache::{KeyValueStore, RemoteStore, StoreConfig};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = StoreConfig::builder()
//!         .endpoint("https://backend.example.test/functions/v1/cache")
//!         .token("service-token")
//!         .build();
//!     let store = RemoteStore::new(config)?;
//!
//!     println!("Store reachable: {}", store.ping().await);
//!     Ok(())
//! }
//! ```
//!
//! ## Cached Queries
//!
//! ```no_run
//! use classcache::cache::{keys, producer, CachePolicy};
//! use classcache::{ReadThroughCache, RemoteStore};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let cache = ReadThroughCache::new(Arc::new(RemoteStore::from_env()?));
//!
//!     let query = cache.query(
//!         CachePolicy::roster(),
//!         producer(|| async { Ok(vec!["ana".to_string(), "bruno".to_string()]) }),
//!     );
//!     query.set_key(Some(keys::class_roster("C1"))).await;
//!
//!     let state = query.state();
//!     println!("Roster: {:?} (loading: {})", state.data, state.loading);
//!
//!     // After a mutation
//!     cache.invalidator().on_class_updated("C1").await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod store;
pub mod telemetry;

// Re-export main types for convenience
pub use cache::{
    BypassMode, CacheKey, CacheKeyBuilder, CachePolicy, CacheState, CacheStats, CachedQuery,
    DataSource, InvalidationEvent, InvalidationReason, Invalidator, Phase, ProducerError,
    ReadThroughCache, Role,
};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{CacheSettings, StoreConfig, StoreConfigBuilder};
pub use error::{CacheError, Result};
pub use store::{CircuitBreaker, InMemoryStore, KeyValueStore, RemoteStore, SharedStore};
