//! # Read-Through Cache
//!
//! Cache-aside reads for expensive aggregation queries (dashboard counters,
//! class rosters, per-student evolution, reports).
//!
//! ## Features
//!
//! - **Stale-while-revalidate**: values past their staleness threshold are
//!   served at once while a refresh runs in the background
//! - **Fail-open**: a store outage only shows up as misses
//! - **Deduplication**: concurrent callers for one key share a producer call
//! - **Pattern invalidation**: domain mutations clear whole key namespaces
//!
//! ## Example
//!
//! ```rust
//! use classcache::cache::{keys, producer, CachePolicy, ReadThroughCache};
//! use classcache::store::InMemoryStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let cache = ReadThroughCache::new(Arc::new(InMemoryStore::new()));
//!
//! let stats = producer(|| async { Ok(serde_json::json!({"totalClasses": 3})) });
//! let query = cache
//!     .mount(keys::teacher_dashboard_stats("T1"), CachePolicy::dashboard(), stats)
//!     .await;
//!
//! if let Some(data) = query.state().data {
//!     println!("Dashboard: {}", data);
//! }
//! # Ok(())
//! # }
//! ```

pub mod envelope;
mod inflight;
pub mod invalidate;
pub mod keys;
pub mod policy;
pub mod query;
pub mod read_through;
pub mod state;
pub mod stats;

pub use envelope::Envelope;
pub use invalidate::{InvalidationEvent, InvalidationReason, Invalidator};
pub use keys::{CacheKey, CacheKeyBuilder, Role};
pub use policy::{BypassMode, CachePolicy};
pub use query::CachedQuery;
pub use read_through::{producer, Cacheable, Lookup, Produced, Producer, ReadThroughCache};
pub use state::{CacheState, DataSource, Phase, ProducerError};
pub use stats::CacheStats;
