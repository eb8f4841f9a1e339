//! Read-through cache shared by every query
//!
//! Owns the store handle, the clock, the in-flight call map and the
//! counters. [`CachedQuery`] drives the per-key state machine on top of it.

use crate::cache::envelope::{decode, Decoded, Envelope};
use crate::cache::inflight::{ErasedValue, InFlight};
use crate::cache::invalidate::Invalidator;
use crate::cache::policy::CachePolicy;
use crate::cache::query::CachedQuery;
use crate::cache::state::ProducerError;
use crate::cache::stats::{CacheStats, StatsRecorder};
use crate::clock::{SharedClock, SystemClock};
use crate::config::CacheSettings;
use crate::store::SharedStore;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Values that can be cached: serializable, cloneable and shareable
pub trait Cacheable: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Cacheable for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Argument-less async data producer
pub type Producer<T> = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<T>> + Send + Sync>;

/// Wrap an async closure as a [`Producer`]
pub fn producer<T, F, Fut>(f: F) -> Producer<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Result of consulting the store for a key
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    /// Younger than the staleness threshold
    Fresh { value: T, fetched_at: DateTime<Utc> },

    /// Still stored but due for a refresh. `fetched_at` is unknown for
    /// values written without an envelope.
    Stale {
        value: T,
        fetched_at: Option<DateTime<Utc>>,
    },

    /// Absent, expired, unreadable, or the store failed
    Miss,
}

/// A value returned by the producer and the time it was produced
#[derive(Debug, Clone, PartialEq)]
pub struct Produced<T> {
    pub value: T,
    pub fetched_at: DateTime<Utc>,
}

struct Inner {
    store: SharedStore,
    clock: SharedClock,
    settings: CacheSettings,
    in_flight: InFlight,
    stats: StatsRecorder,
}

/// Handle to the shared read-through cache; cheap to clone
#[derive(Clone)]
pub struct ReadThroughCache {
    inner: Arc<Inner>,
}

impl fmt::Debug for ReadThroughCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadThroughCache")
            .field("store", &self.inner.store.name())
            .field("settings", &self.inner.settings)
            .field("in_flight", &self.inner.in_flight)
            .finish()
    }
}

impl ReadThroughCache {
    /// Create a cache over `store` with default settings and the system clock
    pub fn new(store: SharedStore) -> Self {
        Self::with_settings(store, CacheSettings::default(), Arc::new(SystemClock))
    }

    /// Create a cache with explicit settings and clock
    pub fn with_settings(store: SharedStore, settings: CacheSettings, clock: SharedClock) -> Self {
        info!(
            "Read-through cache over {} store (dedupe_in_flight: {})",
            store.name(),
            settings.dedupe_in_flight
        );

        Self {
            inner: Arc::new(Inner {
                store,
                clock,
                settings,
                in_flight: InFlight::default(),
                stats: StatsRecorder::default(),
            }),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.inner.store
    }

    pub fn clock(&self) -> &SharedClock {
        &self.inner.clock
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.inner.settings
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> CacheStats {
        self.inner.stats.snapshot()
    }

    /// Invalidator over the same store
    pub fn invalidator(&self) -> Invalidator {
        Invalidator::new(Arc::clone(&self.inner.store))
    }

    /// Create a query with no key yet
    pub fn query<T: Cacheable>(&self, policy: CachePolicy, producer: Producer<T>) -> CachedQuery<T> {
        if let Err(e) = policy.validate() {
            warn!("Query created with invalid policy: {}", e);
        }
        CachedQuery::new(self.clone(), policy, producer)
    }

    /// Create a query using the default policy from the settings
    pub fn query_with_default_policy<T: Cacheable>(&self, producer: Producer<T>) -> CachedQuery<T> {
        self.query(self.inner.settings.default_policy.clone(), producer)
    }

    /// Create a query and load `key` into it
    pub async fn mount<T: Cacheable>(
        &self,
        key: impl Into<String>,
        policy: CachePolicy,
        producer: Producer<T>,
    ) -> CachedQuery<T> {
        let query = self.query(policy, producer);
        query.set_key(Some(key.into())).await;
        query
    }

    /// Consult the store for `key`
    pub async fn lookup<T: Cacheable>(&self, key: &str, policy: &CachePolicy) -> Lookup<T> {
        let Some(stored) = self.inner.store.get(key).await else {
            debug!("Cache miss: {}", key);
            self.inner.stats.miss();
            return Lookup::Miss;
        };

        match decode::<T>(stored) {
            Decoded::Envelope(envelope) => {
                let now = self.inner.clock.now();
                let fetched_at = envelope.fetched_at();
                if envelope.is_stale(now, policy.stale_time) {
                    debug!("Cache hit (stale, age {:?}): {}", envelope.age(now), key);
                    self.inner.stats.stale_hit();
                    Lookup::Stale {
                        value: envelope.value,
                        fetched_at: Some(fetched_at),
                    }
                } else {
                    debug!("Cache hit: {}", key);
                    self.inner.stats.fresh_hit();
                    Lookup::Fresh {
                        value: envelope.value,
                        fetched_at,
                    }
                }
            }
            Decoded::Bare(value) => {
                debug!("Cache hit without timestamp, treating as stale: {}", key);
                self.inner.stats.stale_hit();
                Lookup::Stale {
                    value,
                    fetched_at: None,
                }
            }
            Decoded::Unreadable => {
                warn!("Cached value for {} does not match the expected shape, ignoring", key);
                self.inner.stats.miss();
                Lookup::Miss
            }
        }
    }

    /// Run the producer for `key` and write its result back.
    ///
    /// With deduplication on, a caller arriving while a call for the same
    /// key is in flight waits for that call instead of starting another.
    pub async fn fetch<T: Cacheable>(
        &self,
        key: &str,
        policy: &CachePolicy,
        producer: &Producer<T>,
    ) -> Result<Produced<T>, ProducerError> {
        if !self.inner.settings.dedupe_in_flight {
            return self.produce_and_store(key, policy, producer).await;
        }

        let (call, started) = self.inner.in_flight.join_or_start(key, || {
            let cache = self.clone();
            let key = key.to_string();
            let policy = policy.clone();
            let producer = Arc::clone(producer);
            async move {
                let produced = cache.produce_and_store(&key, &policy, &producer).await?;
                Ok(Arc::new(produced) as ErasedValue)
            }
            .boxed()
        });

        if !started {
            debug!("Joining in-flight producer call: {}", key);
            self.inner.stats.deduplicated();
        }

        let erased = call.await?;
        match erased.downcast::<Produced<T>>() {
            Ok(produced) => Ok(Produced::clone(&produced)),
            Err(_) => {
                warn!(
                    "In-flight call for {} produced a different type, running producer directly",
                    key
                );
                self.produce_and_store(key, policy, producer).await
            }
        }
    }

    /// Run the producer without touching the store
    pub async fn fetch_uncached<T: Cacheable>(
        &self,
        producer: &Producer<T>,
    ) -> Result<Produced<T>, ProducerError> {
        self.inner.stats.bypass();
        let value = self.call_producer("<uncached>", producer).await?;
        Ok(Produced {
            value,
            fetched_at: self.inner.clock.now(),
        })
    }

    /// One-shot read-through: fresh hits are returned, stale hits are
    /// returned while a detached refresh runs, misses wait for the producer.
    pub async fn get_or_fetch<T: Cacheable>(
        &self,
        key: &str,
        policy: &CachePolicy,
        producer: &Producer<T>,
    ) -> Result<T, ProducerError> {
        if !policy.enabled {
            return self.fetch_uncached(producer).await.map(|p| p.value);
        }

        match self.lookup(key, policy).await {
            Lookup::Fresh { value, .. } => Ok(value),
            Lookup::Stale { value, .. } => {
                self.spawn_refresh(key, policy, producer);
                Ok(value)
            }
            Lookup::Miss => self.fetch(key, policy, producer).await.map(|p| p.value),
        }
    }

    /// Write `value` under `key` wrapped in an envelope stamped `fetched_at`.
    /// Returns whether the store acknowledged the write.
    pub async fn write<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        fetched_at: DateTime<Utc>,
        policy: &CachePolicy,
    ) -> bool {
        let payload = match serde_json::to_value(Envelope::new(value, fetched_at)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to serialize value for {}: {}", key, e);
                self.inner.stats.failed_write();
                return false;
            }
        };

        let written = self.inner.store.set(key, &payload, policy.ttl_seconds()).await;
        if !written {
            debug!("Cache write not acknowledged: {}", key);
            self.inner.stats.failed_write();
        }
        written
    }

    pub(crate) fn record_background_refresh(&self) {
        self.inner.stats.background_refresh();
    }

    fn spawn_refresh<T: Cacheable>(&self, key: &str, policy: &CachePolicy, producer: &Producer<T>) {
        self.record_background_refresh();
        let cache = self.clone();
        let key = key.to_string();
        let policy = policy.clone();
        let producer = Arc::clone(producer);
        tokio::spawn(async move {
            match cache.fetch(&key, &policy, &producer).await {
                Ok(produced) => debug!("Background refresh stored {} at {}", key, produced.fetched_at),
                // Already counted and logged by the producer call
                Err(e) => debug!("Background refresh of {} failed: {}", key, e),
            }
        });
    }

    async fn produce_and_store<T: Cacheable>(
        &self,
        key: &str,
        policy: &CachePolicy,
        producer: &Producer<T>,
    ) -> Result<Produced<T>, ProducerError> {
        let value = self.call_producer(key, producer).await?;
        let fetched_at = self.inner.clock.now();
        self.write(key, &value, fetched_at, policy).await;
        Ok(Produced { value, fetched_at })
    }

    async fn call_producer<T: Cacheable>(
        &self,
        key: &str,
        producer: &Producer<T>,
    ) -> Result<T, ProducerError> {
        self.inner.stats.producer_call();
        match producer().await {
            Ok(value) => Ok(value),
            Err(error) => {
                warn!("Producer for {} failed: {:#}", key, error);
                self.inner.stats.producer_error();
                Err(ProducerError::new(error))
            }
        }
    }
}
