//! Per-key read-through query
//!
//! A [`CachedQuery`] is what a data-loading call site holds: one producer,
//! one policy, and a key that can change over time. Its state is published
//! on a `watch` channel so any number of observers see `{data, loading,
//! error}` as it moves through the lifecycle described on [`Phase`].
//!
//! Every key change bumps a generation counter. Work started for an older
//! generation still completes (and still writes the store) but never
//! publishes into the query's state.

use crate::cache::policy::{BypassMode, CachePolicy};
use crate::cache::read_through::{Cacheable, Lookup, Produced, Producer, ReadThroughCache};
use crate::cache::state::{CacheState, DataSource, Phase, ProducerError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::debug;
use uuid::Uuid;

/// What kind of producer call is settling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    /// Cold load after a miss
    Load,
    /// Silent refresh after a stale hit
    Background,
    /// Explicit `refresh()`
    Manual,
}

struct QueryShared<T> {
    id: Uuid,
    cache: ReadThroughCache,
    policy: CachePolicy,
    producer: Producer<T>,
    key: Mutex<Option<String>>,
    generation: AtomicU64,
    state: watch::Sender<CacheState<T>>,
}

impl<T: Cacheable> QueryShared<T> {
    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Start a new generation, replacing the state wholesale
    fn begin(&self, initial: CacheState<T>) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = initial;
        });
        generation
    }

    /// Apply `update` if `generation` is still current
    fn publish(&self, generation: u64, update: impl FnOnce(&mut CacheState<T>)) -> bool {
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            update(state);
            true
        })
    }

    fn publish_produced(&self, generation: u64, produced: Produced<T>) -> bool {
        self.publish(generation, |state| {
            state.data = Some(produced.value);
            state.fetched_at = Some(produced.fetched_at);
            state.source = Some(DataSource::Producer);
            state.loading = false;
            state.error = None;
            state.phase = Phase::Ready;
        })
    }

    /// Record a failed attempt. Whatever is displayed stays displayed.
    fn publish_failure(&self, generation: u64, attempt: Attempt, error: ProducerError) -> bool {
        self.publish(generation, |state| {
            state.loading = false;
            state.error = Some(error);
            state.phase = match attempt {
                Attempt::Background => Phase::Ready,
                Attempt::Load | Attempt::Manual => Phase::Error,
            };
        })
    }

    async fn settle_fetch(&self, generation: u64, key: &str, attempt: Attempt) {
        let result = self.cache.fetch(key, &self.policy, &self.producer).await;
        let published = match result {
            Ok(produced) => self.publish_produced(generation, produced),
            Err(error) => self.publish_failure(generation, attempt, error),
        };
        if !published {
            debug!("Discarding {:?} result for superseded key {}", attempt, key);
        }
    }

    async fn settle_uncached(&self, generation: u64, attempt: Attempt) {
        match self.cache.fetch_uncached(&self.producer).await {
            Ok(produced) => self.publish_produced(generation, produced),
            Err(error) => self.publish_failure(generation, attempt, error),
        };
    }

    fn is_cacheable(&self, key: &Option<String>) -> bool {
        self.policy.enabled && key.is_some()
    }
}

/// Read-through query for one call site
pub struct CachedQuery<T: Cacheable> {
    shared: Arc<QueryShared<T>>,
}

impl<T: Cacheable> std::fmt::Debug for CachedQuery<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedQuery")
            .field("id", &self.shared.id)
            .field("key", &self.key())
            .field("phase", &self.shared.state.borrow().phase)
            .finish()
    }
}

impl<T: Cacheable> CachedQuery<T> {
    pub(crate) fn new(cache: ReadThroughCache, policy: CachePolicy, producer: Producer<T>) -> Self {
        let (state, _) = watch::channel(CacheState::default());
        Self {
            shared: Arc::new(QueryShared {
                id: Uuid::new_v4(),
                cache,
                policy,
                producer,
                key: Mutex::new(None),
                generation: AtomicU64::new(0),
                state,
            }),
        }
    }

    /// Unique id of this query, for logs
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.shared.policy
    }

    /// The key currently loaded
    pub fn key(&self) -> Option<String> {
        self.shared
            .key
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Snapshot of the current state
    pub fn state(&self) -> CacheState<T> {
        self.shared.state.borrow().clone()
    }

    /// Watch the state as it changes
    pub fn subscribe(&self) -> watch::Receiver<CacheState<T>> {
        self.shared.state.subscribe()
    }

    /// Wait until the query settles, including any background refresh
    pub async fn settled(&self) -> CacheState<T> {
        let mut receiver = self.subscribe();
        let settled = match receiver.wait_for(|state| state.is_settled()).await {
            Ok(state) => state.clone(),
            Err(_) => self.state(),
        };
        settled
    }

    /// Load `key`, dropping whatever the previous key displayed.
    ///
    /// Returns once the query has something to show: after a fresh hit,
    /// after publishing a stale hit (its refresh continues in the
    /// background), or after the producer settles on a miss.
    pub async fn set_key(&self, key: Option<String>) {
        let shared = &self.shared;
        *shared.key.lock().unwrap_or_else(PoisonError::into_inner) = key.clone();

        let key = match key {
            Some(key) if shared.policy.enabled => key,
            _ => return self.bypass().await,
        };

        let generation = shared.begin(CacheState {
            phase: Phase::CheckingCache,
            ..CacheState::default()
        });
        debug!("Query {} checking cache for {}", shared.id, key);

        match shared.cache.lookup::<T>(&key, &shared.policy).await {
            Lookup::Fresh { value, fetched_at } => {
                shared.publish(generation, |state| {
                    state.data = Some(value);
                    state.fetched_at = Some(fetched_at);
                    state.source = Some(DataSource::Cache);
                    state.phase = Phase::Ready;
                });
            }
            Lookup::Stale { value, fetched_at } => {
                let shown = shared.publish(generation, |state| {
                    state.data = Some(value);
                    state.fetched_at = fetched_at;
                    state.source = Some(DataSource::StaleCache);
                    state.phase = Phase::Ready;
                });
                // The stale value must be out before the refresh can race it
                if !shown || !shared.publish(generation, |state| state.phase = Phase::Refreshing) {
                    return;
                }

                shared.cache.record_background_refresh();
                let background = Arc::clone(shared);
                tokio::spawn(async move {
                    background
                        .settle_fetch(generation, &key, Attempt::Background)
                        .await;
                });
            }
            Lookup::Miss => {
                if shared.publish(generation, |state| {
                    state.loading = true;
                    state.phase = Phase::Loading;
                }) {
                    shared.settle_fetch(generation, &key, Attempt::Load).await;
                }
            }
        }
    }

    /// Invoke the producer regardless of freshness and write the result
    /// back under the current key. A failure keeps the displayed data.
    pub async fn refresh(&self) {
        let shared = &self.shared;
        let key = self.key();
        let generation = shared.current_generation();

        if !shared.is_cacheable(&key) {
            if shared.policy.bypass == BypassMode::Skip {
                return;
            }
            if shared.publish(generation, |state| {
                state.loading = true;
                state.phase = Phase::Loading;
            }) {
                shared.settle_uncached(generation, Attempt::Manual).await;
            }
            return;
        }

        let Some(key) = key else { return };
        let started = shared.publish(generation, |state| {
            state.loading = state.data.is_none();
            state.phase = Phase::Refreshing;
        });
        if started {
            shared.settle_fetch(generation, &key, Attempt::Manual).await;
        }
    }

    async fn bypass(&self) {
        let shared = &self.shared;
        match shared.policy.bypass {
            BypassMode::Skip => {
                shared.begin(CacheState {
                    phase: Phase::Idle,
                    ..CacheState::default()
                });
            }
            BypassMode::Direct => {
                let generation = shared.begin(CacheState {
                    loading: true,
                    phase: Phase::Loading,
                    ..CacheState::default()
                });
                shared.settle_uncached(generation, Attempt::Load).await;
            }
        }
    }
}

impl<T: Cacheable> Drop for CachedQuery<T> {
    fn drop(&mut self) {
        // Background work still holding the shared state must not publish
        self.shared.generation.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::read_through::producer;
    use crate::clock::ManualClock;
    use crate::config::CacheSettings;
    use crate::store::InMemoryStore;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn cache_with_clock() -> (ReadThroughCache, ManualClock) {
        let clock = ManualClock::starting_now();
        let store = Arc::new(InMemoryStore::with_clock(Arc::new(clock.clone())));
        let cache = ReadThroughCache::with_settings(store, CacheSettings::default(), Arc::new(clock.clone()));
        (cache, clock)
    }

    fn counter_producer(calls: Arc<AtomicUsize>) -> Producer<usize> {
        producer(move || {
            let calls = calls.clone();
            async move { Ok(calls.fetch_add(1, Ordering::SeqCst) + 1) }
        })
    }

    #[tokio::test]
    async fn test_initial_state() {
        let (cache, _) = cache_with_clock();
        let query = cache.query(CachePolicy::default(), counter_producer(Arc::default()));
        let state = query.state();
        assert_eq!(state.phase, Phase::Init);
        assert!(query.key().is_none());
    }

    #[tokio::test]
    async fn test_skip_bypass_stays_idle() {
        let (cache, _) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = CachePolicy::default().with_bypass(BypassMode::Skip);
        let query = cache.query(policy, counter_producer(calls.clone()));

        query.set_key(None).await;
        let state = query.state();
        assert_eq!(state.phase, Phase::Idle);
        assert!(!state.loading);
        assert!(state.data.is_none());

        query.refresh().await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_direct_bypass_calls_producer_every_time() {
        let (cache, _) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let policy = CachePolicy::default().enabled(false);
        let query = cache.query(policy, counter_producer(calls.clone()));

        query.set_key(Some("k".to_string())).await;
        assert_eq!(query.state().data, Some(1));
        query.set_key(Some("k".to_string())).await;
        assert_eq!(query.state().data, Some(2));

        query.refresh().await;
        assert_eq!(query.state().data, Some(3));
        assert_eq!(cache.stats().bypasses, 3);
        assert_eq!(cache.stats().lookups(), 0);
    }

    #[tokio::test]
    async fn test_key_change_clears_previous_data() {
        let (cache, _) = cache_with_clock();
        let calls = Arc::new(AtomicUsize::new(0));
        let query = cache
            .mount("a", CachePolicy::default(), counter_producer(calls.clone()))
            .await;
        assert_eq!(query.state().data, Some(1));

        let mut receiver = query.subscribe();
        let _ = receiver.borrow_and_update();
        query.set_key(Some("b".to_string())).await;

        let state = query.state();
        assert_eq!(query.key().as_deref(), Some("b"));
        assert_eq!(state.data, Some(2));
        assert_eq!(state.source, Some(DataSource::Producer));
        assert!(receiver.has_changed().unwrap());
    }

    #[tokio::test]
    async fn test_dropped_query_does_not_publish() {
        let (cache, clock) = cache_with_clock();
        let policy = CachePolicy::new(Duration::from_secs(300), Duration::from_secs(10));
        let seeded = cache.mount("k", policy.clone(), counter_producer(Arc::default())).await;
        drop(seeded);

        clock.advance(Duration::from_secs(20));
        let query = cache.mount("k", policy, counter_producer(Arc::default())).await;
        let receiver = query.subscribe();
        drop(query);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(receiver.borrow().phase, Phase::Refreshing);
    }
}
