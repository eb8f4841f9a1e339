//! Per-key deduplication of producer calls
//!
//! Concurrent callers for the same key attach to one shared future instead
//! of each invoking the producer. The entry removes itself when the shared
//! future completes, so the next caller after that starts a new call.

use crate::cache::state::ProducerError;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A produced value with its type erased, so one map serves every query type
pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

pub(crate) type InFlightResult = Result<ErasedValue, ProducerError>;

pub(crate) type InFlightFuture = Shared<BoxFuture<'static, InFlightResult>>;

type CallMap = Arc<Mutex<HashMap<String, InFlightFuture>>>;

#[derive(Default)]
pub(crate) struct InFlight {
    calls: CallMap,
}

impl std::fmt::Debug for InFlight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlight").field("keys", &self.len()).finish()
    }
}

impl InFlight {
    fn lock(calls: &CallMap) -> MutexGuard<'_, HashMap<String, InFlightFuture>> {
        calls.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Join the call in flight for `key`, or start one with `start`.
    ///
    /// Returns the shared future and whether this caller started it.
    pub fn join_or_start<F>(&self, key: &str, start: F) -> (InFlightFuture, bool)
    where
        F: FnOnce() -> BoxFuture<'static, InFlightResult>,
    {
        let mut calls = Self::lock(&self.calls);
        if let Some(existing) = calls.get(key) {
            return (existing.clone(), false);
        }

        let work = start();
        let map = Arc::clone(&self.calls);
        let owned_key = key.to_string();
        let shared = async move {
            let result = work.await;
            Self::lock(&map).remove(&owned_key);
            result
        }
        .boxed()
        .shared();

        calls.insert(key.to_string(), shared.clone());
        (shared, true)
    }

    /// Number of keys with a call in flight
    pub fn len(&self) -> usize {
        Self::lock(&self.calls).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
