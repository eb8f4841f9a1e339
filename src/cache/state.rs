//! Observable state of a cached query

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Where a query is in its lifecycle
///
/// ```text
/// Init -> CheckingCache
/// CheckingCache --hit,fresh--> Ready
/// CheckingCache --hit,stale--> Ready(stale) -> Refreshing -> Ready
/// CheckingCache --miss--> Loading -> Ready | Error
/// Ready --refresh()--> Refreshing -> Ready | Error
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Created, no key seen yet
    Init,
    /// Waiting on the store
    CheckingCache,
    /// Nothing cached; waiting on the producer
    Loading,
    /// Data is displayed; the producer is running to replace it
    Refreshing,
    /// Data is settled
    Ready,
    /// The last attempt failed with nothing better to show
    Error,
    /// Caching is off and the query is skipping work
    Idle,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Init => write!(f, "init"),
            Phase::CheckingCache => write!(f, "checking_cache"),
            Phase::Loading => write!(f, "loading"),
            Phase::Refreshing => write!(f, "refreshing"),
            Phase::Ready => write!(f, "ready"),
            Phase::Error => write!(f, "error"),
            Phase::Idle => write!(f, "idle"),
        }
    }
}

/// Where the displayed data came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSource {
    /// A fresh cache hit
    Cache,
    /// A stale cache hit, not yet replaced
    StaleCache,
    /// A producer call made by this query (or joined by it)
    Producer,
}

/// A producer failure, cheap to clone into every observer's snapshot
#[derive(Clone)]
pub struct ProducerError(Arc<anyhow::Error>);

impl ProducerError {
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// The underlying error
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }
}

impl fmt::Debug for ProducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for ProducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for ProducerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl From<anyhow::Error> for ProducerError {
    fn from(error: anyhow::Error) -> Self {
        Self::new(error)
    }
}

/// Snapshot of a query: `{data, loading, error}` plus bookkeeping
#[derive(Debug, Clone)]
pub struct CacheState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<ProducerError>,
    pub phase: Phase,
    pub source: Option<DataSource>,

    /// When the displayed data was produced, if known
    pub fetched_at: Option<DateTime<Utc>>,
}

impl<T> Default for CacheState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            phase: Phase::Init,
            source: None,
            fetched_at: None,
        }
    }
}

impl<T> CacheState<T> {
    /// Whether the displayed data is a stale hit awaiting replacement
    pub fn is_stale(&self) -> bool {
        self.source == Some(DataSource::StaleCache)
    }

    /// Whether there is data to display
    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Whether the query has settled (successfully or not)
    pub fn is_settled(&self) -> bool {
        matches!(self.phase, Phase::Ready | Phase::Error | Phase::Idle)
    }
}
