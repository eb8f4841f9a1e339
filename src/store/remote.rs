//! HTTP client for the remote cache service
//!
//! Every public operation is fail-open. Errors are classified internally:
//! hard failures (network, timeout, malformed body, 5xx) trip the circuit
//! breaker, after which calls short-circuit without touching the network.

use crate::config::StoreConfig;
use crate::error::{CacheError, Result};
use crate::store::breaker::CircuitBreaker;
use crate::store::wire::{encode_value, parse_get_result, parse_keys_result, Command, StoreResponse};
use crate::store::KeyValueStore;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Fail-open client for the remote key-value store
#[derive(Debug)]
pub struct RemoteStore {
    client: reqwest::Client,
    config: StoreConfig,
    breaker: CircuitBreaker,
}

impl RemoteStore {
    /// Create a client from validated configuration
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.timeout)
            .build()
            .map_err(|e| CacheError::Config(format!("failed to build HTTP client: {}", e)))?;

        info!(
            "Remote cache store at {} (timeout: {:?}, cooldown: {:?})",
            config.endpoint, config.timeout, config.breaker_cooldown
        );

        Ok(Self {
            client,
            breaker: CircuitBreaker::new(config.breaker_cooldown),
            config,
        })
    }

    /// Create a client from environment configuration
    pub fn from_env() -> Result<Self> {
        Self::new(StoreConfig::from_env()?)
    }

    /// The circuit breaker guarding this client
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Whether calls are currently short-circuited
    pub fn is_disabled(&self) -> bool {
        self.breaker.is_open()
    }

    /// Configuration in use
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// List keys matching a glob pattern
    pub async fn keys(&self, pattern: &str) -> Option<Vec<String>> {
        match self
            .execute(Command::Keys { pattern })
            .await
            .and_then(parse_keys_result)
        {
            Ok(keys) => Some(keys),
            Err(e) => {
                debug!("Cache keys {} failed: {}", pattern, e);
                None
            }
        }
    }

    /// Run a command through the breaker
    async fn execute(&self, command: Command<'_>) -> Result<Value> {
        if !self.breaker.try_acquire() {
            return Err(CacheError::CircuitOpen);
        }

        let outcome = self.send(&command).await;
        match &outcome {
            Ok(_) => self.breaker.record_success(),
            Err(e) if e.is_hard_failure() => {
                warn!("Cache {} failed: {}", command.action(), e);
                self.breaker.record_failure();
            }
            // The backend answered, so it is alive
            Err(_) => self.breaker.record_success(),
        }
        outcome
    }

    async fn send(&self, command: &Command<'_>) -> Result<Value> {
        let action = command.action();

        let mut request = self.client.post(&self.config.endpoint).json(command);
        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.classify(e, action))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CacheError::Status {
                status: status.as_u16(),
                action: action.to_string(),
            });
        }

        let body: StoreResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                self.classify(e, action)
            } else {
                CacheError::MalformedResponse(format!("{} response: {}", action, e))
            }
        })?;

        body.into_result(action)
    }

    fn classify(&self, error: reqwest::Error, action: &str) -> CacheError {
        if error.is_timeout() {
            CacheError::Timeout {
                timeout_ms: u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX),
                action: action.to_string(),
            }
        } else {
            CacheError::Transport(error.to_string())
        }
    }
}

#[async_trait]
impl KeyValueStore for RemoteStore {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn get(&self, key: &str) -> Option<Value> {
        match self.execute(Command::Get { key }).await {
            Ok(result) => parse_get_result(result),
            Err(e) => {
                debug!("Cache get {} treated as miss: {}", key, e);
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &Value, ttl_seconds: u64) -> bool {
        let command = Command::Set {
            key,
            value: encode_value(value),
            ex: ttl_seconds,
        };
        match self.execute(command).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Cache set {} failed: {}", key, e);
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        let command = Command::Del {
            keys: vec![key.to_string()],
        };
        match self.execute(command).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Cache delete {} failed: {}", key, e);
                false
            }
        }
    }

    async fn delete_pattern(&self, pattern: &str) -> bool {
        let Some(keys) = self.keys(pattern).await else {
            warn!("Cache invalidation of {} skipped: key listing failed", pattern);
            return false;
        };

        if keys.is_empty() {
            debug!("No cache keys match {}", pattern);
            return true;
        }

        let count = keys.len();
        match self.execute(Command::Del { keys }).await {
            Ok(_) => {
                info!("Invalidated {} cache keys matching {}", count, pattern);
                true
            }
            Err(e) => {
                // Some keys may already be gone; TTL expiry cleans up the rest
                warn!(
                    "Cache invalidation of {} ({} keys) failed part-way: {}",
                    pattern, count, e
                );
                false
            }
        }
    }

    async fn ping(&self) -> bool {
        match self.execute(Command::Ping).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Cache ping failed: {}", e);
                false
            }
        }
    }
}
