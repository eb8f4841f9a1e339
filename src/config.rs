//! Configuration for the store client and the read-through cache

use crate::cache::policy::CachePolicy;
use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable holding the remote store endpoint URL
pub const ENV_ENDPOINT: &str = "CLASSCACHE_ENDPOINT";
/// Environment variable holding the bearer credential
pub const ENV_TOKEN: &str = "CLASSCACHE_TOKEN";
/// Environment variable holding the HTTP timeout in milliseconds
pub const ENV_TIMEOUT_MS: &str = "CLASSCACHE_TIMEOUT_MS";
/// Environment variable holding the breaker cooldown in seconds
pub const ENV_COOLDOWN_SECS: &str = "CLASSCACHE_COOLDOWN_SECS";
/// Environment variable toggling in-flight deduplication
pub const ENV_DEDUPE: &str = "CLASSCACHE_DEDUPE";

/// Configuration for the remote key-value store client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Single endpoint every command is POSTed to
    pub endpoint: String,

    /// Bearer credential sent with every request
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Upper bound on each HTTP call, connect included
    pub timeout: Duration,

    /// How long the breaker stays open before probing again.
    /// `None` keeps it open for the rest of the process.
    pub breaker_cooldown: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            token: None,
            // 5 seconds: long enough for a cold function, short enough not to hang a page
            timeout: Duration::from_secs(5),
            breaker_cooldown: None,
        }
    }
}

impl StoreConfig {
    /// Create a new builder for store configuration
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.is_empty() {
            return Err(CacheError::Config("endpoint must be set".to_string()));
        }

        let url = reqwest::Url::parse(&self.endpoint)
            .map_err(|e| CacheError::Config(format!("invalid endpoint {}: {}", self.endpoint, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(CacheError::Config(format!(
                "endpoint must be http or https, got {}",
                url.scheme()
            )));
        }

        if self.timeout.is_zero() {
            return Err(CacheError::Config("timeout must be greater than 0".to_string()));
        }

        if self.breaker_cooldown.is_some_and(|c| c.is_zero()) {
            return Err(CacheError::Config(
                "breaker_cooldown must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from the environment (and a `.env` file if present)
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let endpoint = std::env::var(ENV_ENDPOINT)
            .map_err(|_| CacheError::Config(format!("{} is not set", ENV_ENDPOINT)))?;

        let mut builder = StoreConfig::builder().endpoint(endpoint);

        if let Ok(token) = std::env::var(ENV_TOKEN) {
            if !token.is_empty() {
                builder = builder.token(token);
            }
        }

        if let Some(ms) = parse_env_u64(ENV_TIMEOUT_MS)? {
            builder = builder.timeout(Duration::from_millis(ms));
        }

        if let Some(secs) = parse_env_u64(ENV_COOLDOWN_SECS)? {
            builder = builder.breaker_cooldown(Duration::from_secs(secs));
        }

        let config = builder.build();
        config.validate()?;
        Ok(config)
    }
}

fn parse_env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| CacheError::Config(format!("{} is not a number: {}", name, e))),
        _ => Ok(None),
    }
}

/// Builder for store configuration
#[derive(Debug, Default)]
pub struct StoreConfigBuilder {
    endpoint: Option<String>,
    token: Option<String>,
    timeout: Option<Duration>,
    breaker_cooldown: Option<Duration>,
}

impl StoreConfigBuilder {
    /// Set the endpoint URL
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the bearer credential
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Let the breaker probe again after this long
    pub fn breaker_cooldown(mut self, cooldown: Duration) -> Self {
        self.breaker_cooldown = Some(cooldown);
        self
    }

    /// Build the store configuration
    pub fn build(self) -> StoreConfig {
        let defaults = StoreConfig::default();

        StoreConfig {
            endpoint: self.endpoint.unwrap_or(defaults.endpoint),
            token: self.token.or(defaults.token),
            timeout: self.timeout.unwrap_or(defaults.timeout),
            breaker_cooldown: self.breaker_cooldown.or(defaults.breaker_cooldown),
        }
    }
}

/// Settings shared by every query of a [`ReadThroughCache`](crate::cache::ReadThroughCache)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Join concurrent producer calls for the same key instead of
    /// running one per caller
    pub dedupe_in_flight: bool,

    /// Policy for queries that do not pick their own
    #[serde(default)]
    pub default_policy: CachePolicy,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dedupe_in_flight: true,
            default_policy: CachePolicy::default(),
        }
    }
}

impl CacheSettings {
    /// Load settings from the environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let mut settings = CacheSettings::default();
        if let Ok(raw) = std::env::var(ENV_DEDUPE) {
            settings.dedupe_in_flight = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                other => {
                    return Err(CacheError::Config(format!(
                        "{} must be a boolean, got {}",
                        ENV_DEDUPE, other
                    )))
                }
            };
        }
        settings.default_policy.validate()?;
        Ok(settings)
    }

    /// Replace the default policy
    pub fn with_default_policy(mut self, policy: CachePolicy) -> Self {
        self.default_policy = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(config.breaker_cooldown.is_none());
        assert!(config.token.is_none());
    }

    #[test]
    fn test_config_validation() {
        let valid = StoreConfig::builder()
            .endpoint("https://cache.example.test/functions/v1/cache")
            .build();
        assert!(valid.validate().is_ok());

        let missing = StoreConfig::default();
        assert!(missing.validate().is_err());

        let bad_scheme = StoreConfig::builder().endpoint("ftp://cache").build();
        assert!(bad_scheme.validate().is_err());

        let not_a_url = StoreConfig::builder().endpoint("cache endpoint").build();
        assert!(not_a_url.validate().is_err());

        let zero_timeout = StoreConfig::builder()
            .endpoint("http://localhost:8080")
            .timeout(Duration::ZERO)
            .build();
        assert!(zero_timeout.validate().is_err());

        let zero_cooldown = StoreConfig::builder()
            .endpoint("http://localhost:8080")
            .breaker_cooldown(Duration::ZERO)
            .build();
        assert!(zero_cooldown.validate().is_err());
    }

    #[test]
    fn test_config_builder() {
        let config = StoreConfig::builder()
            .endpoint("http://localhost:8080/cache")
            .token("secret")
            .timeout(Duration::from_millis(750))
            .breaker_cooldown(Duration::from_secs(30))
            .build();

        assert_eq!(config.endpoint, "http://localhost:8080/cache");
        assert_eq!(config.token.as_deref(), Some("secret"));
        assert_eq!(config.timeout, Duration::from_millis(750));
        assert_eq!(config.breaker_cooldown, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_token_not_serialized() {
        let config = StoreConfig::builder()
            .endpoint("http://localhost:8080")
            .token("secret")
            .build();
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_default_settings_dedupe() {
        assert!(CacheSettings::default().dedupe_in_flight);
    }
}
