//! Environment-driven configuration
//!
//! Every test here mutates process environment variables, so they run
//! serially.

use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;

use classcache::cache::producer;
use classcache::config::{ENV_COOLDOWN_SECS, ENV_DEDUPE, ENV_ENDPOINT, ENV_TIMEOUT_MS, ENV_TOKEN};
use classcache::{store, CachePolicy, CacheSettings, ManualClock, Phase, ReadThroughCache, StoreConfig};

const ALL_VARS: [&str; 5] = [ENV_ENDPOINT, ENV_TOKEN, ENV_TIMEOUT_MS, ENV_COOLDOWN_SECS, ENV_DEDUPE];

fn clear_env() {
    for name in ALL_VARS {
        std::env::remove_var(name);
    }
}

#[test]
#[serial]
fn test_store_falls_back_to_memory_without_endpoint() {
    clear_env();
    let store = tokio_test::assert_ok!(store::from_env());
    assert_eq!(store.name(), "memory");

    std::env::set_var(ENV_ENDPOINT, "   ");
    let store = tokio_test::assert_ok!(store::from_env());
    assert_eq!(store.name(), "memory");
    clear_env();
}

#[test]
#[serial]
fn test_store_uses_remote_when_endpoint_set() {
    clear_env();
    std::env::set_var(ENV_ENDPOINT, "http://127.0.0.1:9/cache");
    std::env::set_var(ENV_TOKEN, "env-token");
    std::env::set_var(ENV_TIMEOUT_MS, "750");
    std::env::set_var(ENV_COOLDOWN_SECS, "30");

    let config = tokio_test::assert_ok!(StoreConfig::from_env());
    assert_eq!(config.token.as_deref(), Some("env-token"));
    assert_eq!(config.timeout, Duration::from_millis(750));
    assert_eq!(config.breaker_cooldown, Some(Duration::from_secs(30)));

    let store = tokio_test::assert_ok!(store::from_env());
    assert_eq!(store.name(), "remote");
    clear_env();
}

#[test]
#[serial]
fn test_invalid_endpoint_is_rejected() {
    clear_env();
    std::env::set_var(ENV_ENDPOINT, "ftp://cache");
    assert!(store::from_env().is_err());

    std::env::set_var(ENV_ENDPOINT, "http://localhost:8080/cache");
    std::env::set_var(ENV_TIMEOUT_MS, "soon");
    assert!(store::from_env().is_err());
    clear_env();
}

#[test]
#[serial]
fn test_dedupe_setting_parsing() {
    clear_env();
    assert!(tokio_test::assert_ok!(CacheSettings::from_env()).dedupe_in_flight);

    for (raw, expected) in [("false", false), ("0", false), (" Off ", false), ("yes", true), ("TRUE", true)] {
        std::env::set_var(ENV_DEDUPE, raw);
        let settings = tokio_test::assert_ok!(CacheSettings::from_env());
        assert_eq!(settings.dedupe_in_flight, expected, "{:?}", raw);
    }

    std::env::set_var(ENV_DEDUPE, "sometimes");
    assert!(CacheSettings::from_env().is_err());
    clear_env();
}

#[tokio::test]
#[serial]
async fn test_settings_from_env_drive_the_cache() {
    clear_env();
    std::env::set_var(ENV_DEDUPE, "off");

    let settings = tokio_test::assert_ok!(CacheSettings::from_env()).with_default_policy(CachePolicy::dashboard());
    let store = tokio_test::assert_ok!(store::from_env());
    let cache = ReadThroughCache::with_settings(store, settings, Arc::new(ManualClock::starting_now()));
    assert!(!cache.settings().dedupe_in_flight);

    let query = cache.query_with_default_policy(producer(|| async { Ok(42u32) }));
    assert_eq!(query.policy(), &CachePolicy::dashboard());

    query.set_key(Some("answer".to_string())).await;
    let state = query.state();
    assert_eq!(state.phase, Phase::Ready);
    assert_eq!(state.data, Some(42));
    clear_env();
}
