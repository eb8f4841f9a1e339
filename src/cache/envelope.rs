//! Stored payload format: `{"value": ..., "fetchedAt": <unix millis>}`
//!
//! The remote store only knows absolute TTLs. Recording when the value was
//! produced inside the payload lets a reader compute staleness without a
//! second round-trip.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// A produced value plus the time it was produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub value: T,

    /// Unix timestamp in milliseconds
    pub fetched_at: i64,
}

impl<T> Envelope<T> {
    /// Wrap a value produced at `fetched_at`
    pub fn new(value: T, fetched_at: DateTime<Utc>) -> Self {
        Self {
            value,
            fetched_at: fetched_at.timestamp_millis(),
        }
    }

    /// When the value was produced
    pub fn fetched_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.fetched_at).unwrap_or_default()
    }

    /// Age of the value at `now`; zero if the timestamp is in the future
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.fetched_at()).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether the value is at or past the staleness threshold
    pub fn is_stale(&self, now: DateTime<Utc>, stale_time: Duration) -> bool {
        self.age(now) >= stale_time
    }
}

/// What a stored payload turned out to be
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded<T> {
    /// A well-formed envelope
    Envelope(Envelope<T>),

    /// A bare value written without an envelope; its age is unknown
    Bare(T),

    /// Neither; treated as a miss
    Unreadable,
}

/// Interpret a stored payload as a value of `T`
pub fn decode<T: DeserializeOwned>(stored: Value) -> Decoded<T> {
    if is_envelope_shaped(&stored) {
        if let Ok(envelope) = serde_json::from_value::<Envelope<T>>(stored.clone()) {
            return Decoded::Envelope(envelope);
        }
    }

    match serde_json::from_value::<T>(stored) {
        Ok(value) => Decoded::Bare(value),
        Err(_) => Decoded::Unreadable,
    }
}

fn is_envelope_shaped(stored: &Value) -> bool {
    stored
        .as_object()
        .is_some_and(|map| map.contains_key("value") && map.contains_key("fetchedAt"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Stats {
        total_classes: u32,
        pending_grading: u32,
    }

    #[test]
    fn test_envelope_wire_shape() {
        let at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let envelope = Envelope::new(json!({"x": 1}), at);
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"value": {"x": 1}, "fetchedAt": 1_700_000_000_000i64})
        );
        assert_eq!(envelope.fetched_at(), at);
    }

    #[test]
    fn test_age_and_staleness() {
        let at = Utc::now();
        let envelope = Envelope::new(1, at);

        let later = at + chrono::Duration::seconds(60);
        assert_eq!(envelope.age(later).as_secs(), 60);
        assert!(!envelope.is_stale(later, Duration::from_secs(120)));
        assert!(envelope.is_stale(later, Duration::from_secs(60)));

        // Clock skew: a future timestamp is simply fresh
        let earlier = at - chrono::Duration::seconds(5);
        assert_eq!(envelope.age(earlier), Duration::ZERO);
    }

    #[test]
    fn test_decode_envelope() {
        let stored = json!({
            "value": {"totalClasses": 3, "pendingGrading": 5},
            "fetchedAt": 1_700_000_000_000i64
        });
        match decode::<Stats>(stored) {
            Decoded::Envelope(envelope) => {
                assert_eq!(envelope.value.pending_grading, 5);
            }
            other => panic!("expected envelope, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_bare_value() {
        let stored = json!({"totalClasses": 3, "pendingGrading": 5});
        assert_eq!(
            decode::<Stats>(stored),
            Decoded::Bare(Stats {
                total_classes: 3,
                pending_grading: 5
            })
        );
    }

    #[test]
    fn test_decode_unreadable() {
        assert_eq!(decode::<Stats>(json!("garbage")), Decoded::Unreadable);
        // Envelope shape but the wrong inner type
        let stored = json!({"value": "nope", "fetchedAt": 1});
        assert_eq!(decode::<Stats>(stored), Decoded::Unreadable);
    }
}
