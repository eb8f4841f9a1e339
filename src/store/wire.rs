//! Wire format of the remote store endpoint
//!
//! Every operation is a POST of `{"action": ..., ...params}` to a single
//! endpoint. Responses are `{"success": bool, "result": any}`.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A command sent to the remote store
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Command<'a> {
    /// `get <key>`
    Get { key: &'a str },

    /// `set <key> <value> EX <ttl>`
    Set { key: &'a str, value: String, ex: u64 },

    /// `del <key...>`
    Del { keys: Vec<String> },

    /// `keys <pattern>`
    Keys { pattern: &'a str },

    /// `ping`
    Ping,
}

impl Command<'_> {
    /// Action name, as it appears on the wire
    pub fn action(&self) -> &'static str {
        match self {
            Command::Get { .. } => "get",
            Command::Set { .. } => "set",
            Command::Del { .. } => "del",
            Command::Keys { .. } => "keys",
            Command::Ping => "ping",
        }
    }
}

/// Response envelope returned by the remote store
#[derive(Debug, Clone, Deserialize)]
pub struct StoreResponse {
    #[serde(default)]
    pub success: Option<bool>,

    #[serde(default)]
    pub result: Value,
}

impl StoreResponse {
    /// Unwrap the result, treating a missing `success` as malformed
    pub fn into_result(self, action: &str) -> Result<Value> {
        match self.success {
            Some(true) => Ok(self.result),
            Some(false) => Err(CacheError::Rejected {
                action: action.to_string(),
            }),
            None => Err(CacheError::MalformedResponse(format!(
                "response to {} has no success field",
                action
            ))),
        }
    }
}

/// Serialize a value for storage: JSON, unless it is already a string
pub fn encode_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Parse a stored string, falling back to the raw string if it is not JSON
pub fn decode_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Interpret the result of a `get`
pub fn parse_get_result(result: Value) -> Option<Value> {
    match result {
        Value::Null => None,
        Value::String(raw) => Some(decode_value(&raw)),
        // Some backends hand back already-parsed JSON
        other => Some(other),
    }
}

/// Interpret the result of a `keys` listing
pub fn parse_keys_result(result: Value) -> Result<Vec<String>> {
    match result {
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::String(key) => Ok(key),
                other => Err(CacheError::MalformedResponse(format!(
                    "keys listing contained a non-string entry: {}",
                    other
                ))),
            })
            .collect(),
        other => Err(CacheError::MalformedResponse(format!(
            "keys listing was not an array: {}",
            other
        ))),
    }
}
