//! The shared environment document and the loader that fetches it.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::paths::PathResolver;
use crate::transport::{HttpMethod, Transport, TransportError};

pub const ENV_ENDPOINT: &str = "api/env";
pub const ENV_QUERY_ENDPOINT: &str = "api/env/query";
pub const TIME_TRAVEL_ENDPOINT: &str = "api/debug/time_travel";

#[derive(Debug, Error)]
pub enum EnvError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("env_document_not_object:{0}")]
    Shape(&'static str),
    #[error("env_query_failed:{0}")]
    Query(String),
    #[error("env_response_missing_field:{0}")]
    MissingField(&'static str),
}

/// Server-owned world state. Read-only on the client; the top level is always
/// a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnvironmentDocument {
    root: Map<String, Value>,
}

impl EnvironmentDocument {
    pub fn from_value(value: Value) -> Result<Self, EnvError> {
        match value {
            Value::Object(root) => Ok(Self { root }),
            other => Err(EnvError::Shape(json_kind(&other))),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.root)
    }

    /// Look up a dotted path such as `orders.O-10001.state`.
    ///
    /// Numeric segments and `key[i]` index into arrays. A `*` segment fans out
    /// over object values or array items and collects the matches into an array.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<Value> {
        let segments = path.split('.').collect::<Vec<_>>();
        let (head, rest) = segments.split_first()?;
        if *head == "*" {
            return fan_out(&Value::Object(self.root.clone()), rest);
        }
        let start = match parse_indexed(head) {
            Some((key, index)) => self.root.get(key)?.as_array()?.get(index)?,
            None => self.root.get(*head)?,
        };
        query_segments(start, rest)
    }

    /// Display text at `path`, or `default` when the path is absent or null.
    #[must_use]
    pub fn text_or(&self, path: &str, default: &str) -> String {
        self.lookup(path)
            .and_then(|value| display_text(&value))
            .unwrap_or_else(|| default.to_string())
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn query_segments(current: &Value, segments: &[&str]) -> Option<Value> {
    let Some((head, rest)) = segments.split_first() else {
        return if current.is_null() {
            None
        } else {
            Some(current.clone())
        };
    };

    if *head == "*" {
        return fan_out(current, rest);
    }

    let next = if let Some((key, index)) = parse_indexed(head) {
        current.as_object()?.get(key)?.as_array()?.get(index)?
    } else {
        match current {
            Value::Object(map) => map.get(*head)?,
            Value::Array(items) => items.get(head.parse::<usize>().ok()?)?,
            _ => return None,
        }
    };
    query_segments(next, rest)
}

fn fan_out(current: &Value, rest: &[&str]) -> Option<Value> {
    match current {
        Value::Object(map) if rest.is_empty() => Some(Value::Array(map.values().cloned().collect())),
        Value::Object(map) => Some(Value::Array(
            map.values()
                .filter_map(|child| query_segments(child, rest))
                .collect(),
        )),
        Value::Array(items) if rest.is_empty() => Some(Value::Array(items.clone())),
        // Array fan-out keeps positions: misses become null.
        Value::Array(items) => Some(Value::Array(
            items
                .iter()
                .map(|item| query_segments(item, rest).unwrap_or(Value::Null))
                .collect(),
        )),
        _ => None,
    }
}

/// `items[3]` -> `("items", 3)`.
fn parse_indexed(segment: &str) -> Option<(&str, usize)> {
    let inner = segment.strip_suffix(']')?;
    let (key, index) = inner.split_once('[')?;
    if key.is_empty() || !key.chars().all(|ch| ch.is_alphanumeric() || ch == '_') {
        return None;
    }
    if index.is_empty() || !index.chars().all(|ch| ch.is_ascii_digit()) {
        return None;
    }
    Some((key, index.parse().ok()?))
}

/// How a value is shown in an element. `None` for null.
#[must_use]
pub fn display_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Array(_) | Value::Object(_) => Some(value.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct EnvQueryResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TimeTravelResponse {
    #[serde(default)]
    new_time: Option<String>,
}

/// Fetches the environment document fresh on every call.
#[derive(Clone)]
pub struct EnvLoader {
    transport: Arc<dyn Transport>,
    paths: PathResolver,
}

impl EnvLoader {
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, paths: PathResolver) -> Self {
        Self { transport, paths }
    }

    pub async fn load(&self) -> Result<EnvironmentDocument, EnvError> {
        let value = self
            .transport
            .request(&self.paths.endpoint(ENV_ENDPOINT), HttpMethod::Get, None)
            .await?;
        EnvironmentDocument::from_value(value)
    }

    /// Evaluate `path` on the server. `Ok(None)` when nothing matches.
    pub async fn query(&self, path: &str) -> Result<Option<Value>, EnvError> {
        let encoded = url::form_urlencoded::byte_serialize(path.as_bytes()).collect::<String>();
        let endpoint = format!("{}?path={encoded}", self.paths.endpoint(ENV_QUERY_ENDPOINT));
        let value = self
            .transport
            .request(&endpoint, HttpMethod::Get, None)
            .await?;

        let response = serde_json::from_value::<EnvQueryResponse>(value)
            .map_err(|error| EnvError::Query(error.to_string()))?;
        if !response.success {
            return Err(EnvError::Query(
                response.error.unwrap_or_else(|| "unknown".to_string()),
            ));
        }
        Ok(match response.value {
            Value::Null => None,
            value => Some(value),
        })
    }

    /// Advance the simulated clock and return the server's new time.
    pub async fn advance_clock(&self, days: i64, hours: i64) -> Result<String, EnvError> {
        let body = json!({ "days": days, "hours": hours });
        let value = self
            .transport
            .request(
                &self.paths.endpoint(TIME_TRAVEL_ENDPOINT),
                HttpMethod::Post,
                Some(&body),
            )
            .await?;
        let response = serde_json::from_value::<TimeTravelResponse>(value)
            .map_err(|_| EnvError::MissingField("new_time"))?;
        let new_time = response.new_time.ok_or(EnvError::MissingField("new_time"))?;
        tracing::info!(days, hours, new_time = %new_time, "advanced site clock");
        Ok(new_time)
    }
}
