use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::{Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::completion::{CompletionLatch, TerminalSignal};
use crate::paths::PageLocation;

/// Longest response-body excerpt carried by [`TransportError::Http`].
pub const BODY_SNIPPET_LIMIT: usize = 200;

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("site_invalid_path:{0}")]
    InvalidPath(String),
    #[error("site_request_serialize_failed:{message}")]
    Serialize { message: String },
    #[error("site_network_error:{message}")]
    Network { message: String },
    #[error("site_http_{status}:{body}")]
    Http { status: StatusCode, body: String },
    #[error("site_json_decode_failed:{message}")]
    Parse { message: String },
    #[error("site_request_aborted")]
    Aborted,
}

impl TransportError {
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

/// What to do with a 2xx response whose body is not JSON.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ParsePolicy {
    /// Resolve with an empty object.
    #[default]
    Lenient,
    /// Fail with [`TransportError::Parse`].
    Strict,
}

impl ParsePolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lenient => "lenient",
            Self::Strict => "strict",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "lenient" | "loose" => Some(Self::Lenient),
            "strict" | "reject" => Some(Self::Strict),
            _ => None,
        }
    }
}

/// One HTTP exchange resolving to a JSON value.
///
/// No retries: every call issues at most one request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<&Value>,
    ) -> Result<Value, TransportError>;
}

/// Status and text of a response that arrived.
#[derive(Debug)]
struct Loaded {
    status: StatusCode,
    body: String,
}

/// [`Transport`] over `reqwest`, resolving relative paths against the page location.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    location: PageLocation,
    parse_policy: ParsePolicy,
    http: reqwest::Client,
}

impl HttpTransport {
    #[must_use]
    pub fn new(location: PageLocation, parse_policy: ParsePolicy) -> Self {
        Self {
            location,
            parse_policy,
            http: reqwest::Client::new(),
        }
    }

    #[must_use]
    pub fn parse_policy(&self) -> ParsePolicy {
        self.parse_policy
    }

    fn build_request(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<&Value>,
    ) -> Result<reqwest::RequestBuilder, TransportError> {
        let url = self
            .location
            .resolve(path)
            .map_err(|error| TransportError::InvalidPath(error.to_string()))?;
        tracing::debug!(method = method.as_str(), url = %url, "site request");

        let builder = match method {
            HttpMethod::Get => self.http.get(url),
            HttpMethod::Post => self.http.post(url),
        }
        .header("x-request-id", format!("req_{}", Uuid::new_v4().simple()));

        let Some(body) = body else {
            return Ok(builder);
        };
        let encoded = serde_json::to_vec(body).map_err(|error| TransportError::Serialize {
            message: error.to_string(),
        })?;
        Ok(builder
            .header("content-type", "application/json")
            .body(encoded))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(
        &self,
        path: &str,
        method: HttpMethod,
        body: Option<&Value>,
    ) -> Result<Value, TransportError> {
        let request = self.build_request(path, method, body)?;
        let (latch, settlement) = CompletionLatch::new();
        let latch = Arc::new(latch);

        let worker_latch = Arc::clone(&latch);
        let worker = tokio::spawn(async move {
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    match response.text().await {
                        Ok(body) => {
                            worker_latch.settle(TerminalSignal::Load, Ok(Loaded { status, body }));
                        }
                        Err(error) => {
                            worker_latch.settle(TerminalSignal::Error, Err(network_error(&error)));
                        }
                    }
                }
                Err(error) => {
                    worker_latch.settle(TerminalSignal::Error, Err(network_error(&error)));
                }
            }
        });

        // The worker settles before it returns; this only wins if it panicked
        // or was torn down first.
        if let Err(error) = worker.await {
            tracing::warn!(error = %error, "site request task ended without a response");
        }
        latch.settle(TerminalSignal::Abort, Err(TransportError::Aborted));

        let loaded = settlement.wait().await.ok_or(TransportError::Aborted)??;
        decode_body(loaded.status, &loaded.body, self.parse_policy)
    }
}

fn network_error(error: &reqwest::Error) -> TransportError {
    tracing::warn!(error = %error, "site request failed without a response");
    TransportError::Network {
        message: error.to_string(),
    }
}

/// Map a response to its JSON value according to the status and parse policy.
pub fn decode_body(
    status: StatusCode,
    body: &str,
    policy: ParsePolicy,
) -> Result<Value, TransportError> {
    if !status.is_success() {
        return Err(format_http_error(status, body));
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    match serde_json::from_str(trimmed) {
        Ok(value) => Ok(value),
        Err(error) => match policy {
            ParsePolicy::Lenient => {
                tracing::warn!(status = %status, error = %error, "non-json success body treated as empty");
                Ok(Value::Object(Map::new()))
            }
            ParsePolicy::Strict => Err(TransportError::Parse {
                message: error.to_string(),
            }),
        },
    }
}

pub fn format_http_error(status: StatusCode, body: &str) -> TransportError {
    TransportError::Http {
        status,
        body: body_snippet(body),
    }
}

fn body_snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    if trimmed.chars().count() <= BODY_SNIPPET_LIMIT {
        return trimmed.to_string();
    }
    let mut snippet = trimmed.chars().take(BODY_SNIPPET_LIMIT).collect::<String>();
    snippet.push('…');
    snippet
}
