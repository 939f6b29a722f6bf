//! Trace-then-mutate action dispatch and redirect handling.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::notify::{Notice, Notifier};
use crate::page::Navigator;
use crate::paths::{PathError, PathResolver, RedirectMode};
use crate::render::RenderHook;
use crate::transport::{HttpMethod, Transport, TransportError};

pub const TRACE_ENDPOINT: &str = "api/trace";
pub const MUTATE_ENDPOINT: &str = "api/mutate";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceEvent {
    pub task_id: String,
    pub action: String,
    pub payload: Value,
    pub url: String,
    /// Unix epoch milliseconds.
    pub ts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutateRequest {
    pub task_id: String,
    pub action: String,
    pub payload: Value,
}

/// Reply to a mutate call. Only `redirect` is interpreted; the rest is kept as-is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationResponse {
    pub redirect: Option<String>,
    pub extra: Map<String, Value>,
}

impl MutationResponse {
    /// Non-object replies and blank or non-string `redirect` values read as
    /// "no redirect".
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        let Value::Object(mut extra) = value else {
            return Self::default();
        };
        let redirect = match extra.remove("redirect") {
            Some(Value::String(target)) if !target.is_empty() => Some(target),
            Some(Value::String(_) | Value::Null) | None => None,
            Some(other) => {
                tracing::warn!(redirect = %other, "ignoring non-string redirect");
                None
            }
        };
        Self { redirect, extra }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// No redirect: the page was re-rendered in place.
    Rendered { response: MutationResponse },
    /// The page navigated to `target`.
    Navigated {
        target: String,
        response: MutationResponse,
    },
}

impl DispatchOutcome {
    #[must_use]
    pub fn response(&self) -> &MutationResponse {
        match self {
            Self::Rendered { response } | Self::Navigated { response, .. } => response,
        }
    }

    #[must_use]
    pub fn navigation_target(&self) -> Option<&str> {
        match self {
            Self::Rendered { .. } => None,
            Self::Navigated { target, .. } => Some(target),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("operation failed: {0}")]
    Mutate(#[source] TransportError),
    #[error("operation failed: {0}")]
    Redirect(#[source] PathError),
}

/// Runs user actions against the site backend.
///
/// Each dispatch makes at most one trace attempt and one mutate attempt, in that
/// order. The trace is awaited but its outcome never affects the dispatch.
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    paths: PathResolver,
    redirect_mode: RedirectMode,
    navigator: Arc<dyn Navigator>,
    render_hook: Option<Arc<dyn RenderHook>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        paths: PathResolver,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self {
            transport,
            paths,
            redirect_mode: RedirectMode::default(),
            navigator,
            render_hook: None,
            notifier: None,
        }
    }

    #[must_use]
    pub fn with_redirect_mode(mut self, redirect_mode: RedirectMode) -> Self {
        self.redirect_mode = redirect_mode;
        self
    }

    #[must_use]
    pub fn with_render_hook(mut self, render_hook: Arc<dyn RenderHook>) -> Self {
        self.render_hook = Some(render_hook);
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    #[must_use]
    pub fn redirect_mode(&self) -> RedirectMode {
        self.redirect_mode
    }

    pub async fn dispatch(
        &self,
        task_id: &str,
        action: &str,
        payload: Value,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.trace(task_id, action, &payload).await;

        let request = MutateRequest {
            task_id: task_id.to_string(),
            action: action.to_string(),
            payload,
        };
        let response = match self.mutate(&request).await {
            Ok(value) => MutationResponse::from_value(value),
            Err(error) => {
                tracing::error!(task_id, action, error = %error, "mutation failed");
                let error = DispatchError::Mutate(error);
                self.notify(Notice::failure(error.to_string()));
                return Err(error);
            }
        };

        let Some(redirect) = response.redirect.clone() else {
            if let Some(render_hook) = &self.render_hook {
                render_hook.render().await;
            }
            self.notify(Notice::success(format!("{action} succeeded")));
            return Ok(DispatchOutcome::Rendered { response });
        };

        tracing::info!(task_id, action, redirect = %redirect, "server requested redirect");
        let target = match self.paths.redirect_target(&redirect, self.redirect_mode) {
            Ok(target) => target,
            Err(error) => {
                tracing::error!(redirect = %redirect, error = %error, "unusable redirect");
                let error = DispatchError::Redirect(error);
                self.notify(Notice::failure(error.to_string()));
                return Err(error);
            }
        };
        self.navigator.navigate(&target);
        Ok(DispatchOutcome::Navigated { target, response })
    }

    async fn trace(&self, task_id: &str, action: &str, payload: &Value) {
        let event = TraceEvent {
            task_id: task_id.to_string(),
            action: action.to_string(),
            payload: payload.clone(),
            url: self.paths.location().pathname().to_string(),
            ts: Utc::now().timestamp_millis(),
        };
        let body = match serde_json::to_value(&event) {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(error = %error, "trace event not serializable; skipping");
                return;
            }
        };
        if let Err(error) = self
            .transport
            .request(&self.paths.endpoint(TRACE_ENDPOINT), HttpMethod::Post, Some(&body))
            .await
        {
            tracing::warn!(task_id, action, error = %error, "trace delivery failed");
        }
    }

    async fn mutate(&self, request: &MutateRequest) -> Result<Value, TransportError> {
        let body = serde_json::to_value(request).map_err(|error| TransportError::Serialize {
            message: error.to_string(),
        })?;
        self.transport
            .request(&self.paths.endpoint(MUTATE_ENDPOINT), HttpMethod::Post, Some(&body))
            .await
    }

    fn notify(&self, notice: Notice) {
        match &self.notifier {
            Some(notifier) => notifier.notify(notice),
            None => crate::notify::LogNotifier.notify(notice),
        }
    }
}
