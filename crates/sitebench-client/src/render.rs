//! Projection of the environment document onto page elements.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::env::{EnvError, EnvLoader, EnvironmentDocument};

/// Called with no arguments after a successful mutation and on page load.
/// Implementations must be safe to call repeatedly.
#[async_trait]
pub trait RenderHook: Send + Sync {
    async fn render(&self);
}

pub trait ElementSink: Send + Sync {
    fn set_text(&self, element_id: &str, text: &str);
}

/// Element bound to a document path, with the text shown when the path is absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldBinding {
    pub element_id: String,
    pub path: String,
    pub default: String,
}

impl FieldBinding {
    pub fn new(
        element_id: impl Into<String>,
        path: impl Into<String>,
        default: impl Into<String>,
    ) -> Self {
        Self {
            element_id: element_id.into(),
            path: path.into(),
            default: default.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingParseError {
    #[error("binding must look like <element>=<path>[=<default>]: {0}")]
    Malformed(String),
}

impl FromStr for FieldBinding {
    type Err = BindingParseError;

    /// `order-state=orders.O-1.state=pending`; the default may be omitted and
    /// may itself contain `=`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut parts = raw.splitn(3, '=');
        let element_id = parts.next().map(str::trim).unwrap_or_default();
        let path = parts.next().map(str::trim).unwrap_or_default();
        let default = parts.next().unwrap_or_default();
        if element_id.is_empty() || path.is_empty() {
            return Err(BindingParseError::Malformed(raw.to_string()));
        }
        Ok(Self::new(element_id, path, default))
    }
}

#[derive(Debug, Clone, Default)]
pub struct Renderer {
    bindings: Vec<FieldBinding>,
}

impl Renderer {
    #[must_use]
    pub fn new(bindings: Vec<FieldBinding>) -> Self {
        Self { bindings }
    }

    #[must_use]
    pub fn bindings(&self) -> &[FieldBinding] {
        &self.bindings
    }

    /// `(element_id, text)` for every binding, defaults applied.
    #[must_use]
    pub fn project(&self, document: &EnvironmentDocument) -> Vec<(String, String)> {
        self.bindings
            .iter()
            .map(|binding| {
                (
                    binding.element_id.clone(),
                    document.text_or(&binding.path, &binding.default),
                )
            })
            .collect()
    }

    pub fn apply(&self, document: &EnvironmentDocument, sink: &dyn ElementSink) {
        for (element_id, text) in self.project(document) {
            sink.set_text(&element_id, &text);
        }
    }
}

/// Loader + renderer pair: every render fetches a fresh document.
pub struct EnvRenderer {
    loader: EnvLoader,
    renderer: Renderer,
    sink: Arc<dyn ElementSink>,
}

impl EnvRenderer {
    #[must_use]
    pub fn new(loader: EnvLoader, renderer: Renderer, sink: Arc<dyn ElementSink>) -> Self {
        Self {
            loader,
            renderer,
            sink,
        }
    }

    /// Load and apply, reporting a load failure to the caller. Elements are
    /// left untouched on failure.
    pub async fn render_once(&self) -> Result<EnvironmentDocument, EnvError> {
        let document = self.loader.load().await?;
        self.renderer.apply(&document, self.sink.as_ref());
        Ok(document)
    }
}

#[async_trait]
impl RenderHook for EnvRenderer {
    async fn render(&self) {
        if let Err(error) = self.render_once().await {
            tracing::warn!(error = %error, "environment load failed; keeping previous content");
        }
    }
}
