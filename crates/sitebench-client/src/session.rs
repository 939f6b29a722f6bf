//! Composition root for one page: owns every component and wires them together.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::config::SiteClientConfig;
use crate::dispatch::{DispatchError, DispatchOutcome, Dispatcher};
use crate::env::{EnvError, EnvLoader, EnvironmentDocument};
use crate::notify::{Notifier, ToastSink};
use crate::page::{ElementStore, NavigationLog, Navigator};
use crate::paths::{PageLocation, PathError, PathResolver};
use crate::render::{ElementSink, EnvRenderer, FieldBinding, RenderHook, Renderer};
use crate::transport::{HttpTransport, Transport};

pub struct PageSession {
    config: SiteClientConfig,
    paths: PathResolver,
    loader: EnvLoader,
    renderer: Arc<EnvRenderer>,
    elements: Arc<ElementStore>,
    toast: Arc<ToastSink>,
    navigation: Arc<NavigationLog>,
    dispatcher: Dispatcher,
}

impl PageSession {
    pub fn from_config(
        config: SiteClientConfig,
        bindings: Vec<FieldBinding>,
    ) -> Result<Self, PathError> {
        let location = PageLocation::parse(&config.page_url)?;
        let paths = PathResolver::new(location.clone()).with_api_root(config.api_root.as_deref());
        let transport: Arc<dyn Transport> =
            Arc::new(HttpTransport::new(location, config.parse_policy));
        Ok(Self::assemble(config, paths, transport, bindings))
    }

    /// Build around a caller-supplied transport.
    pub fn with_transport(
        config: SiteClientConfig,
        transport: Arc<dyn Transport>,
        bindings: Vec<FieldBinding>,
    ) -> Result<Self, PathError> {
        let location = PageLocation::parse(&config.page_url)?;
        let paths = PathResolver::new(location).with_api_root(config.api_root.as_deref());
        Ok(Self::assemble(config, paths, transport, bindings))
    }

    fn assemble(
        config: SiteClientConfig,
        paths: PathResolver,
        transport: Arc<dyn Transport>,
        bindings: Vec<FieldBinding>,
    ) -> Self {
        let loader = EnvLoader::new(Arc::clone(&transport), paths.clone());
        let elements = Arc::new(ElementStore::new());
        let sink: Arc<dyn ElementSink> = elements.clone();
        let renderer = Arc::new(EnvRenderer::new(
            loader.clone(),
            Renderer::new(bindings),
            sink,
        ));
        let toast = Arc::new(ToastSink::new(Duration::from_millis(config.toast_ms)));
        let navigation = Arc::new(NavigationLog::new(paths.location().clone()));

        let navigator: Arc<dyn Navigator> = navigation.clone();
        let render_hook: Arc<dyn RenderHook> = renderer.clone();
        let notifier: Arc<dyn Notifier> = toast.clone();
        let dispatcher = Dispatcher::new(transport, paths.clone(), navigator)
            .with_redirect_mode(config.redirect_mode)
            .with_render_hook(render_hook)
            .with_notifier(notifier);

        tracing::debug!(
            page = paths.location().href(),
            api_root = %paths.api_root(),
            base_url = %paths.base_url(),
            parse_policy = config.parse_policy.as_str(),
            redirect_mode = config.redirect_mode.as_str(),
            "page session ready"
        );

        Self {
            config,
            paths,
            loader,
            renderer,
            elements,
            toast,
            navigation,
            dispatcher,
        }
    }

    /// Initial load + render, as on page load.
    pub async fn open(&self) -> Result<EnvironmentDocument, EnvError> {
        self.renderer.render_once().await
    }

    pub async fn dispatch(
        &self,
        task_id: &str,
        action: &str,
        payload: Value,
    ) -> Result<DispatchOutcome, DispatchError> {
        self.dispatcher.dispatch(task_id, action, payload).await
    }

    #[must_use]
    pub fn config(&self) -> &SiteClientConfig {
        &self.config
    }

    #[must_use]
    pub fn paths(&self) -> &PathResolver {
        &self.paths
    }

    #[must_use]
    pub fn loader(&self) -> &EnvLoader {
        &self.loader
    }

    #[must_use]
    pub fn elements(&self) -> &ElementStore {
        &self.elements
    }

    #[must_use]
    pub fn toast(&self) -> &ToastSink {
        &self.toast
    }

    #[must_use]
    pub fn navigation(&self) -> &NavigationLog {
        &self.navigation
    }
}
