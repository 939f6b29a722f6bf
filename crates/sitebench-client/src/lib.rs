//! Client core for simulated storefront and service sites.
//!
//! Pages read a shared environment document from the site backend, project it
//! onto elements, and submit user actions through a trace-then-mutate protocol.
//! The same pages are served either at the domain root or behind a development
//! proxy that inserts a `/.../proxy/<port>/` prefix; redirect handling keeps
//! navigation inside whichever prefix the page was loaded under.

pub mod completion;
pub mod config;
pub mod dispatch;
pub mod env;
pub mod notify;
pub mod page;
pub mod paths;
pub mod render;
pub mod session;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use completion::{CompletionLatch, Settlement, TerminalSignal};
pub use config::{ConfigError, SiteClientConfig};
pub use dispatch::{
    DispatchError, DispatchOutcome, Dispatcher, MUTATE_ENDPOINT, MutateRequest, MutationResponse,
    TRACE_ENDPOINT, TraceEvent,
};
pub use env::{ENV_ENDPOINT, EnvError, EnvLoader, EnvironmentDocument};
pub use notify::{LogNotifier, Notice, NoticeLevel, Notifier, ToastSink};
pub use page::{ElementStore, NavigationLog, Navigator};
pub use paths::{DEFAULT_API_ROOT, PageLocation, PathError, PathResolver, RedirectMode};
pub use render::{ElementSink, EnvRenderer, FieldBinding, RenderHook, Renderer};
pub use session::PageSession;
pub use transport::{HttpMethod, HttpTransport, ParsePolicy, Transport, TransportError};
