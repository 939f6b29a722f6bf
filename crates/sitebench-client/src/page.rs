//! In-process stand-ins for the page surfaces the core writes to: elements and
//! navigation.

use std::collections::BTreeMap;
use std::sync::Mutex;

use url::Url;

use crate::paths::PageLocation;
use crate::render::ElementSink;

/// Receives navigation targets produced by the dispatcher.
pub trait Navigator: Send + Sync {
    fn navigate(&self, target: &str);
}

/// Element id -> displayed text.
#[derive(Debug, Default)]
pub struct ElementStore {
    elements: Mutex<BTreeMap<String, String>>,
}

impl ElementStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn text(&self, element_id: &str) -> Option<String> {
        self.elements
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(element_id)
            .cloned()
    }

    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.elements
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ElementSink for ElementStore {
    fn set_text(&self, element_id: &str, text: &str) {
        self.elements
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(element_id.to_string(), text.to_string());
    }
}

/// Records navigation targets in order.
#[derive(Debug)]
pub struct NavigationLog {
    location: PageLocation,
    visits: Mutex<Vec<String>>,
}

impl NavigationLog {
    #[must_use]
    pub fn new(location: PageLocation) -> Self {
        Self {
            location,
            visits: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn visits(&self) -> Vec<String> {
        self.visits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    #[must_use]
    pub fn last(&self) -> Option<String> {
        self.visits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .last()
            .cloned()
    }

    /// The URL a browser on this page would load for the last target.
    #[must_use]
    pub fn last_resolved(&self) -> Option<Url> {
        let target = self.last()?;
        self.location.resolve(&target).ok()
    }
}

impl Navigator for NavigationLog {
    fn navigate(&self, target: &str) {
        tracing::info!(from = self.location.href(), target, "navigate");
        self.visits
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(target.to_string());
    }
}
