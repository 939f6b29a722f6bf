use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const DEFAULT_TOAST_MS: u64 = 1_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Failure,
            message: message.into(),
        }
    }
}

/// Sink for user-facing outcome messages.
pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the log; used when the page has no visible sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => tracing::info!(message = %notice.message, "notice"),
            NoticeLevel::Failure => tracing::warn!(message = %notice.message, "notice"),
        }
    }
}

#[derive(Debug, Default)]
struct ToastSlot {
    current: Option<Notice>,
    generation: u64,
}

/// Shows the latest notice and hides it again after `display_for`.
#[derive(Debug, Clone)]
pub struct ToastSink {
    slot: Arc<Mutex<ToastSlot>>,
    display_for: Duration,
}

impl Default for ToastSink {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TOAST_MS))
    }
}

impl ToastSink {
    #[must_use]
    pub fn new(display_for: Duration) -> Self {
        Self {
            slot: Arc::new(Mutex::new(ToastSlot::default())),
            display_for,
        }
    }

    /// The notice currently on screen.
    #[must_use]
    pub fn current(&self) -> Option<Notice> {
        self.slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .current
            .clone()
    }
}

impl Notifier for ToastSink {
    fn notify(&self, notice: Notice) {
        LogNotifier.notify(notice.clone());
        let generation = {
            let mut slot = self
                .slot
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            slot.generation += 1;
            slot.current = Some(notice);
            slot.generation
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!("no runtime for toast dismissal; toast stays until replaced");
            return;
        };
        let slot = Arc::clone(&self.slot);
        let display_for = self.display_for;
        runtime.spawn(async move {
            tokio::time::sleep(display_for).await;
            let mut slot = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // A newer toast owns the slot now.
            if slot.generation == generation {
                slot.current = None;
            }
        });
    }
}
