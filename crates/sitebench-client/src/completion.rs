//! Single-settlement latch for requests that can end through several signals.
//!
//! A request in flight can finish because a response loaded, because the
//! connection failed, or because the task driving it went away. Each of those
//! paths reports through [`CompletionLatch::settle`]; only the first report is
//! delivered to the waiting caller.

use std::sync::Mutex;

use tokio::sync::oneshot;

/// The terminal signal that tried to settle a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalSignal {
    Load,
    Error,
    Abort,
}

impl TerminalSignal {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Error => "error",
            Self::Abort => "abort",
        }
    }
}

/// Write side of the latch. Shared between every path that may end the request.
#[derive(Debug)]
pub struct CompletionLatch<T> {
    sender: Mutex<Option<oneshot::Sender<T>>>,
}

/// Read side of the latch, held by the caller awaiting the outcome.
#[derive(Debug)]
pub struct Settlement<T> {
    receiver: oneshot::Receiver<T>,
}

impl<T> CompletionLatch<T> {
    #[must_use]
    pub fn new() -> (Self, Settlement<T>) {
        let (sender, receiver) = oneshot::channel();
        (
            Self {
                sender: Mutex::new(Some(sender)),
            },
            Settlement { receiver },
        )
    }

    /// Deliver `value` if nothing has settled the latch yet.
    ///
    /// Returns `true` for the signal that won, `false` for every later one.
    pub fn settle(&self, signal: TerminalSignal, value: T) -> bool {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        let Some(sender) = sender else {
            tracing::debug!(signal = signal.as_str(), "ignoring terminal signal after settlement");
            return false;
        };
        // The waiter may have been dropped; the latch is still consumed.
        let _ = sender.send(value);
        true
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .is_none()
    }
}

impl<T> Settlement<T> {
    /// Wait for the winning signal. `None` means the latch was dropped unsettled.
    pub async fn wait(self) -> Option<T> {
        self.receiver.await.ok()
    }
}
