use std::sync::Arc;
use tokio::sync::Notify;

/// Wakes the coordinator for an out-of-cycle pass.
///
/// Any number of producers may fire; the single consumer sees at most one
/// pending wake-up however many fires happened while it was busy.
#[derive(Debug, Clone, Default)]
pub struct RetrySignal {
    notify: Arc<Notify>,
}

impl RetrySignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fire(&self) {
        self.notify.notify_one();
    }

    /// Wait for the next fire, or consume one that is already pending.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
