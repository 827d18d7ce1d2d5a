//! Cooperative cancellation for readiness waits and scenario setup.
//!
//! A [`CancelTrigger`] owns the sending side of a `watch` channel; any number
//! of [`CancelSignal`] clones observe it. Once triggered, a signal stays
//! cancelled. Dropping the trigger without firing it leaves its signals
//! uncancelled forever.

use tokio::sync::watch;

/// Fires cancellation for every signal subscribed to it.
#[derive(Debug)]
pub struct CancelTrigger {
    sender: watch::Sender<bool>,
}

impl CancelTrigger {
    /// Create an unfired trigger.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _receiver) = watch::channel(false);
        Self { sender }
    }

    /// Fire cancellation. Repeated calls are harmless.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether cancellation has been fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.sender.borrow()
    }

    /// Subscribe a new signal.
    #[must_use]
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            receiver: Some(self.sender.subscribe()),
        }
    }
}

impl Default for CancelTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Observes a [`CancelTrigger`].
#[derive(Debug, Clone)]
pub struct CancelSignal {
    receiver: Option<watch::Receiver<bool>>,
}

impl CancelSignal {
    /// A signal that is never cancelled.
    #[must_use]
    pub const fn never() -> Self {
        Self { receiver: None }
    }

    /// Whether cancellation has been fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.receiver
            .as_ref()
            .is_some_and(|receiver| *receiver.borrow())
    }

    /// Resolve once cancellation fires. Pends forever for [`Self::never`] or
    /// when the trigger was dropped unfired.
    pub async fn cancelled(&self) {
        let Some(receiver) = &self.receiver else {
            return std::future::pending().await;
        };

        let mut watcher = receiver.clone();
        let trigger_dropped = watcher.wait_for(|cancelled| *cancelled).await.is_err();
        if trigger_dropped {
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}
