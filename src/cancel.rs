//! Call-scoped cancellation.
//!
//! One `CallToken` is created per call and cloned into every task that
//! works on it. The first `cancel` wins; its reason is what every waiter
//! observes.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CancelReason {
    /// The control plane or transport reported the caller hung up.
    Hangup,
    /// The call exceeded its maximum duration.
    Deadline,
    /// The dialog or bridge finished on its own.
    Completed,
    /// The service is shutting down.
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct CallToken {
    tx: Arc<watch::Sender<Option<CancelReason>>>,
    rx: watch::Receiver<Option<CancelReason>>,
}

impl CallToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    /// Trip the token. Returns false if it was already cancelled.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        })
    }

    pub fn reason(&self) -> Option<CancelReason> {
        *self.rx.borrow()
    }

    pub fn is_cancelled(&self) -> bool {
        self.reason().is_some()
    }

    /// Resolves once the token is tripped.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.rx.clone();
        loop {
            if let Some(reason) = *rx.borrow_and_update() {
                return reason;
            }
            // The sender lives as long as any clone of this token.
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }

    /// A new token that is tripped, with the same reason, when this one is.
    /// Cancelling the child leaves this token alone.
    pub fn child(&self) -> CallToken {
        let child = CallToken::new();
        let parent = self.clone();
        let linked = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                reason = parent.cancelled() => {
                    linked.cancel(reason);
                }
                _ = linked.cancelled() => {}
            }
        });
        child
    }

    /// Trip the token with `reason` after `after`, unless something else
    /// cancels it first.
    pub fn cancel_after(&self, after: Duration, reason: CancelReason) -> JoinHandle<()> {
        let token = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(after) => {
                    token.cancel(reason);
                }
                _ = token.cancelled() => {}
            }
        })
    }
}

impl Default for CallToken {
    fn default() -> Self {
        Self::new()
    }
}
