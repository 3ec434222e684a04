//! The shutdown token every long-lived task honours, per spec.md §5:
//! "closing the model signals shutdown; all tasks must drain within a
//! deadline... Every [suspension point] is cancellable via a shutdown
//! token."
//!
//! A thin wrapper over `tokio::sync::watch` rather than a bespoke
//! cancellation primitive — the teacher's graceful-shutdown machinery
//! (`spark_core::platform::host::shutdown`) is built for a `no_std`,
//! multi-runtime-adapter world this crate doesn't need; `watch` gives the
//! same "signal once, observe everywhere, cheap to clone" shape with
//! nothing to maintain.

use tokio::sync::watch;

/// Held by the component that owns a Node/Registry model; calling
/// [`ShutdownHandle::trigger`] tells every [`ShutdownToken`] clone that
/// shutdown has begun.
#[derive(Clone)]
pub struct ShutdownHandle(watch::Sender<bool>);

/// Held by each long-lived task. Cloneable and cheap; every clone
/// observes the same trigger.
#[derive(Clone)]
pub struct ShutdownToken(watch::Receiver<bool>);

impl ShutdownHandle {
    pub fn new() -> (Self, ShutdownToken) {
        let (tx, rx) = watch::channel(false);
        (Self(tx), ShutdownToken(rx))
    }

    pub fn trigger(&self) {
        let _ = self.0.send(true);
    }
}

impl Default for ShutdownHandle {
    fn default() -> Self {
        Self::new().0
    }
}

impl ShutdownToken {
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown has been triggered. Intended for use in a
    /// `tokio::select!` branch alongside whatever the task is actually
    /// waiting on (an HTTP call, a sleep, a DNS lookup), so every
    /// suspension point is cancellable per spec.md §5.
    pub async fn cancelled(&self) {
        let mut rx = self.0.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_wakes_every_clone() {
        let (handle, token) = ShutdownHandle::new();
        let token2 = token.clone();
        assert!(!token.is_shutdown());
        handle.trigger();
        token.cancelled().await;
        token2.cancelled().await;
        assert!(token2.is_shutdown());
    }
}
