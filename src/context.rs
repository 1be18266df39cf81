//! Cancellable request context.
//!
//! A `Context` is a cheap cloneable token that a request (or a whole batch
//! run) can be associated with. Cancelling the handle aborts every pending
//! exchange carrying the context at its next suspension point.

use tokio::sync::watch;

/// Cancellation side of a [`Context`].
///
/// Dropping the handle does NOT cancel the context; call [`cancel`]
/// explicitly.
///
/// [`cancel`]: CancelHandle::cancel
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Cancel the associated context. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// A cancellable context propagated into requests.
#[derive(Debug, Clone)]
pub struct Context {
    rx: watch::Receiver<bool>,
}

impl Context {
    /// Create a new context and its cancellation handle.
    pub fn new() -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (Self { rx }, CancelHandle { tx })
    }

    /// Whether the context has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the context is cancelled.
    ///
    /// If the handle was dropped without cancelling, this pends forever,
    /// which is the correct behavior for a context that can no longer be
    /// cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        // Sender dropped without cancelling.
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_wakes_waiters() {
        let (ctx, handle) = Context::new();
        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.cancelled().await })
        };
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should resolve")
            .unwrap();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_uncancelled_context_pends() {
        let (ctx, _handle) = Context::new();
        let res = tokio::time::timeout(Duration::from_millis(50), ctx.cancelled()).await;
        assert!(res.is_err());
        assert!(!ctx.is_cancelled());
    }
}
