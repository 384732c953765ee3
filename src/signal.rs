//! # One-shot broadcast edges for lifecycle phases.
//!
//! A [`Signal`] transitions exactly once from not-fired to fired and is
//! observable by any number of waiters, past or future. Observation after
//! the edge has fired returns immediately; probing is non-blocking.
//!
//! Realized over [`CancellationToken`], which already has the right
//! semantics: idempotent firing, cheap clones sharing one state, and an
//! awaitable that is ready forever after the first fire.

use tokio_util::sync::CancellationToken;

/// One-shot broadcast edge.
///
/// Handed out by [`Stopper::should_quiesce`](crate::Stopper::should_quiesce),
/// [`Stopper::should_stop`](crate::Stopper::should_stop), and
/// [`Stopper::is_stopped`](crate::Stopper::is_stopped). Clones observe the
/// same underlying edge.
#[derive(Clone, Debug, Default)]
pub struct Signal {
    token: CancellationToken,
}

impl Signal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Fires the edge. Idempotent; every current and future waiter is unblocked.
    pub(crate) fn fire(&self) {
        self.token.cancel();
    }

    /// Returns whether the edge has fired, without blocking.
    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Completes when the edge fires. Completes immediately if it already has.
    pub async fn wait(&self) {
        self.token.cancelled().await;
    }
}
