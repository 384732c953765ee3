//! # Cleanup actions run during finalization.
//!
//! A [`Close`] implementation is registered with
//! [`Stopper::add_closer`](crate::Stopper::add_closer) and consumed exactly
//! once, after all tasks and workers have drained. Closers run sequentially
//! in registration order; a closer that blocks holds up the Stopped signal
//! until it returns.
//!
//! [`CloserFn`] wraps a `FnOnce() -> Future` closure so one-off cleanup does
//! not need a named type. Use [`CloserFn::boxed`] for a one-liner that
//! returns a `Box<dyn Close>`.

use std::future::Future;

use async_trait::async_trait;

/// # Asynchronous, single-shot cleanup action.
///
/// `close` consumes the closer; the coordinator owns the box until
/// finalization and calls it exactly once.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use stopper::Close;
///
/// struct FlushOnExit;
///
/// #[async_trait]
/// impl Close for FlushOnExit {
///     async fn close(self: Box<Self>) {
///         // flush buffers, release handles...
///     }
/// }
/// ```
#[async_trait]
pub trait Close: Send + Sync {
    /// Runs the cleanup action.
    async fn close(self: Box<Self>);
}

/// # Function-backed closer.
///
/// Wraps a `FnOnce() -> Future` closure. The closure runs when the
/// coordinator finalizes.
///
/// # Example
/// ```
/// use stopper::{CloserFn, Stopper};
///
/// let s = Stopper::new();
/// s.add_closer(CloserFn::boxed(|| async {
///     // cleanup...
/// }));
/// ```
pub struct CloserFn<F> {
    func: F,
}

impl<F> CloserFn<F> {
    /// Creates a new function-backed closer.
    ///
    /// Prefer [`CloserFn::boxed`] when you immediately need a `Box<dyn Close>`.
    pub fn new(func: F) -> Self {
        Self { func }
    }

    /// Creates the closer and returns it boxed as a trait object.
    pub fn boxed<Fut>(func: F) -> Box<dyn Close>
    where
        F: FnOnce() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Box::new(Self::new(func))
    }
}

#[async_trait]
impl<F, Fut> Close for CloserFn<F>
where
    F: FnOnce() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn close(self: Box<Self>) {
        (self.func)().await;
    }
}
