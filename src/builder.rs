//! Builder for constructing a [`Stopper`] with optional features.

use std::any::Any;
use std::sync::Arc;

use crate::stopper::{PanicHandler, Stopper};

/// Builder returned by [`Stopper::builder`].
pub struct StopperBuilder {
    pub(crate) bus_capacity: usize,
    pub(crate) on_panic: Option<PanicHandler>,
}

impl StopperBuilder {
    pub(crate) fn new() -> Self {
        Self {
            bus_capacity: 256,
            on_panic: None,
        }
    }

    /// Sets the capacity of the event bus channel.
    ///
    /// Slow subscribers past this backlog observe a lagged stream; the
    /// coordinator itself never blocks on publication.
    pub fn bus_capacity(mut self, capacity: usize) -> Self {
        self.bus_capacity = capacity;
        self
    }

    /// Registers a handler for panics recovered from tasks, workers, and
    /// closers. The handler receives the panic payload; accounting cleanup
    /// has already happened by the time it runs.
    ///
    /// Without a handler, recovered panics are re-raised.
    pub fn on_panic<H>(mut self, handler: H) -> Self
    where
        H: Fn(Box<dyn Any + Send>) + Send + Sync + 'static,
    {
        self.on_panic = Some(Arc::new(handler));
        self
    }

    /// Builds and returns the coordinator.
    pub fn build(self) -> Stopper {
        Stopper::from_builder(self)
    }
}
