//! # Event consumers.
//!
//! An [`Observer`] receives every [`Event`] the coordinator publishes.
//! Attach one with [`Stopper::observe`](crate::Stopper::observe); the
//! coordinator spawns a dedicated forwarding listener per observer so a slow
//! consumer never blocks the shutdown path.

use async_trait::async_trait;

use crate::event::Event;

/// Consumer of coordinator events (logging, metrics, custom hooks).
#[async_trait]
pub trait Observer: Send + Sync {
    /// Called once per published event, in publication order.
    async fn on_event(&self, event: &Event);
}

/// Base observer that logs events to stdout.
///
/// Enabled via the `logging` feature. Useful for demos and debugging.
#[cfg(feature = "logging")]
pub struct LogWriter;

#[cfg(feature = "logging")]
#[async_trait]
impl Observer for LogWriter {
    async fn on_event(&self, e: &Event) {
        use crate::event::EventKind;

        match e.kind {
            EventKind::StopRequested => println!("[stop-requested]"),
            EventKind::QuiesceRequested => println!("[quiesce-requested]"),
            EventKind::TasksDrained => println!("[tasks-drained]"),
            EventKind::WorkersDrained => println!("[workers-drained]"),
            EventKind::TaskPanicked => {
                println!("[panicked] place={:?} err={:?}", e.place, e.error);
            }
            EventKind::Stopped => println!("[stopped]"),
        }
    }
}
