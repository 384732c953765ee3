//! # stopper
//!
//! **Stopper** is a task lifecycle coordinator for tokio.
//!
//! It tracks every worker and task belonging to a subsystem of a long-lived
//! process, so that when the subsystem is asked to terminate, shutdown is
//! staged, deterministic, and leak-free. The crate is designed as a building
//! block: servers, nodes, and embedded subsystems own a [`Stopper`] and
//! route all their concurrent activities through it.
//!
//! ## Features
//!
//! | Area            | Description                                                        | Key types / operations                      |
//! |-----------------|--------------------------------------------------------------------|---------------------------------------------|
//! | **Execution**   | Admit synchronous, async, and rate-limited async tasks and workers.| [`Stopper::run_task`], [`Stopper::run_worker`] |
//! | **Lifecycle**   | Three-phase shutdown: quiesce, drain, finalize.                    | [`Stopper::stop`], [`Stopper::quiesce`]     |
//! | **Signals**     | One-shot broadcast edges at every phase boundary.                  | [`Signal`], [`Stopper::should_stop`]        |
//! | **Closers**     | Ordered cleanup actions run after everything drained.              | [`Close`], [`CloserFn`]                     |
//! | **Diagnostics** | Per-call-site histogram of what is still running.                  | [`Stopper::running_tasks`]                  |
//! | **Events**      | Broadcast stream of phase transitions and panics.                  | [`Event`], [`Observer`]                     |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] observer _(demo/reference only)_.
//!
//! ```no_run
//! use tokio_util::sync::CancellationToken;
//! use stopper::{CloserFn, Stopper};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let s = Stopper::new();
//!     let root = CancellationToken::new();
//!
//!     // A long-lived worker: runs until shutdown begins.
//!     let quiesce = s.should_quiesce();
//!     s.run_worker(root.clone(), move |_ctx| async move {
//!         quiesce.wait().await;
//!     });
//!
//!     // A short-lived task: its completion gates shutdown.
//!     s.run_async_task(root.clone(), |_ctx| async move {
//!         // do work...
//!     })?;
//!
//!     // Cleanup, run after all of the above have drained.
//!     s.add_closer(CloserFn::boxed(|| async {
//!         // flush, release, disconnect...
//!     }));
//!
//!     s.stop().await;
//!     Ok(())
//! }
//! ```
//!
//! ---

mod builder;
mod bus;
mod closer;
mod error;
mod event;
mod observer;
mod os_signals;
mod signal;
mod stopper;
mod tracker;

// ---- Public re-exports ----

pub use builder::StopperBuilder;
pub use closer::{Close, CloserFn};
pub use error::AdmitError;
pub use event::{Event, EventKind};
pub use observer::Observer;
pub use os_signals::wait_for_shutdown_signal;
pub use signal::Signal;
pub use stopper::{PanicHandler, Stopper};

// Optional: expose a simple built-in logger observer (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use observer::LogWriter;
