//! # Runtime events emitted while the coordinator changes phase.
//!
//! The [`EventKind`] enum classifies the phase boundaries of a shutdown and
//! the one abnormal condition worth reporting (a panicking body). The
//! [`Event`] struct carries the kind plus optional metadata: the launch site
//! of the activity involved and an error message.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so events can be ordered correctly even when delivered
//! out-of-order through async channels.
//!
//! ## Shutdown event flow
//! ```text
//! Stopper::stop()
//!   → StopRequested
//!   → QuiesceRequested   (admission gate closes, derived tokens cancel)
//!   → TasksDrained       (task counter reached zero; Stop signal fired)
//!   → WorkersDrained     (worker counter reached zero; closers run next)
//!   → Stopped            (closers done; Stopped signal fired)
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of coordinator events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A full stop was requested; quiescence begins next.
    StopRequested,
    /// Quiescence began: no new tasks are admitted, derived tokens fired.
    QuiesceRequested,
    /// Every admitted task has completed; the Stop signal fired.
    TasksDrained,
    /// Every worker has exited; closers run next.
    WorkersDrained,
    /// A task, worker, or closer body panicked.
    TaskPanicked,
    /// Closers finished; the Stopped signal fired.
    Stopped,
}

/// Coordinator event with optional metadata.
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp (may go backwards, use for logging only).
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// `file:line` of the activity's launch site, if applicable.
    pub place: Option<String>,
    /// Error message, if the event represents a failure.
    pub error: Option<String>,
}

impl Event {
    /// Creates a new event of the given kind with the current timestamp and
    /// next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            place: None,
            error: None,
        }
    }

    /// Attaches a launch-site label.
    pub fn with_place(mut self, place: impl Into<String>) -> Self {
        self.place = Some(place.into());
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }
}
