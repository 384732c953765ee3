//! # Errors returned when work is refused at admission.
//!
//! [`AdmitError`] is the whole error surface of the coordinator. Lifecycle
//! operations (`stop`, `quiesce`, the signal accessors) never fail; only the
//! `run_*` family can, and only before the submitted body has started.
//! A refused admission leaves the coordinator's accounting untouched.

use thiserror::Error;

/// # Errors produced when a task is refused at admission.
///
/// Panics inside submitted bodies are not errors; they go through the
/// panic handler (see [`StopperBuilder::on_panic`](crate::StopperBuilder::on_panic)).
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitError {
    /// The coordinator has begun quiescing; no new work is accepted.
    #[error("stopper is quiescing; new work refused")]
    Unavailable,

    /// The caller-supplied semaphore was full and waiting was not requested.
    #[error("concurrency limit reached")]
    Throttled,

    /// The ambient context was cancelled while waiting for a semaphore slot.
    ///
    /// This is **not an error** in the traditional sense, but signals
    /// intentional termination of the submitting scope.
    #[error("context canceled")]
    Canceled,
}

impl AdmitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            AdmitError::Unavailable => "admit_unavailable",
            AdmitError::Throttled => "admit_throttled",
            AdmitError::Canceled => "admit_canceled",
        }
    }
}
