//! # Stopper: staged, leak-free shutdown for a pool of concurrent activities.
//!
//! A [`Stopper`] is attached to one subsystem and tracks every worker and
//! task belonging to it. Shutdown is a three-phase protocol: the admission
//! gate closes, in-flight tasks drain, workers observe the Stop signal and
//! exit, and registered closers run last. Each boundary is a one-shot
//! broadcast [`Signal`].
//!
//! ## Architecture
//! ```text
//!  run_task / run_async_task / run_limited_async_task
//!        │ admission (gate: phase == Running)
//!        ▼
//!  ┌───────────────┐ task counter drains ┌──────────────┐
//!  │    RUNNING    │──► QUIESCING ──────►│ fire Stop    │
//!  └───────────────┘ (fire Quiesce,      └──────┬───────┘
//!     ▲                cancel derived           │ workers drain
//!     │ run_worker     tokens)                  ▼
//!     │                                  closers (FIFO)
//!     │                                         │
//!     │                                         ▼
//!     └────────────────────────────────► STOPPED (fire Stopped)
//! ```
//!
//! ## Rules
//! - One lock protects phase, counters, closers, and derived tokens;
//!   signals fire outside it.
//! - Every admitted body decrements its counter on **every** exit path,
//!   panics included, so `stop()` cannot deadlock on a fault.
//! - The coordinator never times out its waits: a stuck task or closer
//!   blocks shutdown forever so the leak stays visible.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::{
    bus::Bus,
    builder::StopperBuilder,
    closer::Close,
    error::AdmitError,
    event::{Event, EventKind},
    observer::Observer,
    signal::Signal,
    tracker::{Site, SiteMap},
};

/// Callback invoked with the recovered payload when a task, worker, or
/// closer body panics. When no handler is registered the payload is
/// re-raised instead.
pub type PanicHandler = Arc<dyn Fn(Box<dyn Any + Send>) + Send + Sync>;

/// Lifecycle phase. Transitions are monotonic and never reversed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Phase {
    Running,
    Quiescing,
    Stopped,
}

/// State guarded by the coordinator lock.
struct Inner {
    phase: Phase,
    /// Set by the first `stop()` caller; later callers wait on the Stopped signal.
    stopping: bool,
    /// Count of admitted, not-yet-completed tasks. The decrement and the
    /// phase read that together elect the Stop-signal firer happen under
    /// the one lock.
    tasks: usize,
    /// Count of running workers, waited on by `stop()`.
    workers: watch::Sender<usize>,
    /// Cleanup actions, run in registration order during finalization.
    closers: Vec<Box<dyn Close>>,
    /// Tokens derived through `with_cancel`, fired when quiescence begins.
    cancels: Vec<CancellationToken>,
}

struct Shared {
    mu: Mutex<Inner>,
    workers_rx: watch::Receiver<usize>,
    sites: SiteMap,
    quiesce: Signal,
    stop: Signal,
    stopped: Signal,
    bus: Bus,
    on_panic: Option<PanicHandler>,
}

/// Task lifecycle coordinator.
///
/// Cheap to clone; all clones share one coordinator. See the
/// [module docs](self) for the shutdown protocol.
#[derive(Clone)]
pub struct Stopper {
    shared: Arc<Shared>,
}

impl Default for Stopper {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopper {
    /// Creates a coordinator with default options.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Returns a builder for a coordinator with custom options.
    pub fn builder() -> StopperBuilder {
        StopperBuilder::new()
    }

    pub(crate) fn from_builder(b: StopperBuilder) -> Self {
        let (workers, workers_rx) = watch::channel(0);

        Self {
            shared: Arc::new(Shared {
                mu: Mutex::new(Inner {
                    phase: Phase::Running,
                    stopping: false,
                    tasks: 0,
                    workers,
                    closers: Vec::new(),
                    cancels: Vec::new(),
                }),
                workers_rx,
                sites: SiteMap::new(),
                quiesce: Signal::new(),
                stop: Signal::new(),
                stopped: Signal::new(),
                bus: Bus::new(b.bus_capacity),
                on_panic: b.on_panic,
            }),
        }
    }

    // ---------------------------
    // Execution
    // ---------------------------

    /// Runs `f` inline on the caller, holding a task slot for its duration.
    ///
    /// The returned future resolves after `f` has completed. Fails with
    /// [`AdmitError::Unavailable`] once quiescence has begun.
    #[track_caller]
    pub fn run_task<F, Fut>(
        &self,
        ctx: CancellationToken,
        f: F,
    ) -> impl Future<Output = Result<(), AdmitError>>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()>,
    {
        let site = Site::here();
        let this = self.clone();
        async move {
            this.admit(site)?;
            let res = AssertUnwindSafe(async move { f(ctx).await })
                .catch_unwind()
                .await;
            this.finish_task(site);
            if let Err(payload) = res {
                this.fault(Some(site), payload);
            }
            Ok(())
        }
    }

    /// Admits a task and spawns `f` onto the runtime, returning after admission.
    ///
    /// Fails with [`AdmitError::Unavailable`] once quiescence has begun.
    #[track_caller]
    pub fn run_async_task<F, Fut>(&self, ctx: CancellationToken, f: F) -> Result<(), AdmitError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let site = Site::here();
        self.admit(site)?;
        self.spawn_task(ctx, site, None, f);
        Ok(())
    }

    /// As [`run_async_task`](Stopper::run_async_task), further gated by a
    /// caller-supplied semaphore of bounded capacity.
    ///
    /// With `wait` set, blocks until a slot is acquired, the ambient `ctx`
    /// is cancelled ([`AdmitError::Canceled`]), or quiescence begins
    /// ([`AdmitError::Unavailable`]). Without `wait`, a full semaphore fails
    /// with [`AdmitError::Throttled`].
    ///
    /// The admission gate is re-checked after the acquire: the semaphore may
    /// hold the caller for a long time, and quiescence can begin meanwhile.
    #[track_caller]
    pub fn run_limited_async_task<F, Fut>(
        &self,
        ctx: CancellationToken,
        sem: Arc<Semaphore>,
        wait: bool,
        f: F,
    ) -> impl Future<Output = Result<(), AdmitError>>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let site = Site::here();
        let this = self.clone();
        async move {
            if this.gate_closed() {
                return Err(AdmitError::Unavailable);
            }

            let permit = if wait {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => return Err(AdmitError::Canceled),
                    _ = this.shared.quiesce.wait() => return Err(AdmitError::Unavailable),
                    res = sem.acquire_owned() => {
                        res.map_err(|_| AdmitError::Unavailable)?
                    }
                }
            } else {
                match sem.try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(TryAcquireError::NoPermits) => return Err(AdmitError::Throttled),
                    Err(TryAcquireError::Closed) => return Err(AdmitError::Unavailable),
                }
            };

            // Quiescence may have begun while we held no slot; the permit is
            // released on the error path by dropping it.
            this.admit(site)?;
            this.spawn_task(ctx, site, Some(permit), f);
            Ok(())
        }
    }

    /// Launches `f` as a long-lived worker.
    ///
    /// Workers are expected to observe [`should_stop`](Stopper::should_stop)
    /// or [`should_quiesce`](Stopper::should_quiesce) and exit voluntarily;
    /// `stop()` blocks until every worker has returned. Registration is
    /// always accepted; a worker registered after `stop()` has returned is a
    /// caller bug and may outlive the Stopped signal.
    pub fn run_worker<F, Fut>(&self, ctx: CancellationToken, f: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        {
            let inner = self.shared.mu.lock();
            inner.workers.send_modify(|n| *n += 1);
        }

        let this = self.clone();
        tokio::spawn(async move {
            let res = AssertUnwindSafe(async move { f(ctx).await })
                .catch_unwind()
                .await;
            {
                let inner = this.shared.mu.lock();
                inner.workers.send_modify(|n| *n -= 1);
            }
            if let Err(payload) = res {
                this.fault(None, payload);
            }
        });
    }

    // ---------------------------
    // Lifecycle
    // ---------------------------

    /// Closes the admission gate and blocks until all tasks have drained.
    ///
    /// The first caller transitions the coordinator to quiescing, cancels
    /// every token handed out by [`with_cancel`](Stopper::with_cancel), and
    /// fires the Quiesce signal. Idempotent: concurrent and repeated callers
    /// all block until the task counter reaches zero.
    ///
    /// Workers are unaffected; use [`stop`](Stopper::stop) for full shutdown.
    pub async fn quiesce(&self) {
        let lead = {
            let mut inner = self.shared.mu.lock();
            if inner.phase == Phase::Running {
                inner.phase = Phase::Quiescing;
                Some((std::mem::take(&mut inner.cancels), inner.tasks == 0))
            } else {
                None
            }
        };

        if let Some((cancels, drained)) = lead {
            for token in cancels {
                token.cancel();
            }
            self.shared.quiesce.fire();
            self.shared.bus.publish(Event::now(EventKind::QuiesceRequested));

            // With tasks in flight the last decrement fires the Stop signal
            // (see `finish_task`); with none, it falls to the leader.
            if drained {
                self.fire_stop();
            }
        }

        self.shared.stop.wait().await;
    }

    /// Performs a full shutdown.
    ///
    /// Quiesces, waits for the task counter to drain, fires Stop, waits for
    /// every worker to exit, runs closers sequentially in registration
    /// order, and fires Stopped. Concurrent callers all observe the same
    /// completion; only the first performs the work.
    pub async fn stop(&self) {
        let leader = {
            let mut inner = self.shared.mu.lock();
            !std::mem::replace(&mut inner.stopping, true)
        };
        if !leader {
            self.shared.stopped.wait().await;
            return;
        }

        self.shared.bus.publish(Event::now(EventKind::StopRequested));
        self.quiesce().await;

        let mut workers = self.shared.workers_rx.clone();
        let _ = workers.wait_for(|n| *n == 0).await;
        self.shared.bus.publish(Event::now(EventKind::WorkersDrained));

        let closers = std::mem::take(&mut self.shared.mu.lock().closers);
        for closer in closers {
            let res = AssertUnwindSafe(closer.close()).catch_unwind().await;
            if let Err(payload) = res {
                self.fault(None, payload);
            }
        }

        self.shared.mu.lock().phase = Phase::Stopped;
        self.shared.stopped.fire();
        self.shared.bus.publish(Event::now(EventKind::Stopped));
    }

    /// Signal fired when quiescence begins.
    pub fn should_quiesce(&self) -> Signal {
        self.shared.quiesce.clone()
    }

    /// Signal fired when all tasks admitted before quiescence have completed.
    pub fn should_stop(&self) -> Signal {
        self.shared.stop.clone()
    }

    /// Signal fired when workers have exited and all closers have run.
    pub fn is_stopped(&self) -> Signal {
        self.shared.stopped.clone()
    }

    // ---------------------------
    // Registration
    // ---------------------------

    /// Appends a cleanup action, run after all tasks and workers have
    /// drained. Closers run sequentially in registration order; a blocking
    /// closer holds up the Stopped signal until it returns.
    ///
    /// Adding a closer after `stop()` has returned is a caller bug; the
    /// closer is silently dropped.
    pub fn add_closer(&self, closer: Box<dyn Close>) {
        let mut inner = self.shared.mu.lock();
        if inner.phase == Phase::Stopped {
            return;
        }
        inner.closers.push(closer);
    }

    /// Derives a child of `parent` that is cancelled when quiescence begins.
    ///
    /// If the coordinator is already quiescing the returned token is
    /// cancelled before being handed back.
    pub fn with_cancel(&self, parent: &CancellationToken) -> CancellationToken {
        let child = parent.child_token();
        let mut inner = self.shared.mu.lock();
        if inner.phase >= Phase::Quiescing {
            drop(inner);
            child.cancel();
        } else {
            inner.cancels.push(child.clone());
        }
        child
    }

    // ---------------------------
    // Diagnostics
    // ---------------------------

    /// Number of currently admitted, not-yet-completed tasks.
    pub fn num_tasks(&self) -> usize {
        self.shared.mu.lock().tasks
    }

    /// Snapshot of running tasks keyed by the `"file:line"` of their launch
    /// site. Entries disappear when their count reaches zero.
    pub fn running_tasks(&self) -> HashMap<String, usize> {
        self.shared.sites.snapshot()
    }

    /// Subscribes to the coordinator's event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// Attaches an observer on a dedicated forwarding listener.
    ///
    /// The listener runs until the coordinator (and every clone of it) has
    /// been dropped; it does not hold a task or worker slot, so it never
    /// gates shutdown.
    pub fn observe(&self, observer: Arc<dyn Observer>) {
        let mut rx = self.shared.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => observer.on_event(&ev).await,
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                }
            }
        });
    }

    // ---------------------------
    // Accounting
    // ---------------------------

    /// Takes a task slot, or refuses if the admission gate is closed.
    ///
    /// The counter increment is visible before this returns, so a drain that
    /// starts afterwards waits for the new task.
    fn admit(&self, site: Site) -> Result<(), AdmitError> {
        {
            let mut inner = self.shared.mu.lock();
            if inner.phase >= Phase::Quiescing {
                return Err(AdmitError::Unavailable);
            }
            inner.tasks += 1;
        }
        self.shared.sites.incr(site);
        Ok(())
    }

    /// Releases a task slot. Runs on every exit path, panics included.
    ///
    /// The decrement that brings the counter to zero after quiescence elects
    /// this caller to fire the Stop signal; the lock linearizes the
    /// decrement with the phase read.
    fn finish_task(&self, site: Site) {
        self.shared.sites.decr(site);
        let drained = {
            let mut inner = self.shared.mu.lock();
            inner.tasks -= 1;
            inner.phase >= Phase::Quiescing && inner.tasks == 0
        };
        if drained {
            self.fire_stop();
        }
    }

    /// Fires the Stop signal. Reached by exactly one caller per coordinator.
    fn fire_stop(&self) {
        self.shared.stop.fire();
        self.shared.bus.publish(Event::now(EventKind::TasksDrained));
    }

    fn gate_closed(&self) -> bool {
        self.shared.mu.lock().phase >= Phase::Quiescing
    }

    fn spawn_task<F, Fut>(
        &self,
        ctx: CancellationToken,
        site: Site,
        permit: Option<OwnedSemaphorePermit>,
        f: F,
    ) where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let res = AssertUnwindSafe(async move { f(ctx).await })
                .catch_unwind()
                .await;
            this.finish_task(site);
            if let Err(payload) = res {
                this.fault(Some(site), payload);
            }
        });
    }

    /// Reports a panicking body: forwards the payload to the registered
    /// handler, or re-raises it. Called only after accounting cleanup.
    fn fault(&self, site: Option<Site>, payload: Box<dyn Any + Send>) {
        let mut ev = Event::now(EventKind::TaskPanicked).with_error(panic_message(payload.as_ref()));
        if let Some(site) = site {
            ev = ev.with_place(site.label());
        }
        self.shared.bus.publish(ev);

        match &self.shared.on_panic {
            Some(handler) => handler(payload),
            None => std::panic::resume_unwind(payload),
        }
    }
}

/// Best-effort rendering of a panic payload for the event stream.
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
