//! A subsystem with one ticking worker, a handful of short-lived tasks, and
//! a closer, shut down cleanly after a moment of activity.
//!
//! Run with: `cargo run --example graceful`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use stopper::{CloserFn, Event, Observer, Stopper};

struct Printer;

#[async_trait]
impl Observer for Printer {
    async fn on_event(&self, e: &Event) {
        println!("event: {:?} place={:?} err={:?}", e.kind, e.place, e.error);
    }
}

#[tokio::main]
async fn main() {
    let s = Stopper::new();
    s.observe(Arc::new(Printer));

    let root = CancellationToken::new();

    // A worker that ticks until shutdown begins.
    let quiesce = s.should_quiesce();
    s.run_worker(root.clone(), move |_ctx| async move {
        let mut ticks = 0u64;
        loop {
            tokio::select! {
                _ = quiesce.wait() => break,
                _ = tokio::time::sleep(Duration::from_millis(200)) => {
                    ticks += 1;
                    println!("tick {ticks}");
                }
            }
        }
        println!("worker drained after {ticks} ticks");
    });

    // A few short-lived tasks; their completion gates the shutdown.
    for i in 0u64..4 {
        let res = s.run_async_task(root.clone(), move |_ctx| async move {
            tokio::time::sleep(Duration::from_millis(100 * i)).await;
        });
        if let Err(err) = res {
            eprintln!("task {i} refused: {err}");
        }
    }

    s.add_closer(CloserFn::boxed(|| async {
        println!("closer: flushing state");
    }));

    tokio::time::sleep(Duration::from_millis(700)).await;
    println!("running: {:?}", s.running_tasks());

    s.stop().await;
    println!("stopped; tasks remaining: {}", s.num_tasks());
}
