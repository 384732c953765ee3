//! Shutdown staging: workers gate `stop()`, closers gate the Stopped signal,
//! in-flight tasks gate the Stop signal, and derived tokens fire at quiesce.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use stopper::{AdmitError, CloserFn, EventKind, Stopper};

#[tokio::test]
async fn worker_gates_stop() {
    let s = Stopper::new();
    let (release_tx, release_rx) = oneshot::channel::<()>();

    s.run_worker(CancellationToken::new(), move |_ctx| async move {
        let _ = release_rx.await;
    });

    let (done_tx, mut done_rx) = oneshot::channel::<()>();
    let stopper = s.clone();
    tokio::spawn(async move {
        stopper.stop().await;
        let _ = done_tx.send(());
    });

    timeout(Duration::from_millis(100), s.should_stop().wait())
        .await
        .expect("stop signal should fire with no tasks in flight");

    // The worker is still running, so stop() must not have returned.
    assert!(
        timeout(Duration::from_millis(100), &mut done_rx).await.is_err(),
        "expected stop() to block on the worker"
    );

    release_tx.send(()).unwrap();
    timeout(Duration::from_secs(1), done_rx)
        .await
        .expect("stop() should return once the worker exits")
        .unwrap();
}

#[tokio::test]
async fn blocking_closer_gates_is_stopped() {
    let s = Stopper::new();
    let (unblock_tx, unblock_rx) = oneshot::channel::<()>();
    s.add_closer(CloserFn::boxed(move || async move {
        let _ = unblock_rx.await;
    }));

    let stopper = s.clone();
    tokio::spawn(async move { stopper.stop().await });

    timeout(Duration::from_secs(1), s.should_stop().wait())
        .await
        .expect("stop signal");
    assert!(
        timeout(Duration::from_millis(100), s.is_stopped().wait()).await.is_err(),
        "expected the blocked closer to prevent the Stopped signal"
    );
    assert!(!s.is_stopped().is_fired());

    unblock_tx.send(()).unwrap();
    timeout(Duration::from_secs(1), s.is_stopped().wait())
        .await
        .expect("Stopped signal after the closer unblocks");
}

#[tokio::test]
async fn task_gates_stop_signal_under_quiesce() {
    let s = Stopper::new();
    let (worker_tx, worker_rx) = oneshot::channel::<()>();
    let (task_tx, task_rx) = oneshot::channel::<()>();

    s.run_worker(CancellationToken::new(), move |_ctx| async move {
        let _ = worker_rx.await;
    });
    s.run_async_task(CancellationToken::new(), move |_ctx| async move {
        let _ = task_rx.await;
    })
    .unwrap();

    let (done_tx, mut done_rx) = oneshot::channel::<()>();
    let stopper = s.clone();
    tokio::spawn(async move {
        stopper.stop().await;
        let _ = done_tx.send(());
    });

    // Quiescence begins immediately...
    timeout(Duration::from_secs(1), s.should_quiesce().wait())
        .await
        .expect("quiesce signal");
    // ...but the Stop signal waits for the in-flight async task.
    assert!(
        timeout(Duration::from_millis(100), s.should_stop().wait()).await.is_err(),
        "expected the in-flight task to gate the Stop signal"
    );

    task_tx.send(()).unwrap();
    timeout(Duration::from_secs(1), s.should_stop().wait())
        .await
        .expect("Stop signal after the task drains");

    // The worker still gates stop() itself.
    assert!(timeout(Duration::from_millis(100), &mut done_rx).await.is_err());
    worker_tx.send(()).unwrap();
    timeout(Duration::from_secs(1), done_rx)
        .await
        .expect("stop() should return")
        .unwrap();
}

#[tokio::test]
async fn stop_drains_multiple_workers() {
    let s = Stopper::new();
    for _ in 0..3 {
        let stop = s.should_stop();
        s.run_worker(CancellationToken::new(), move |_ctx| async move {
            stop.wait().await;
        });
    }

    timeout(Duration::from_secs(1), s.stop())
        .await
        .expect("stop() should complete once every worker observes the signal");

    assert!(s.should_quiesce().is_fired());
    assert!(s.should_stop().is_fired());
    assert!(s.is_stopped().is_fired());
    assert_eq!(s.num_tasks(), 0);
}

#[tokio::test]
async fn quiesce_refuses_new_tasks_across_coordinators() {
    let mut coordinators = Vec::new();
    let mut quiesced = Vec::new();
    let mut attempted = Vec::new();

    for _ in 0..3 {
        let s = Stopper::new();
        let (qc_tx, qc_rx) = oneshot::channel::<()>();
        let (sc_tx, sc_rx) = oneshot::channel::<Result<(), AdmitError>>();

        let worker_s = s.clone();
        s.run_worker(CancellationToken::new(), move |ctx| async move {
            // Wait until quiesce() has been observed by the driver.
            let _ = qc_rx.await;
            let res = worker_s.run_task(ctx, |_ctx| async {}).await;
            let _ = sc_tx.send(res);
            worker_s.should_stop().wait().await;
        });

        coordinators.push(s);
        quiesced.push(qc_tx);
        attempted.push(sc_rx);
    }

    let driver = async {
        for s in &coordinators {
            s.quiesce().await;
        }
        for qc in quiesced {
            qc.send(()).unwrap();
        }
        for sc in attempted {
            let res = sc.await.unwrap();
            assert!(matches!(res, Err(AdmitError::Unavailable)));
        }
        for s in &coordinators {
            s.stop().await;
            assert!(s.is_stopped().is_fired());
        }
    };

    timeout(Duration::from_secs(1), driver)
        .await
        .expect("quiesce/stop round should finish");
}

#[tokio::test]
async fn closers_run_in_registration_order() {
    let s = Stopper::new();
    let order = Arc::new(Mutex::new(Vec::new()));
    for i in 0..3 {
        let order = order.clone();
        s.add_closer(CloserFn::boxed(move || async move {
            order.lock().unwrap().push(i);
        }));
    }

    s.stop().await;
    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
}

#[tokio::test]
async fn closer_added_after_stop_is_dropped() {
    let s = Stopper::new();
    s.stop().await;

    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    s.add_closer(CloserFn::boxed(move || async move {
        flag.store(true, Ordering::SeqCst);
    }));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!ran.load(Ordering::SeqCst), "late closer must never run");
}

#[tokio::test]
async fn derived_token_cancelled_at_quiesce() {
    let s = Stopper::new();
    let parent = CancellationToken::new();

    let derived = s.with_cancel(&parent);
    assert!(!derived.is_cancelled());

    s.stop().await;
    assert!(derived.is_cancelled());
    assert!(!parent.is_cancelled(), "the parent token is the caller's");

    // Deriving after quiescence yields an already-cancelled token.
    let late = s.with_cancel(&parent);
    assert!(late.is_cancelled());
}

#[tokio::test]
async fn shutdown_publishes_events_in_phase_order() {
    let s = Stopper::new();
    let mut rx = s.subscribe();

    s.stop().await;

    let mut kinds = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        kinds.push(ev.kind);
    }
    assert_eq!(
        kinds,
        vec![
            EventKind::StopRequested,
            EventKind::QuiesceRequested,
            EventKind::TasksDrained,
            EventKind::WorkersDrained,
            EventKind::Stopped,
        ]
    );
}

#[tokio::test]
async fn repeated_and_concurrent_stops_converge() {
    let s = Stopper::new();

    let mut joins = Vec::new();
    for _ in 0..4 {
        let stopper = s.clone();
        joins.push(tokio::spawn(async move { stopper.stop().await }));
    }
    for join in joins {
        timeout(Duration::from_secs(1), join).await.unwrap().unwrap();
    }

    // A stop after completion returns immediately.
    timeout(Duration::from_millis(100), s.stop()).await.unwrap();
    assert!(s.is_stopped().is_fired());
}
