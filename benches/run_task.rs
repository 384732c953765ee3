//! Overhead of routing a call through the coordinator versus calling it
//! directly. The body is a no-op, so the measured cost is admission,
//! accounting, and panic containment.

use criterion::{criterion_group, criterion_main, Criterion};
use tokio_util::sync::CancellationToken;

use stopper::Stopper;

async fn direct(_ctx: CancellationToken) {}

fn direct_call(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();

    c.bench_function("direct_call", |b| {
        b.to_async(&rt)
            .iter(|| async { direct(CancellationToken::new()).await });
    });
}

fn through_stopper(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap();
    let s = Stopper::new();

    c.bench_function("run_task", |b| {
        b.to_async(&rt).iter(|| {
            let s = s.clone();
            async move {
                s.run_task(CancellationToken::new(), direct).await.unwrap();
            }
        });
    });

    rt.block_on(s.stop());
}

criterion_group!(benches, direct_call, through_stopper);
criterion_main!(benches);
