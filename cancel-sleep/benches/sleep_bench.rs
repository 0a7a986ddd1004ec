//! Benchmarks for sleep construction and cancellation.

use cancel_sleep::{sleep, Context, ContextOptions};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn sleep_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    c.bench_function("sleep_cancel", |b| {
        b.iter(|| {
            rt.block_on(async {
                let sleeping = sleep(black_box(60_000));
                sleeping.cancel();
                let _ = black_box(sleeping.await);
            });
        });
    });

    c.bench_function("sleep_context_cancel", |b| {
        b.iter(|| {
            rt.block_on(async {
                let ctx = Context::background();
                let sleeping = sleep(black_box(60_000)).set_context(&ctx).unwrap();
                ctx.cancel();
                let _ = black_box(sleeping.await);
            });
        });
    });

    c.bench_function("context_tree", |b| {
        b.iter(|| {
            let root = Context::background();
            let children: Vec<_> = (0..16).map(|_| root.child(ContextOptions::new())).collect();
            root.cancel();
            black_box(children);
        });
    });
}

criterion_group!(benches, sleep_benchmark);
criterion_main!(benches);
