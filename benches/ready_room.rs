use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

fn ready_query(c: &mut Criterion) {
    c.bench_function("ready_query", |b| {
        let readiness = ready_room::Readiness::new();

        readiness
            .initialized_successfully(black_box(42u64))
            .unwrap();

        b.iter(|| black_box(readiness.is_initialized()));
    });
}

fn resolved_await(c: &mut Criterion) {
    c.bench_function("resolved_await", |b| {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let readiness = ready_room::Readiness::new();

        readiness
            .initialized_successfully(black_box(42u64))
            .unwrap();

        let mut b = b.to_async(rt);

        b.iter(|| black_box(readiness.ensure_initialized()));
    });
}

fn full_cycle(c: &mut Criterion) {
    c.bench_function("full_cycle", |b| {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let readiness = ready_room::Readiness::new();

        readiness.initialized_successfully(0u64).unwrap();

        let mut b = b.to_async(rt);

        b.iter(|| async {
            readiness
                .reinitialize(async || Ok::<_, std::io::Error>(black_box(42)), true)
                .await
                .unwrap()
        });
    });
}

criterion_group!(benches, ready_query, resolved_await, full_cycle);
criterion_main!(benches);
