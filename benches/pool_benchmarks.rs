use criterion::{criterion_group, criterion_main, Criterion, BenchmarkId, Throughput};
use slot_pool::{program_fn, Config as PoolConfig, WorkerPool};
use futures::future::join_all;
use std::hint::black_box;

fn create_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

// Benchmark 1: Submit overhead
fn bench_submit_overhead(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit_overhead");

    for size in [100, 1000, 10000] {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(
            BenchmarkId::new("worker_pool", size),
            &size,
            |b, &size| {
                let rt = create_runtime();

                // Пул создаётся один раз, воркеры переиспользуются между итерациями
                let pool = rt.block_on(async {
                    WorkerPool::with_config(
                        program_fn(|x: u64| Ok::<_, ()>(black_box(x))),
                        PoolConfig::cpu_bound(),
                    )
                    .unwrap()
                });

                b.to_async(&rt).iter(|| {
                    let pool = &pool;
                    async move {
                        let handles: Vec<_> = (0..size).map(|i| pool.submit(i)).collect();
                        for handle in handles {
                            black_box(handle.await.unwrap());
                        }
                    }
                });
            },
        );

        // tokio baseline
        group.bench_with_input(
            BenchmarkId::new("spawn_blocking", size),
            &size,
            |b, &size| {
                let rt = create_runtime();

                b.to_async(&rt).iter(|| async {
                    let handles: Vec<_> = (0..size)
                        .map(|i: u64| tokio::task::spawn_blocking(move || black_box(i)))
                        .collect();

                    for handle in handles {
                        black_box(handle.await.unwrap());
                    }
                });
            },
        );
    }

    group.finish();
}

// Benchmark 2: Thread scaling on CPU-bound work
fn bench_thread_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("thread_scaling");
    group.sample_size(20);

    let tasks = 2000u64;
    group.throughput(Throughput::Elements(tasks));

    for threads in [1, 2, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let rt = create_runtime();
            let pool = rt.block_on(async {
                WorkerPool::new(
                    program_fn(|x: u64| {
                        let mut acc = x;
                        for i in 0..1_000u64 {
                            acc = acc.wrapping_mul(6364136223846793005).wrapping_add(i);
                        }
                        Ok::<_, ()>(acc)
                    }),
                    threads,
                )
                .unwrap()
            });

            b.to_async(&rt).iter(|| {
                let pool = &pool;
                async move {
                    let results = join_all((0..tasks).map(|x| pool.submit(x))).await;
                    black_box(results);
                }
            });
        });
    }

    group.finish();
}

// Benchmark 3: Latency under load
fn bench_latency_under_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("latency_under_load");
    group.sample_size(20);

    group.bench_function("queued_behind_1000", |b| {
        let rt = create_runtime();
        let pool = rt.block_on(async {
            WorkerPool::with_config(
                program_fn(|x: u64| Ok::<_, ()>(black_box(x))),
                PoolConfig::default().with_threads(4),
            )
            .unwrap()
        });

        b.to_async(&rt).iter(|| {
            let pool = &pool;
            async move {
                // Создаем фоновую нагрузку
                let _bg_handles: Vec<_> = (0..1000).map(|i| pool.submit(i)).collect();

                // Измеряем latency этой задачи
                let handle = pool.submit(42);
                let _result = handle.await;
            }
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_submit_overhead,
    bench_thread_scaling,
    bench_latency_under_load,
);

criterion_main!(benches);
