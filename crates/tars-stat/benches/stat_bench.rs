// Criterion benchmarks for tars-stat
//
// Run benchmarks with:
//   cargo bench -p tars-stat

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use std::time::Duration;
use tars_client::StatKey;
use tars_stat::{Outcome, StatStore};

fn key(i: usize) -> StatKey {
    StatKey {
        master_name: "client".into(),
        slave_app: "Demo".into(),
        slave_server: "Server".into(),
        interface_name: format!("method_{}", i),
        master_ip: "127.0.0.1".into(),
        slave_ip: "127.0.0.1".into(),
    }
}

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("record");

    let store = StatStore::default();
    let k = key(0);
    group.bench_function("existing_key", |b| {
        b.iter(|| store.record(black_box(&k), Outcome::Success, black_box(Duration::from_millis(3))))
    });

    group.finish();
}

fn bench_contended_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_record");

    for threads in [2usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let store = Arc::new(StatStore::default());
            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|t| {
                        let store = store.clone();
                        std::thread::spawn(move || {
                            let k = key(t % 2);
                            for _ in 0..1000 {
                                store.record(&k, Outcome::Success, Duration::from_millis(1));
                            }
                        })
                    })
                    .collect();
                for h in handles {
                    let _ = h.join();
                }
            })
        });
    }

    group.finish();
}

fn bench_flush(c: &mut Criterion) {
    let mut group = c.benchmark_group("flush");

    for keys in [10usize, 100, 1000] {
        group.bench_with_input(BenchmarkId::from_parameter(keys), &keys, |b, &keys| {
            let store = StatStore::default();
            let all: Vec<_> = (0..keys).map(key).collect();
            b.iter(|| {
                for k in &all {
                    store.record(k, Outcome::Success, Duration::from_millis(1));
                }
                black_box(store.flush())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_record, bench_contended_record, bench_flush);
criterion_main!(benches);
