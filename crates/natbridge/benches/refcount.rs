// Reference counting benchmarks
//
// This benchmark suite measures:
// - Uncontended retain/release pairs
// - Retain/release across threads on one object
// - Autorelease pool push, fill and drain
// - Weak loads of a live referent

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use natbridge::{Bridge, BridgeConfig};
use std::thread;

fn bench_retain_release(c: &mut Criterion) {
    let bridge = Bridge::new(BridgeConfig::default());
    let s = bridge.create_native_string("bench").unwrap();

    c.bench_function("retain_release", |b| {
        b.iter(|| {
            bridge.retain(black_box(s)).unwrap();
            bridge.release(black_box(s)).unwrap();
        })
    });
    bridge.release(s).unwrap();
}

fn bench_contended_retain_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("contended_retain_release");

    for threads in [2_usize, 4, 8] {
        group.throughput(Throughput::Elements((threads * 1_000) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &n| {
            let bridge = Bridge::new(BridgeConfig::default());
            let s = bridge.create_native_string("shared").unwrap();
            b.iter(|| {
                let handles: Vec<_> = (0..n)
                    .map(|_| {
                        let bridge = bridge.clone();
                        thread::spawn(move || {
                            for _ in 0..1_000 {
                                bridge.retain(s).unwrap();
                                bridge.release(s).unwrap();
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
            bridge.release(s).unwrap();
        });
    }
    group.finish();
}

fn bench_autorelease_pool(c: &mut Criterion) {
    let mut group = c.benchmark_group("autorelease_pool");

    for objects in [1_usize, 16, 256] {
        group.throughput(Throughput::Elements(objects as u64));
        group.bench_with_input(BenchmarkId::from_parameter(objects), &objects, |b, &n| {
            let bridge = Bridge::new(BridgeConfig::default());
            let s = bridge.create_native_string("pooled").unwrap();
            b.iter(|| {
                let pool = bridge.push_pool();
                for _ in 0..n {
                    bridge.retain(s).unwrap();
                    bridge.autorelease(s).unwrap();
                }
                bridge.pop_pool(pool).unwrap();
            });
            bridge.release(s).unwrap();
        });
    }
    group.finish();
}

fn bench_weak_load(c: &mut Criterion) {
    let bridge = Bridge::new(BridgeConfig::default());
    let s = bridge.create_native_string("observed").unwrap();
    let slot = bridge.weak_slot(s).unwrap();

    c.bench_function("weak_load_retained", |b| {
        b.iter(|| {
            let loaded = slot.load_retained().unwrap();
            bridge.release(black_box(loaded)).unwrap();
        })
    });
    drop(slot);
    bridge.release(s).unwrap();
}

criterion_group!(
    benches,
    bench_retain_release,
    bench_contended_retain_release,
    bench_autorelease_pool,
    bench_weak_load
);
criterion_main!(benches);
