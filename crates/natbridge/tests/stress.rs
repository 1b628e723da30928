//! Concurrency stress tests.

mod common;

use natbridge::runtime::managed::{ManagedObject, ManagedType};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;
const ROUNDS: usize = 2_000;

#[test]
fn test_concurrent_retain_release_is_balanced() {
    let bridge = common::bridge();
    let s = bridge.create_native_string("contended").unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let bridge = bridge.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ROUNDS {
                    bridge.retain(s).unwrap();
                    bridge.release(s).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(bridge.retain_count(s).unwrap(), 1);
    bridge.release(s).unwrap();
    assert!(!bridge.is_live(s));
}

#[test]
fn test_weak_load_races_final_release() {
    let bridge = common::bridge();

    for round in 0..200_u64 {
        let s = bridge.create_native_string("racing").unwrap();
        let location = 0x9000 + round;
        bridge.store_weak(location, s).unwrap();
        let barrier = Arc::new(Barrier::new(2));

        let loader = {
            let bridge = bridge.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let loaded = bridge.load_weak_retained(location).unwrap();
                if !loaded.is_null() {
                    // A non-null load is a live object we now own a retain on.
                    assert_eq!(bridge.native_string_value(loaded).unwrap(), "racing");
                    bridge.release(loaded).unwrap();
                }
            })
        };

        barrier.wait();
        bridge.release(s).unwrap();
        loader.join().unwrap();

        assert!(bridge.load_weak_retained(location).unwrap().is_null());
        bridge.destroy_weak(location);
    }
    assert_eq!(bridge.live_object_count(), 0);
}

#[test]
fn test_binding_survives_concurrent_native_retains() {
    let bridge = common::bridge();
    let ty = ManagedType::builder("Shared").build();
    let s = bridge.create_native_string("shared").unwrap();
    let wrapper = bridge.wrap_native(s, &ty).unwrap();
    bridge.release(s).unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let bridge = bridge.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..ROUNDS / 4 {
                    bridge.retain(s).unwrap();
                    assert!(bridge.binding(s).unwrap().is_some());
                    bridge.release(s).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(bridge.retain_count(s).unwrap(), 1);
    let weak = Arc::downgrade(&wrapper);
    drop(wrapper);
    assert!(weak.upgrade().is_none());
    assert!(!bridge.is_live(s));
}

#[test]
fn test_proxy_instances_from_many_threads() {
    let bridge = common::bridge();
    let widget = common::widget_type();
    let created = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let bridge = bridge.clone();
            let widget = Arc::clone(&widget);
            let created = Arc::clone(&created);
            thread::spawn(move || {
                for _ in 0..50 {
                    let class = bridge.create_proxy_class(&widget).unwrap();
                    let m = ManagedObject::stateless(&widget);
                    let peer = bridge.create_proxy_instance(class, &m).unwrap();
                    created.fetch_add(1, Ordering::Relaxed);
                    bridge.release(peer).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(created.load(Ordering::Relaxed), THREADS * 50);
    assert_eq!(bridge.live_object_count(), 0);
}
