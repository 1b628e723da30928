//! Weak references interacting with pools, bindings and other bridges.

mod common;

use natbridge::runtime::managed::{ManagedObject, ManagedType};
use natbridge::Error;

#[test]
fn test_pooled_load_keeps_referent_until_drain() {
    let bridge = common::bridge();
    let s = bridge.create_native_string("observed").unwrap();
    let slot = bridge.weak_slot(s).unwrap();

    let pool = bridge.push_pool();
    assert_eq!(slot.load().unwrap(), s);
    bridge.release(s).unwrap();

    // The pool still holds the load's retain.
    assert!(bridge.is_live(s));
    assert_eq!(bridge.native_string_value(s).unwrap(), "observed");

    bridge.pop_pool(pool).unwrap();
    for _ in 0..3 {
        assert!(slot.load().unwrap().is_null());
    }
}

#[test]
fn test_weak_load_promotes_owned_binding() {
    let bridge = common::bridge();
    let ty = ManagedType::builder("Observed").build();
    let s = bridge.create_native_string("bound").unwrap();
    let wrapper = bridge.wrap_native(s, &ty).unwrap();
    bridge.release(s).unwrap();
    let slot = bridge.weak_slot(s).unwrap();

    let loaded = slot.load_retained().unwrap();
    assert_eq!(loaded, s);
    // Now retained natively, so the wrapper must survive its managed owner.
    let weak = std::sync::Arc::downgrade(&wrapper);
    drop(wrapper);
    assert!(weak.upgrade().is_some());

    bridge.release(loaded).unwrap();
    assert!(weak.upgrade().is_none());
    assert!(slot.load_retained().unwrap().is_null());
}

#[test]
fn test_slots_on_different_bridges_are_independent() {
    let first = common::bridge();
    let second = common::bridge();
    let a = first.create_native_string("a").unwrap();
    let b = second.create_native_string("b").unwrap();

    first.store_weak(0x5000, a).unwrap();
    second.store_weak(0x5000, b).unwrap();
    first.release(a).unwrap();

    assert!(first.load_weak_retained(0x5000).unwrap().is_null());
    let loaded = second.load_weak_retained(0x5000).unwrap();
    assert_eq!(loaded, b);
    second.release(loaded).unwrap();
    second.release(b).unwrap();
}

#[test]
fn test_dead_referent_is_rejected() {
    let bridge = common::bridge();
    let ty = ManagedType::builder("Gone").build();
    let m = ManagedObject::stateless(&ty);
    let s = bridge.create_native_string("x").unwrap();
    bridge.set_binding(s, Some(&m)).unwrap();
    bridge.release(s).unwrap();

    assert_eq!(
        bridge.store_weak(0x6000, s),
        Err(Error::InvalidHandle { handle: s })
    );
    assert!(bridge.weak_slot(s).is_err());
}
