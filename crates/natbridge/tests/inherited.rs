//! Managed subclasses of native classes, allocated from either side.

mod common;

use natbridge::runtime::init_target::{init_target, set_init_target, unset_init_target};
use natbridge::runtime::managed::{
    ManagedException, ManagedMethod, ManagedObject, ManagedType, ManagedValue,
};
use natbridge::runtime::Value;
use natbridge::{Bridge, Error, Handle};
use std::sync::Arc;

/// A native base class and a managed subclass whose `tag` returns the
/// receiver's `i32` state.
fn counter_types(bridge: &Bridge) -> (Arc<ManagedType>, Handle) {
    let native = common::unique_name("NSCounter");
    bridge.define_class(&native, None).unwrap();
    let base = ManagedType::builder(common::unique_name("app.Counter"))
        .binding(native)
        .build();

    let sub = ManagedType::builder(common::unique_name("app.MyCounter"))
        .subclass_of(&base)
        .method(
            ManagedMethod::new("tag", common::sig("i@:"), |call| {
                call.receiver_state::<i32>()
                    .copied()
                    .map(ManagedValue::Int)
                    .ok_or_else(|| ManagedException::new("ClassCastException", "no state"))
            })
            .with_selector("tag"),
        )
        .build();
    let class = bridge.register_class(&sub).unwrap().class();
    (sub, class)
}

#[test]
fn test_managed_initiated_construction() {
    let bridge = common::bridge();
    let (ty, class) = counter_types(&bridge);
    let managed = ManagedObject::new(&ty, 11_i32);

    let peer = bridge.construct_inherited(class, &managed).unwrap();
    assert!(init_target().is_none());
    assert_eq!(managed.peer(), peer);
    assert!(managed.owns_peer());
    assert!(bridge.is_kind_of_inherited_class(peer).unwrap());
    assert_eq!(bridge.send(peer, "tag", &[]).unwrap(), Value::Int(11));

    // Constructing the same object twice is rejected.
    assert!(matches!(
        bridge.construct_inherited(class, &managed),
        Err(Error::IncompatibleBaseClass { .. })
    ));

    drop(managed);
    assert!(!bridge.is_live(peer));
}

#[test]
fn test_native_retain_outlives_managed_reference() {
    let bridge = common::bridge();
    let (ty, class) = counter_types(&bridge);
    let managed = ManagedObject::new(&ty, 5_i32);
    let peer = bridge.construct_inherited(class, &managed).unwrap();

    bridge.retain(peer).unwrap();
    drop(managed);
    assert!(bridge.is_live(peer));
    assert_eq!(bridge.send(peer, "tag", &[]).unwrap(), Value::Int(5));

    bridge.release(peer).unwrap();
    assert!(!bridge.is_live(peer));
}

#[test]
fn test_native_initiated_allocation_uses_constructor() {
    let bridge = common::bridge();
    let native = common::unique_name("NSGauge");
    bridge.define_class(&native, None).unwrap();
    let base = ManagedType::builder(common::unique_name("app.Gauge"))
        .binding(native)
        .build();
    let sub = ManagedType::builder(common::unique_name("app.MyGauge"))
        .subclass_of(&base)
        .method(
            ManagedMethod::new("level", common::sig("i@:"), |call| {
                Ok(ManagedValue::Int(*call.receiver_state::<i32>().unwrap_or(&-1)))
            })
            .with_selector("level"),
        )
        .build();
    let ctor_type = Arc::clone(&sub);
    let sub_with_ctor = ManagedType::builder(sub.name().to_string() + "Built")
        .subclass_of(&base)
        .method(
            ManagedMethod::new("level", common::sig("i@:"), |call| {
                Ok(ManagedValue::Int(*call.receiver_state::<i32>().unwrap_or(&-1)))
            })
            .with_selector("level"),
        )
        .constructor(move |_, _| Ok(ManagedObject::new(&ctor_type, 77_i32)))
        .build();

    let class = bridge.register_class(&sub_with_ctor).unwrap().class();
    let peer = bridge.alloc_instance(class).unwrap();
    assert_eq!(bridge.send(peer, "level", &[]).unwrap(), Value::Int(77));
    let bound = bridge.binding(peer).unwrap().unwrap();
    assert!(!bound.owns_peer());
    drop(bound);

    bridge.release(peer).unwrap();
    assert_eq!(bridge.live_object_count(), 0);

    // Without a constructor there is nothing to bind.
    let bare = bridge.register_class(&sub).unwrap().class();
    assert!(matches!(
        bridge.alloc_instance(bare),
        Err(Error::MissingConstructor { .. })
    ));
}

#[test]
fn test_unrelated_allocation_leaves_init_target_parked() {
    let bridge = common::bridge();
    let (ty, class) = counter_types(&bridge);
    let managed = ManagedObject::new(&ty, 1_i32);

    set_init_target(&managed).unwrap();
    let plain = bridge
        .define_class(&common::unique_name("Plain"), None)
        .unwrap();
    let other = bridge.alloc_instance(plain).unwrap();
    assert!(init_target().is_some());
    assert_eq!(set_init_target(&managed), Err(Error::InitTargetAlreadySet));

    // The matching allocation consumes it.
    let peer = bridge.alloc_instance(class).unwrap();
    assert!(init_target().is_none());
    assert!(unset_init_target().is_none());
    assert_eq!(managed.peer(), peer);

    bridge.release(other).unwrap();
    drop(managed);
    assert!(!bridge.is_live(peer));
}

#[test]
fn test_constructions_on_different_threads_do_not_interfere() {
    let bridge = common::bridge();
    let (ty, class) = counter_types(&bridge);

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let bridge = bridge.clone();
            let ty = Arc::clone(&ty);
            std::thread::spawn(move || {
                let managed = ManagedObject::new(&ty, i);
                let peer = bridge.construct_inherited(class, &managed).unwrap();
                let tag = bridge.send(peer, "tag", &[]).unwrap();
                drop(managed);
                tag
            })
        })
        .collect();

    let mut tags: Vec<Value> = workers.into_iter().map(|w| w.join().unwrap()).collect();
    tags.sort_by_key(|v| match v {
        Value::Int(i) => *i,
        _ => i32::MIN,
    });
    assert_eq!(
        tags,
        vec![Value::Int(0), Value::Int(1), Value::Int(2), Value::Int(3)]
    );
    assert_eq!(bridge.live_object_count(), 0);
}
