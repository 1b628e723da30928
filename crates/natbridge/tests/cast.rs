//! Cast proxies seen from both sides of the bridge.

mod common;

use natbridge::runtime::managed::{ManagedMethod, ManagedType, ManagedValue};
use natbridge::runtime::Value;
use natbridge::{Bridge, Handle};
use std::sync::{Arc, Mutex};

/// A shape object and a cast of it to an unrelated surface class.
fn shape_cast(bridge: &Bridge, transparent: bool) -> (Handle, Handle) {
    let shape = bridge
        .define_class(&common::unique_name("NSShape"), None)
        .unwrap();
    bridge
        .add_method(shape, "area", common::sig("i@:"), |_, _, _| Ok(Value::Int(12)))
        .unwrap();
    let surface = bridge
        .define_class(&common::unique_name("NSSurface"), None)
        .unwrap();
    bridge
        .add_method(surface, "area", common::sig("i@:"), |_, _, _| Ok(Value::Int(-1)))
        .unwrap();

    let obj = bridge.alloc_instance(shape).unwrap();
    let cast = bridge.create_cast_proxy(obj, surface, transparent).unwrap();
    (obj, cast)
}

/// A managed block returning `handle` to native callers.
fn returning(bridge: &Bridge, handle: Handle) -> (Handle, u64) {
    let method = Arc::new(ManagedMethod::new("get", common::sig("@@:"), move |_| {
        Ok(ManagedValue::Native(handle))
    }));
    let (_instance, block) = common::managed_block(bridge, &method);
    (block, bridge.create_data_for_native_block(&method))
}

#[test]
fn test_opaque_cast_reaches_native_as_itself() {
    let bridge = common::bridge();
    let (obj, cast) = shape_cast(&bridge, false);
    let (block, data) = returning(&bridge, cast);

    let seen = bridge.forward_object_block_call(block, data, &[]).unwrap();
    assert_eq!(seen, cast);
    assert_eq!(bridge.send(seen, "area", &[]).unwrap(), Value::Int(12));

    bridge.release(block).unwrap();
    bridge.release(cast).unwrap();
    bridge.release(obj).unwrap();
    assert_eq!(bridge.live_object_count(), 0);
}

#[test]
fn test_transparent_cast_reaches_native_as_peer() {
    let bridge = common::bridge();
    let (obj, cast) = shape_cast(&bridge, true);
    let (block, data) = returning(&bridge, cast);

    assert_eq!(bridge.forward_object_block_call(block, data, &[]), Ok(obj));

    // A managed wrapper of the cast crosses over as the peer too.
    let ty = ManagedType::builder(common::unique_name("app.Surface")).build();
    let wrapper = bridge.wrap_native(cast, &ty).unwrap();
    let method = Arc::new(ManagedMethod::new("wrapped", common::sig("@@:"), move |_| {
        Ok(ManagedValue::Object(Some(Arc::clone(&wrapper))))
    }));
    let (_instance, wrapped) = common::managed_block(&bridge, &method);
    let wrapped_data = bridge.create_data_for_native_block(&method);

    let pool = bridge.push_pool();
    let seen = bridge
        .forward_object_block_call(wrapped, wrapped_data, &[])
        .unwrap();
    assert_eq!(seen, obj);
    assert_eq!(bridge.retain_count(obj).unwrap(), 3);
    bridge.pop_pool(pool).unwrap();
    assert_eq!(bridge.retain_count(obj).unwrap(), 2);

    bridge.release(wrapped).unwrap();
    bridge.release(block).unwrap();
    bridge.release(cast).unwrap();
    bridge.release(obj).unwrap();
}

#[test]
fn test_native_closure_receives_peer_of_transparent_cast() {
    let bridge = common::bridge();
    let (obj, cast) = shape_cast(&bridge, true);
    let received = Arc::new(Mutex::new(Handle::NULL));

    let sink = Arc::clone(&received);
    let block = bridge
        .create_native_block(common::sig("v@:@"), move |_, _, args| {
            if let [Value::Object(h)] = args {
                *sink.lock().unwrap() = *h;
            }
            Ok(Value::Void)
        })
        .unwrap();
    let method = Arc::new(ManagedMethod::new("accept", common::sig("v@:@"), |_| {
        Ok(ManagedValue::Void)
    }));
    let data = bridge.create_data_for_java_block(&method);

    bridge
        .invoke_block(block, data, &[ManagedValue::Native(cast)])
        .unwrap();
    assert_eq!(*received.lock().unwrap(), obj);

    bridge.release(block).unwrap();
    bridge.release(cast).unwrap();
    bridge.release(obj).unwrap();
}

#[test]
fn test_cast_keeps_peer_alive() {
    let bridge = common::bridge();
    let (obj, cast) = shape_cast(&bridge, false);

    bridge.release(obj).unwrap();
    assert!(bridge.is_live(obj));
    assert_eq!(bridge.send(cast, "area", &[]).unwrap(), Value::Int(12));

    bridge.release(cast).unwrap();
    assert!(!bridge.is_live(obj));
    assert_eq!(bridge.live_object_count(), 0);
}
