//! Reference counting and deallocation across the bridge.

mod common;

use natbridge::runtime::managed::{ManagedObject, ManagedType};
use natbridge::{AssociationCategory, Error, ErrorKind, Handle};
use std::sync::Arc;

#[test]
fn test_balanced_retains_leave_count_unchanged() {
    let bridge = common::bridge();
    let s = bridge.create_native_string("counted").unwrap();

    for n in [1_u32, 5, 64] {
        for _ in 0..n {
            bridge.retain(s).unwrap();
        }
        assert_eq!(bridge.retain_count(s).unwrap(), 1 + n);
        for _ in 0..n {
            bridge.release(s).unwrap();
        }
        assert_eq!(bridge.retain_count(s).unwrap(), 1);
    }

    bridge.release(s).unwrap();
    assert!(!bridge.is_live(s));
}

#[test]
fn test_null_handle_is_nil() {
    let bridge = common::bridge();
    assert_eq!(bridge.retain(Handle::NULL).unwrap(), Handle::NULL);
    bridge.release(Handle::NULL).unwrap();
    assert_eq!(bridge.autorelease(Handle::NULL).unwrap(), Handle::NULL);
}

#[test]
fn test_dead_handles_are_programmer_errors() {
    let bridge = common::bridge();
    let s = bridge.create_native_string("gone").unwrap();
    bridge.release(s).unwrap();

    let err = bridge.release(s).unwrap_err();
    assert_eq!(err, Error::InvalidHandle { handle: s });
    assert_eq!(err.kind(), ErrorKind::Programmer);
    assert!(bridge.retain(s).is_err());
    assert!(bridge.retain(Handle::from_raw(0xdead_beef)).is_err());
}

#[test]
fn test_dealloc_drops_every_association() {
    let bridge = common::bridge();
    let ty = ManagedType::builder("Attached").build();
    let binding = ManagedObject::stateless(&ty);
    let custom = ManagedObject::stateless(&ty);
    let aux = ManagedObject::stateless(&ty);

    let class = bridge.define_class(&common::unique_name("Holder"), None).unwrap();
    let obj = bridge.alloc_instance(class).unwrap();
    bridge.set_binding(obj, Some(&binding)).unwrap();
    bridge.set_custom(obj, Some(&custom)).unwrap();
    bridge.associate(obj, &aux).unwrap();
    bridge.associate(obj, &aux).unwrap();

    assert_eq!(Arc::strong_count(&binding), 2);
    assert_eq!(Arc::strong_count(&aux), 3);

    bridge.release(obj).unwrap();

    assert_eq!(Arc::strong_count(&binding), 1);
    assert_eq!(Arc::strong_count(&custom), 1);
    assert_eq!(Arc::strong_count(&aux), 1);
    assert!(binding.peer().is_null());
    assert!(bridge.association(obj, AssociationCategory::Binding).is_err());
}

#[test]
fn test_managed_owner_releases_peer_when_dropped() {
    let bridge = common::bridge();
    let ty = ManagedType::builder("Owner").build();
    let s = bridge.create_native_string("owned").unwrap();

    let wrapper = bridge.wrap_native(s, &ty).unwrap();
    bridge.release(s).unwrap();
    assert_eq!(bridge.retain_count(s).unwrap(), 1);
    assert!(wrapper.owns_peer());

    drop(wrapper);
    assert_eq!(bridge.live_object_count(), 0);
}

#[test]
fn test_native_retain_pins_managed_owner() {
    let bridge = common::bridge();
    let ty = ManagedType::builder("Pinned").build();
    let s = bridge.create_native_string("pinned").unwrap();

    let wrapper = bridge.wrap_native(s, &ty).unwrap();
    let weak = Arc::downgrade(&wrapper);
    drop(wrapper);

    // The caller's retain is still outstanding, so the wrapper survives.
    let revived = weak.upgrade().expect("binding must pin the wrapper");
    assert!(Arc::ptr_eq(&bridge.binding(s).unwrap().unwrap(), &revived));
    drop(revived);

    bridge.release(s).unwrap();
    assert!(weak.upgrade().is_none());
    assert_eq!(bridge.live_object_count(), 0);
}

#[test]
fn test_monitor_is_recursive() {
    let bridge = common::bridge();
    let s = bridge.create_native_string("locked").unwrap();

    bridge.lock_object(s).unwrap();
    bridge.lock_object(s).unwrap();
    bridge.unlock_object(s).unwrap();
    bridge.unlock_object(s).unwrap();
    assert_eq!(
        bridge.unlock_object(s),
        Err(Error::NotLockOwner { handle: s })
    );

    bridge.lock_object(s).unwrap();
    let other = bridge.clone();
    let stolen = std::thread::spawn(move || other.unlock_object(s))
        .join()
        .unwrap();
    assert_eq!(stolen, Err(Error::NotLockOwner { handle: s }));
    bridge.unlock_object(s).unwrap();

    bridge.release(s).unwrap();
}

#[test]
fn test_shutdown_reports_leaks() {
    let bridge = common::bridge();
    let ty = ManagedType::builder("Leaky").build();
    let m = ManagedObject::stateless(&ty);
    let kept = bridge.create_native_string("kept").unwrap();
    bridge.set_binding(kept, Some(&m)).unwrap();

    assert_eq!(bridge.shutdown(), 1);
    // Associations were dropped by shutdown.
    assert_eq!(Arc::strong_count(&m), 1);
    bridge.release(kept).unwrap();
}
