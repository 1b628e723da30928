//! The process-wide entry points.
//!
//! Everything runs in one test because the installed bridge is global.

mod common;

use natbridge::runtime::managed::{ManagedObject, ManagedValue};
use natbridge::runtime::Value;
use natbridge::{api, BridgeConfig, Error, VariadicUnboxPolicy};

#[test]
fn test_global_lifecycle() {
    assert_eq!(api::bridge().unwrap_err(), Error::NotInitialized);
    assert_eq!(api::retain(1), Err(Error::NotInitialized));
    assert!(api::shutdown().is_none());

    let config = BridgeConfig::default().with_variadic_unbox_policy(VariadicUnboxPolicy::Boxed);
    let installed = api::initialize(config);
    let again = api::initialize(BridgeConfig::default());
    assert_eq!(installed.id(), again.id());
    assert_eq!(
        api::default_variadic_unbox_policy().unwrap(),
        VariadicUnboxPolicy::Boxed.as_i8()
    );

    // Strings and reference counting.
    let s = api::create_native_string("global").unwrap();
    assert!(api::is_object_string(s).unwrap());
    assert_eq!(api::native_string_value(s).unwrap(), "global");
    assert_eq!(api::get_object_description(s).unwrap(), "global");
    assert_eq!(api::retain(s).unwrap(), s);
    api::release(s).unwrap();

    // Weak references and pools.
    api::store_weak(0x8000, s).unwrap();
    let pool = api::create_autorelease_pool().unwrap();
    assert_eq!(api::load_weak(0x8000).unwrap(), s);
    api::release_autorelease_pool(pool).unwrap();
    api::destroy_weak(0x8000).unwrap();
    assert_eq!(api::load_weak(0x8000).unwrap(), 0);

    // Classes.
    let string_class = api::get_object_class(s).unwrap();
    assert_eq!(api::get_class_by_name("BridgeString").unwrap(), string_class);
    assert_eq!(api::get_class_name(string_class).unwrap(), "BridgeString");
    assert_eq!(api::get_class_by_name("NoSuchClass").unwrap(), 0);
    assert_eq!(api::get_class_parent(api::get_class_parent(string_class).unwrap()).unwrap(), 0);

    // Proxies and associations.
    let widget = common::widget_type();
    let class = api::create_proxy_class(&widget).unwrap();
    assert!(api::is_proxy_class(class).unwrap());
    let m = ManagedObject::stateless(&widget);
    let peer = api::create_proxy_instance(class, &m).unwrap();
    assert!(api::is_kind_of_proxy_class(peer).unwrap());
    assert!(api::get_binding_association(peer).unwrap().is_some());
    api::set_custom_association(peer, Some(&m)).unwrap();
    assert!(api::get_custom_association(peer).unwrap().is_some());
    api::associate(peer, &m).unwrap();
    assert!(api::dissociate(peer, &m).unwrap());
    api::lock_object(peer).unwrap();
    api::unlock_object(peer).unwrap();

    // Cast proxies.
    assert!(matches!(
        api::create_cast_proxy(peer, string_class, false),
        Err(Error::IncompatibleBaseClass { .. })
    ));
    let root = api::get_class_parent(class).unwrap();
    let cast = api::create_cast_proxy(peer, root, true).unwrap();
    assert_eq!(api::get_object_class(cast).unwrap(), root);
    assert_eq!(api::get_cast_proxy_peer(cast).unwrap(), peer);
    assert!(matches!(
        api::get_cast_proxy_peer(peer),
        Err(Error::NotACastProxy { .. })
    ));
    api::release(cast).unwrap();

    // Callbacks.
    let adder = common::int_adder();
    let owner = ManagedObject::stateless(&widget);
    let block = api::create_native_callback_from_java_instance(&owner, &adder).unwrap();
    assert!(api::is_object_block(block).unwrap());
    assert!(!api::is_stack_block(block).unwrap());
    let data = api::create_data_for_native_block(&adder).unwrap();
    assert_eq!(
        api::forward_int_block_call(block, data, &[Value::Int(2), Value::Int(3)]),
        Ok(5)
    );
    let java_data = api::create_data_for_java_block(&adder).unwrap();
    let result = api::invoke_block(block, java_data, &[ManagedValue::Int(1), ManagedValue::Int(1)])
        .unwrap();
    assert_eq!(result.as_int(), Some(2));
    let copied = api::copy_block(block).unwrap();
    assert_eq!(copied, block);
    api::release(copied).unwrap();
    api::release(block).unwrap();

    api::release(peer).unwrap();
    api::release(s).unwrap();

    assert_eq!(api::shutdown(), Some(0));
    assert_eq!(api::bridge().unwrap_err(), Error::NotInitialized);
}
