//! The foreign-function boundary.
//!
//! One process-wide [`Bridge`] serves callers that only hold raw 64-bit
//! handles, `0` being null. Every function here resolves the installed
//! bridge and makes one call into it; none of them has semantics of its own.
//!
//! # Lifecycle
//!
//! [`initialize`] installs the bridge and applies the configured log level.
//! [`shutdown`] tears it down; calls made afterwards fail with
//! [`Error::NotInitialized`] until the next [`initialize`].
//!
//! # Example
//!
//! ```
//! use natbridge::{api, BridgeConfig};
//!
//! api::initialize(BridgeConfig::default());
//! let s = api::create_native_string("hi").unwrap();
//! assert!(api::is_object_string(s).unwrap());
//! api::release(s).unwrap();
//! api::shutdown();
//! ```

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::runtime::init_target;
use crate::runtime::managed::{ManagedMethod, ManagedRef, ManagedType, ManagedValue};
use crate::runtime::{Bridge, Handle, Selector, Value};
use std::sync::{Arc, PoisonError, RwLock};

static GLOBAL: RwLock<Option<Bridge>> = RwLock::new(None);

/// Installs the process-wide bridge and returns it.
///
/// If a bridge is already installed it is returned unchanged and `config`
/// is ignored.
pub fn initialize(config: BridgeConfig) -> Bridge {
    let mut global = GLOBAL.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = global.as_ref() {
        natbridge_log::warn!("bridge already initialized; keeping bridge {}", existing.id());
        return existing.clone();
    }

    if let Some(level) = config.log_level {
        natbridge_log::set_level(level);
    }
    let bridge = Bridge::new(config);
    *global = Some(bridge.clone());
    bridge
}

/// Shuts the process-wide bridge down and uninstalls it.
///
/// Returns the number of objects still alive, or `None` if no bridge was
/// installed.
pub fn shutdown() -> Option<usize> {
    let bridge = GLOBAL
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .take()?;
    Some(bridge.shutdown())
}

/// Returns the process-wide bridge.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] if [`initialize`] has not run.
pub fn bridge() -> Result<Bridge> {
    GLOBAL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .ok_or(Error::NotInitialized)
}

fn h(raw: u64) -> Handle {
    Handle::from_raw(raw)
}

// ============================================================================
// Allocation
// ============================================================================

/// Registers the native class of a managed type. Returns the class.
///
/// # Errors
///
/// See [`Bridge::register_class`].
pub fn register_class(ty: &Arc<ManagedType>) -> Result<u64> {
    Ok(bridge()?.register_class(ty)?.class().as_raw())
}

/// See [`Bridge::create_proxy_class`].
///
/// # Errors
///
/// See [`Bridge::create_proxy_class`].
pub fn create_proxy_class(ty: &Arc<ManagedType>) -> Result<u64> {
    Ok(bridge()?.create_proxy_class(ty)?.as_raw())
}

/// See [`Bridge::create_proxy_class_with_extension`].
///
/// # Errors
///
/// See [`Bridge::create_proxy_class_with_extension`].
pub fn create_proxy_class_with_extension(
    ty: &Arc<ManagedType>,
    base_name: &str,
    extension: &Arc<ManagedType>,
) -> Result<u64> {
    Ok(bridge()?
        .create_proxy_class_with_extension(ty, base_name, extension)?
        .as_raw())
}

/// See [`Bridge::create_proxy_instance`].
///
/// # Errors
///
/// See [`Bridge::create_proxy_instance`].
pub fn create_proxy_instance(class: u64, managed: &ManagedRef) -> Result<u64> {
    Ok(bridge()?.create_proxy_instance(h(class), managed)?.as_raw())
}

/// See [`Bridge::alloc_instance`].
///
/// # Errors
///
/// See [`Bridge::alloc_instance`].
pub fn alloc_instance(class: u64) -> Result<u64> {
    Ok(bridge()?.alloc_instance(h(class))?.as_raw())
}

/// See [`Bridge::construct_inherited`].
///
/// # Errors
///
/// See [`Bridge::construct_inherited`].
pub fn construct_inherited(class: u64, managed: &ManagedRef) -> Result<u64> {
    Ok(bridge()?.construct_inherited(h(class), managed)?.as_raw())
}

/// See [`Bridge::create_cast_proxy`].
///
/// # Errors
///
/// See [`Bridge::create_cast_proxy`].
pub fn create_cast_proxy(instance: u64, target: u64, transparent: bool) -> Result<u64> {
    Ok(bridge()?
        .create_cast_proxy(h(instance), h(target), transparent)?
        .as_raw())
}

/// See [`Bridge::cast_proxy_peer`].
///
/// # Errors
///
/// See [`Bridge::cast_proxy_peer`].
pub fn get_cast_proxy_peer(proxy: u64) -> Result<u64> {
    Ok(bridge()?.cast_proxy_peer(h(proxy))?.as_raw())
}

/// See [`Bridge::create_native_string`].
///
/// # Errors
///
/// See [`Bridge::create_native_string`].
pub fn create_native_string(value: &str) -> Result<u64> {
    Ok(bridge()?.create_native_string(value)?.as_raw())
}

/// See [`Bridge::native_string_value`].
///
/// # Errors
///
/// See [`Bridge::native_string_value`].
pub fn native_string_value(object: u64) -> Result<String> {
    bridge()?.native_string_value(h(object))
}

// ============================================================================
// Lifetime
// ============================================================================

/// Retains `object` and returns it.
///
/// # Errors
///
/// See [`Bridge::retain`].
pub fn retain(object: u64) -> Result<u64> {
    Ok(bridge()?.retain(h(object))?.as_raw())
}

/// Releases `object`.
///
/// # Errors
///
/// See [`Bridge::release`].
pub fn release(object: u64) -> Result<()> {
    bridge()?.release(h(object))
}

/// Autoreleases `object` and returns it.
///
/// # Errors
///
/// See [`Bridge::autorelease`].
pub fn autorelease(object: u64) -> Result<u64> {
    Ok(bridge()?.autorelease(h(object))?.as_raw())
}

/// Opens an autorelease pool on the calling thread. Returns its marker.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] if no bridge is installed.
pub fn create_autorelease_pool() -> Result<u64> {
    Ok(bridge()?.push_pool().as_raw())
}

/// Drains and closes the pool `marker` and every pool opened after it.
///
/// # Errors
///
/// See [`Bridge::pop_pool`].
pub fn release_autorelease_pool(marker: u64) -> Result<()> {
    bridge()?.pop_pool(h(marker))
}

/// See [`Bridge::lock_object`].
///
/// # Errors
///
/// See [`Bridge::lock_object`].
pub fn lock_object(object: u64) -> Result<()> {
    bridge()?.lock_object(h(object))
}

/// See [`Bridge::unlock_object`].
///
/// # Errors
///
/// See [`Bridge::unlock_object`].
pub fn unlock_object(object: u64) -> Result<()> {
    bridge()?.unlock_object(h(object))
}

// ============================================================================
// Weak references
// ============================================================================

/// See [`Bridge::store_weak`].
///
/// # Errors
///
/// See [`Bridge::store_weak`].
pub fn store_weak(location: u64, object: u64) -> Result<()> {
    bridge()?.store_weak(location, h(object))
}

/// See [`Bridge::load_weak`].
///
/// # Errors
///
/// See [`Bridge::load_weak`].
pub fn load_weak(location: u64) -> Result<u64> {
    Ok(bridge()?.load_weak(location)?.as_raw())
}

/// See [`Bridge::destroy_weak`].
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] if no bridge is installed.
pub fn destroy_weak(location: u64) -> Result<()> {
    bridge()?.destroy_weak(location);
    Ok(())
}

// ============================================================================
// Associations
// ============================================================================

/// See [`Bridge::binding`].
///
/// # Errors
///
/// See [`Bridge::binding`].
pub fn get_binding_association(object: u64) -> Result<Option<ManagedRef>> {
    bridge()?.binding(h(object))
}

/// See [`Bridge::set_binding`].
///
/// # Errors
///
/// See [`Bridge::set_binding`].
pub fn set_binding_association(object: u64, managed: Option<&ManagedRef>) -> Result<()> {
    bridge()?.set_binding(h(object), managed)
}

/// See [`Bridge::custom`].
///
/// # Errors
///
/// See [`Bridge::custom`].
pub fn get_custom_association(object: u64) -> Result<Option<ManagedRef>> {
    bridge()?.custom(h(object))
}

/// See [`Bridge::set_custom`].
///
/// # Errors
///
/// See [`Bridge::set_custom`].
pub fn set_custom_association(object: u64, managed: Option<&ManagedRef>) -> Result<()> {
    bridge()?.set_custom(h(object), managed)
}

/// See [`Bridge::associate`].
///
/// # Errors
///
/// See [`Bridge::associate`].
pub fn associate(object: u64, managed: &ManagedRef) -> Result<()> {
    bridge()?.associate(h(object), managed)
}

/// See [`Bridge::dissociate`].
///
/// # Errors
///
/// See [`Bridge::dissociate`].
pub fn dissociate(object: u64, managed: &ManagedRef) -> Result<bool> {
    bridge()?.dissociate(h(object), managed)
}

// ============================================================================
// Introspection
// ============================================================================

/// See [`Bridge::object_class`].
///
/// # Errors
///
/// See [`Bridge::object_class`].
pub fn get_object_class(object: u64) -> Result<u64> {
    Ok(bridge()?.object_class(h(object))?.as_raw())
}

/// See [`Bridge::class_parent`].
///
/// # Errors
///
/// See [`Bridge::class_parent`].
pub fn get_class_parent(class: u64) -> Result<u64> {
    Ok(bridge()?.class_parent(h(class))?.as_raw())
}

/// See [`Bridge::class_by_name`].
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] if no bridge is installed.
pub fn get_class_by_name(name: &str) -> Result<u64> {
    Ok(bridge()?.class_by_name(name).as_raw())
}

/// See [`Bridge::class_name`].
///
/// # Errors
///
/// See [`Bridge::class_name`].
pub fn get_class_name(class: u64) -> Result<String> {
    bridge()?.class_name(h(class))
}

/// See [`Bridge::is_object_string`].
///
/// # Errors
///
/// See [`Bridge::is_object_string`].
pub fn is_object_string(object: u64) -> Result<bool> {
    bridge()?.is_object_string(h(object))
}

/// See [`Bridge::is_object_block`].
///
/// # Errors
///
/// See [`Bridge::is_object_block`].
pub fn is_object_block(object: u64) -> Result<bool> {
    bridge()?.is_object_block(h(object))
}

/// See [`Bridge::is_stack_block`].
///
/// # Errors
///
/// See [`Bridge::is_stack_block`].
pub fn is_stack_block(object: u64) -> Result<bool> {
    bridge()?.is_stack_block(h(object))
}

/// See [`Bridge::is_inherited_class`].
///
/// # Errors
///
/// See [`Bridge::is_inherited_class`].
pub fn is_inherited_class(class: u64) -> Result<bool> {
    bridge()?.is_inherited_class(h(class))
}

/// See [`Bridge::is_proxy_class`].
///
/// # Errors
///
/// See [`Bridge::is_proxy_class`].
pub fn is_proxy_class(class: u64) -> Result<bool> {
    bridge()?.is_proxy_class(h(class))
}

/// See [`Bridge::is_hybrid_class`].
///
/// # Errors
///
/// See [`Bridge::is_hybrid_class`].
pub fn is_hybrid_class(class: u64) -> Result<bool> {
    bridge()?.is_hybrid_class(h(class))
}

/// See [`Bridge::is_kind_of_inherited_class`].
///
/// # Errors
///
/// See [`Bridge::is_kind_of_inherited_class`].
pub fn is_kind_of_inherited_class(handle: u64) -> Result<bool> {
    bridge()?.is_kind_of_inherited_class(h(handle))
}

/// See [`Bridge::is_kind_of_proxy_class`].
///
/// # Errors
///
/// See [`Bridge::is_kind_of_proxy_class`].
pub fn is_kind_of_proxy_class(handle: u64) -> Result<bool> {
    bridge()?.is_kind_of_proxy_class(h(handle))
}

/// See [`Bridge::is_kind_of_hybrid_class`].
///
/// # Errors
///
/// See [`Bridge::is_kind_of_hybrid_class`].
pub fn is_kind_of_hybrid_class(handle: u64) -> Result<bool> {
    bridge()?.is_kind_of_hybrid_class(h(handle))
}

/// See [`Bridge::object_description`].
///
/// # Errors
///
/// See [`Bridge::object_description`].
pub fn get_object_description(object: u64) -> Result<String> {
    bridge()?.object_description(h(object))
}

/// See [`Bridge::managed_type_for_hybrid_class`].
///
/// # Errors
///
/// See [`Bridge::managed_type_for_hybrid_class`].
pub fn get_managed_type_for_hybrid_class(class: u64) -> Result<Option<Arc<ManagedType>>> {
    bridge()?.managed_type_for_hybrid_class(h(class))
}

/// Returns the configured [`VariadicUnboxPolicy`](crate::VariadicUnboxPolicy)
/// as its wire value.
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] if no bridge is installed.
pub fn default_variadic_unbox_policy() -> Result<i8> {
    Ok(bridge()?.config().variadic_unbox_policy.as_i8())
}

/// Interns a selector name. Returns its handle.
#[must_use]
pub fn register_selector(name: &str) -> u64 {
    Selector::register(name).as_handle()
}

// ============================================================================
// Init target
// ============================================================================

/// See [`init_target::set_init_target`].
///
/// # Errors
///
/// See [`init_target::set_init_target`].
pub fn set_init_target(target: &ManagedRef) -> Result<()> {
    init_target::set_init_target(target)
}

/// See [`init_target::unset_init_target`].
pub fn unset_init_target() -> Option<ManagedRef> {
    init_target::unset_init_target()
}

/// See [`init_target::init_target`].
#[must_use]
pub fn get_init_target() -> Option<ManagedRef> {
    init_target::init_target()
}

// ============================================================================
// Callbacks
// ============================================================================

/// See [`Bridge::create_data_for_native_block`].
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] if no bridge is installed.
pub fn create_data_for_native_block(method: &Arc<ManagedMethod>) -> Result<u64> {
    Ok(bridge()?.create_data_for_native_block(method))
}

/// See [`Bridge::create_data_for_native_protocol_proxy`].
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] if no bridge is installed.
pub fn create_data_for_native_protocol_proxy(interface: &ManagedType) -> Result<Vec<u64>> {
    Ok(bridge()?.create_data_for_native_protocol_proxy(interface))
}

/// See [`Bridge::create_data_for_java_block`].
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] if no bridge is installed.
pub fn create_data_for_java_block(method: &Arc<ManagedMethod>) -> Result<u64> {
    Ok(bridge()?.create_data_for_java_block(method))
}

/// See [`Bridge::create_native_callback_from_java_instance`].
///
/// # Errors
///
/// See [`Bridge::create_native_callback_from_java_instance`].
pub fn create_native_callback_from_java_instance(
    instance: &ManagedRef,
    method: &Arc<ManagedMethod>,
) -> Result<u64> {
    Ok(bridge()?
        .create_native_callback_from_java_instance(instance, method)?
        .as_raw())
}

/// See [`Bridge::get_instance_for_java_block`].
///
/// # Errors
///
/// See [`Bridge::get_instance_for_java_block`].
pub fn get_instance_for_java_block(block: u64) -> Result<ManagedRef> {
    bridge()?.get_instance_for_java_block(h(block))
}

/// See [`Bridge::invoke_block`].
///
/// # Errors
///
/// See [`Bridge::invoke_block`].
pub fn invoke_block(block: u64, data: u64, args: &[ManagedValue]) -> Result<ManagedValue> {
    bridge()?.invoke_block(h(block), data, args)
}

/// See [`Bridge::copy_block`].
///
/// # Errors
///
/// See [`Bridge::copy_block`].
pub fn copy_block(block: u64) -> Result<u64> {
    Ok(bridge()?.copy_block(h(block))?.as_raw())
}

macro_rules! forwarders {
    ($($ty:ty => $block:ident, $protocol:ident;)*) => {
        $(
            #[doc = concat!("See [`Bridge::", stringify!($block), "`].")]
            ///
            /// # Errors
            ///
            #[doc = concat!("See [`Bridge::", stringify!($block), "`].")]
            pub fn $block(peer: u64, data: u64, args: &[Value]) -> Result<$ty> {
                bridge()?.$block(h(peer), data, args)
            }

            #[doc = concat!("See [`Bridge::", stringify!($protocol), "`].")]
            ///
            /// # Errors
            ///
            #[doc = concat!("See [`Bridge::", stringify!($protocol), "`].")]
            pub fn $protocol(peer: u64, data: u64, args: &[Value]) -> Result<$ty> {
                bridge()?.$protocol(h(peer), data, args)
            }
        )*
    };
}

forwarders! {
    bool => forward_bool_block_call, forward_bool_protocol_call;
    i8 => forward_byte_block_call, forward_byte_protocol_call;
    u16 => forward_char_block_call, forward_char_protocol_call;
    i16 => forward_short_block_call, forward_short_protocol_call;
    i32 => forward_int_block_call, forward_int_protocol_call;
    i64 => forward_long_block_call, forward_long_protocol_call;
    f32 => forward_float_block_call, forward_float_protocol_call;
    f64 => forward_double_block_call, forward_double_protocol_call;
    () => forward_void_block_call, forward_void_protocol_call;
}

/// See [`Bridge::forward_object_block_call`].
///
/// # Errors
///
/// See [`Bridge::forward_object_block_call`].
pub fn forward_object_block_call(peer: u64, data: u64, args: &[Value]) -> Result<u64> {
    Ok(bridge()?.forward_object_block_call(h(peer), data, args)?.as_raw())
}

/// See [`Bridge::forward_object_protocol_call`].
///
/// # Errors
///
/// See [`Bridge::forward_object_protocol_call`].
pub fn forward_object_protocol_call(peer: u64, data: u64, args: &[Value]) -> Result<u64> {
    Ok(bridge()?
        .forward_object_protocol_call(h(peer), data, args)?
        .as_raw())
}
