//! Runtime introspection.
//!
//! Lookups that find nothing return [`Handle::NULL`] rather than an error:
//! the parent of a root class, a class name nobody registered, the class of
//! the null object. Malformed handles are still errors.

use crate::error::{Error, Result};
use crate::runtime::bridge::Bridge;
use crate::runtime::class::{ClassKind, NativeClass};
use crate::runtime::class_type::ClassFlags;
use crate::runtime::heap::Payload;
use crate::runtime::selector::Selector;
use crate::runtime::value::Value;
use crate::runtime::Handle;
use std::sync::Arc;

impl Bridge {
    /// Returns the class of `object`, or null for the null object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for an unknown handle.
    pub fn object_class(&self, object: Handle) -> Result<Handle> {
        if object.is_null() {
            return Ok(Handle::NULL);
        }
        Ok(self.object(object)?.class.handle())
    }

    /// Returns the superclass of `class`, or null for a root class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAClass`] or [`Error::InvalidHandle`] if the handle
    /// is not a class.
    pub fn class_parent(&self, class: Handle) -> Result<Handle> {
        Ok(self
            .class(class)?
            .superclass()
            .map_or(Handle::NULL, |s| s.handle()))
    }

    /// Returns the class registered under `name`, or null.
    #[must_use]
    pub fn class_by_name(&self, name: &str) -> Handle {
        self.class_named(name).map_or(Handle::NULL, |c| c.handle())
    }

    /// Returns the name of `class`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAClass`] or [`Error::InvalidHandle`] if the handle
    /// is not a class.
    pub fn class_name(&self, class: Handle) -> Result<String> {
        Ok(self.class(class)?.name().to_string())
    }

    /// Returns whether `object` is a string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for an unknown handle.
    pub fn is_object_string(&self, object: Handle) -> Result<bool> {
        self.object_kind(object, |k| k == ClassKind::String)
    }

    /// Returns whether `object` is a closure, on the heap or the stack.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for an unknown handle.
    pub fn is_object_block(&self, object: Handle) -> Result<bool> {
        self.object_kind(object, ClassKind::is_block)
    }

    /// Returns whether `object` is a stack closure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for an unknown handle.
    pub fn is_stack_block(&self, object: Handle) -> Result<bool> {
        self.object_kind(object, |k| k == ClassKind::StackBlock)
    }

    fn object_kind(&self, object: Handle, test: impl FnOnce(ClassKind) -> bool) -> Result<bool> {
        if object.is_null() {
            return Ok(false);
        }
        Ok(test(self.object(object)?.class.kind()))
    }

    /// Returns whether `handle`, an object or a class, is or derives from a
    /// class generated for a managed subclass.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for an unknown handle.
    pub fn is_kind_of_inherited_class(&self, handle: Handle) -> Result<bool> {
        self.is_kind_of(handle, ClassFlags::is_inherited)
    }

    /// Returns whether `handle`, an object or a class, is or derives from a
    /// proxy class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for an unknown handle.
    pub fn is_kind_of_proxy_class(&self, handle: Handle) -> Result<bool> {
        self.is_kind_of(handle, ClassFlags::is_proxy)
    }

    /// Returns whether `handle`, an object or a class, is or derives from a
    /// hybrid class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for an unknown handle.
    pub fn is_kind_of_hybrid_class(&self, handle: Handle) -> Result<bool> {
        self.is_kind_of(handle, ClassFlags::is_hybrid)
    }

    fn is_kind_of(&self, handle: Handle, test: impl Fn(ClassFlags) -> bool) -> Result<bool> {
        if handle.is_null() {
            return Ok(false);
        }
        let class = self.class_or_object_class(handle)?;
        Ok(class.ancestors().any(|c| {
            self.class_descriptor(c.handle())
                .is_some_and(|d| test(d.flags()))
        }))
    }

    fn class_or_object_class(&self, handle: Handle) -> Result<Arc<NativeClass>> {
        match self.class(handle) {
            Err(Error::NotAClass { .. }) => Ok(Arc::clone(&self.object(handle)?.class)),
            other => other,
        }
    }

    /// Creates a native string. The caller owns the returned retain.
    ///
    /// # Errors
    ///
    /// Returns allocation errors.
    pub fn create_native_string(&self, value: &str) -> Result<Handle> {
        let class = Arc::clone(&self.builtins().string);
        self.alloc_object(&class, Payload::String(value.to_string()))
    }

    /// Returns the contents of a native string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAString`] if `object` is not a string.
    pub fn native_string_value(&self, object: Handle) -> Result<String> {
        let entry = self.object(object)?;
        entry
            .string()
            .map(str::to_string)
            .ok_or(Error::NotAString { handle: object })
    }

    /// Returns the description of `object`.
    ///
    /// Strings describe themselves. Other objects are sent `description`
    /// inside a temporary pool, so the returned string is freed before this
    /// returns. The null object is described as `"(null)"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] for an unknown handle, and whatever
    /// the `description` implementation returns.
    pub fn object_description(&self, object: Handle) -> Result<String> {
        if object.is_null() {
            return Ok("(null)".to_string());
        }
        if let Some(s) = self.object(object)?.string() {
            return Ok(s.to_string());
        }

        let pool = self.push_pool();
        let described = self
            .send_message(object, Selector::register("description"), &[])
            .and_then(|value| match value {
                Value::Object(s) if !s.is_null() => self.native_string_value(s),
                _ => Ok(String::new()),
            });
        self.pop_pool(pool)?;
        described
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::bridge::{ROOT_CLASS, STRING_CLASS};
    use crate::runtime::encoding::Signature;
    use crate::runtime::managed::ManagedType;
    use crate::BridgeConfig;

    #[test]
    fn test_class_queries() {
        let bridge = Bridge::new(BridgeConfig::default());
        let s = bridge.create_native_string("x").unwrap();

        let class = bridge.object_class(s).unwrap();
        assert_eq!(bridge.class_name(class).unwrap(), STRING_CLASS);
        assert_eq!(bridge.class_by_name(STRING_CLASS), class);
        assert_eq!(bridge.class_parent(class).unwrap(), bridge.root_class());
        assert_eq!(bridge.class_parent(bridge.root_class()).unwrap(), Handle::NULL);
        assert_eq!(bridge.class_by_name("Nope"), Handle::NULL);
        assert_eq!(bridge.object_class(Handle::NULL).unwrap(), Handle::NULL);
        assert_eq!(bridge.class_name(s), Err(Error::NotAClass { handle: s }));
        assert_eq!(bridge.class_name(bridge.root_class()).unwrap(), ROOT_CLASS);

        bridge.release(s).unwrap();
    }

    #[test]
    fn test_object_kinds() {
        let bridge = Bridge::new(BridgeConfig::default());
        let sig = Signature::parse("v@:").unwrap();
        let s = bridge.create_native_string("x").unwrap();
        let heap = bridge
            .create_native_block(sig.clone(), |_, _, _| Ok(Value::Void))
            .unwrap();
        let stack = bridge
            .create_stack_block(sig, |_, _, _| Ok(Value::Void))
            .unwrap();

        assert!(bridge.is_object_string(s).unwrap());
        assert!(!bridge.is_object_block(s).unwrap());
        assert!(bridge.is_object_block(heap).unwrap());
        assert!(!bridge.is_stack_block(heap).unwrap());
        assert!(bridge.is_object_block(stack).unwrap());
        assert!(bridge.is_stack_block(stack).unwrap());
        assert!(!bridge.is_object_string(Handle::NULL).unwrap());

        for h in [s, heap, stack] {
            bridge.release(h).unwrap();
        }
    }

    #[test]
    fn test_kind_of_walks_superclasses() {
        let bridge = Bridge::new(BridgeConfig::default());
        let ty = ManagedType::builder("KindOf").build();
        let proxy = bridge.create_proxy_class(&ty).unwrap();
        let sub = bridge.define_class("KindOfSub", Some(proxy)).unwrap();

        assert!(bridge.is_kind_of_proxy_class(proxy).unwrap());
        assert!(bridge.is_kind_of_proxy_class(sub).unwrap());
        assert!(!bridge.is_proxy_class(sub).unwrap());
        assert!(!bridge.is_kind_of_inherited_class(sub).unwrap());
        assert!(!bridge.is_kind_of_hybrid_class(bridge.root_class()).unwrap());
    }

    #[test]
    fn test_descriptions() {
        let bridge = Bridge::new(BridgeConfig::default());
        let s = bridge.create_native_string("plain text").unwrap();
        let class = bridge.define_class("Described", None).unwrap();
        let obj = bridge.alloc_instance(class).unwrap();

        assert_eq!(bridge.object_description(s).unwrap(), "plain text");
        assert_eq!(
            bridge.object_description(obj).unwrap(),
            format!("<Described: {obj}>")
        );
        assert_eq!(bridge.object_description(Handle::NULL).unwrap(), "(null)");
        // The temporary description string is gone.
        assert_eq!(bridge.live_object_count(), 2);

        bridge.release(s).unwrap();
        bridge.release(obj).unwrap();
    }

    #[test]
    fn test_string_value_of_non_string() {
        let bridge = Bridge::new(BridgeConfig::default());
        let class = bridge.define_class("NotString", None).unwrap();
        let obj = bridge.alloc_instance(class).unwrap();
        assert_eq!(
            bridge.native_string_value(obj),
            Err(Error::NotAString { handle: obj })
        );
        bridge.release(obj).unwrap();
    }
}
