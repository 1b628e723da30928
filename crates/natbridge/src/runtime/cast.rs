//! Cast proxies.
//!
//! A cast proxy presents an existing object as an instance of another class.
//! It is a heap object whose class is the target class and whose payload
//! names the original object, the proxy's peer, which it holds one retain
//! on. Every message the target class understands is resent to the peer.
//!
//! An opaque proxy is what native code sees when the managed side hands the
//! proxy over. A transparent proxy is swapped for its peer whenever a value
//! crosses from managed to native code, so native code only ever sees the
//! original object.
//!
//! Casting a cast proxy casts its peer; proxies never nest.

use crate::error::{Error, Result};
use crate::runtime::bridge::Bridge;
use crate::runtime::class::ClassKind;
use crate::runtime::heap::{CastBody, Payload};
use crate::runtime::Handle;

impl Bridge {
    /// Creates a proxy presenting `instance` as an instance of `target`.
    ///
    /// The proxy retains `instance` until it is deallocated. The caller owns
    /// the returned retain.
    ///
    /// # Errors
    ///
    /// - [`Error::NullHandle`] or [`Error::InvalidHandle`] if `instance` is
    ///   not a live object
    /// - [`Error::NotAClass`] or [`Error::InvalidHandle`] if `target` is not
    ///   a class
    /// - [`Error::IncompatibleBaseClass`] if `target` is a string or block
    ///   class
    /// - allocation errors
    pub fn create_cast_proxy(
        &self,
        instance: Handle,
        target: Handle,
        transparent: bool,
    ) -> Result<Handle> {
        let entry = self.object(instance)?;
        let peer = entry.cast().map_or(instance, |cast| cast.peer);
        let source = entry.class.name().to_string();
        drop(entry);

        let class = self.class(target)?;
        if class.kind() != ClassKind::Plain {
            return Err(Error::IncompatibleBaseClass {
                class: source,
                base: class.name().to_string(),
                reason: "string and block classes cannot be cast targets",
            });
        }

        self.retain(peer)?;
        match self.alloc_object(&class, Payload::Cast(CastBody { peer, transparent })) {
            Ok(proxy) => {
                natbridge_log::debug!(
                    "cast {peer} <{source}> to {} as {proxy}{}",
                    class.name(),
                    if transparent { " (transparent)" } else { "" }
                );
                Ok(proxy)
            }
            Err(err) => {
                self.release(peer)?;
                Err(err)
            }
        }
    }

    /// Returns the object a cast proxy stands for.
    ///
    /// # Errors
    ///
    /// - [`Error::NullHandle`] or [`Error::InvalidHandle`] if `proxy` is not
    ///   a live object
    /// - [`Error::NotACastProxy`] for any other object
    pub fn cast_proxy_peer(&self, proxy: Handle) -> Result<Handle> {
        self.object(proxy)?
            .cast()
            .map(|cast| cast.peer)
            .ok_or(Error::NotACastProxy { handle: proxy })
    }

    /// Returns whether `object` is a cast proxy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullHandle`] or [`Error::InvalidHandle`] if `object`
    /// is not a live object.
    pub fn is_cast_proxy(&self, object: Handle) -> Result<bool> {
        Ok(self.object(object)?.cast().is_some())
    }

    /// Returns what native code sees for `object`: the peer of a transparent
    /// cast proxy, and `object` itself otherwise.
    pub(crate) fn native_view(&self, object: Handle) -> Handle {
        self.shared
            .heap
            .get(object)
            .and_then(|entry| entry.cast())
            .filter(|cast| cast.transparent)
            .map_or(object, |cast| cast.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::encoding::Signature;
    use crate::runtime::value::Value;
    use crate::BridgeConfig;

    fn int_sig() -> Signature {
        Signature::parse("i@:").unwrap()
    }

    #[test]
    fn test_cast_forwards_to_peer() {
        let bridge = Bridge::new(BridgeConfig::default());
        let source = bridge.define_class("CastSource", None).unwrap();
        bridge
            .add_method(source, "count", int_sig(), |_, _, _| Ok(Value::Int(7)))
            .unwrap();
        let target = bridge.define_class("CastTarget", None).unwrap();
        bridge
            .add_method(target, "count", int_sig(), |_, _, _| Ok(Value::Int(-1)))
            .unwrap();

        let obj = bridge.alloc_instance(source).unwrap();
        let cast = bridge.create_cast_proxy(obj, target, false).unwrap();

        assert_ne!(cast, obj);
        assert_eq!(bridge.object_class(cast).unwrap(), target);
        assert_eq!(bridge.send(cast, "count", &[]).unwrap(), Value::Int(7));
        assert_eq!(bridge.cast_proxy_peer(cast).unwrap(), obj);
        assert_eq!(bridge.retain_count(obj).unwrap(), 2);

        bridge.release(cast).unwrap();
        assert_eq!(bridge.retain_count(obj).unwrap(), 1);
        bridge.release(obj).unwrap();
        assert_eq!(bridge.live_object_count(), 0);
    }

    #[test]
    fn test_only_target_selectors_are_visible() {
        let bridge = Bridge::new(BridgeConfig::default());
        let source = bridge.define_class("WideSource", None).unwrap();
        bridge
            .add_method(source, "hidden", int_sig(), |_, _, _| Ok(Value::Int(1)))
            .unwrap();
        let target = bridge.define_class("NarrowTarget", None).unwrap();

        let obj = bridge.alloc_instance(source).unwrap();
        let cast = bridge.create_cast_proxy(obj, target, false).unwrap();
        assert!(!bridge.responds_to(cast, "hidden").unwrap());
        assert!(matches!(
            bridge.send(cast, "hidden", &[]),
            Err(Error::SelectorNotFound { .. })
        ));

        bridge.release(cast).unwrap();
        bridge.release(obj).unwrap();
    }

    #[test]
    fn test_casting_a_cast_uses_original_peer() {
        let bridge = Bridge::new(BridgeConfig::default());
        let a = bridge.define_class("CastA", None).unwrap();
        let b = bridge.define_class("CastB", None).unwrap();
        let obj = bridge.create_native_string("peer").unwrap();

        let first = bridge.create_cast_proxy(obj, a, true).unwrap();
        let second = bridge.create_cast_proxy(first, b, false).unwrap();
        assert_eq!(bridge.cast_proxy_peer(second).unwrap(), obj);
        assert_eq!(bridge.retain_count(first).unwrap(), 1);

        bridge.release(first).unwrap();
        bridge.release(second).unwrap();
        bridge.release(obj).unwrap();
        assert_eq!(bridge.live_object_count(), 0);
    }

    #[test]
    fn test_native_view() {
        let bridge = Bridge::new(BridgeConfig::default());
        let target = bridge.define_class("ViewTarget", None).unwrap();
        let obj = bridge.create_native_string("peer").unwrap();

        let opaque = bridge.create_cast_proxy(obj, target, false).unwrap();
        let transparent = bridge.create_cast_proxy(obj, target, true).unwrap();
        assert_eq!(bridge.native_view(opaque), opaque);
        assert_eq!(bridge.native_view(transparent), obj);
        assert_eq!(bridge.native_view(obj), obj);

        bridge.release(opaque).unwrap();
        bridge.release(transparent).unwrap();
        bridge.release(obj).unwrap();
    }

    #[test]
    fn test_invalid_casts() {
        let bridge = Bridge::new(BridgeConfig::default());
        let obj = bridge.create_native_string("peer").unwrap();
        let string_class = bridge.object_class(obj).unwrap();

        assert_eq!(
            bridge.create_cast_proxy(Handle::NULL, string_class, false),
            Err(Error::NullHandle)
        );
        assert!(matches!(
            bridge.create_cast_proxy(obj, string_class, false),
            Err(Error::IncompatibleBaseClass { .. })
        ));
        assert_eq!(
            bridge.cast_proxy_peer(obj),
            Err(Error::NotACastProxy { handle: obj })
        );
        assert!(!bridge.is_cast_proxy(obj).unwrap());
        assert_eq!(bridge.retain_count(obj).unwrap(), 1);
        bridge.release(obj).unwrap();
    }
}
