//! Message dispatch.
//!
//! `send_message` resolves a selector on the receiver's class (cached lookup
//! along the superclass chain), checks the arguments against the method's
//! signature and runs the implementation. Forwarder implementations enter
//! the callback marshaler with the receiver as the peer. A cast proxy
//! resends every selector its class understands to the object it stands for.

use crate::error::{Error, Result};
use crate::runtime::bridge::Bridge;
use crate::runtime::callback::ExceptionPolicy;
use crate::runtime::class::Imp;
use crate::runtime::selector::Selector;
use crate::runtime::value::Value;
use crate::runtime::Handle;

impl Bridge {
    /// Sends `selector` to `receiver`.
    ///
    /// Messaging the null handle does nothing and returns `Value::Void`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidHandle`] if `receiver` is not a live object
    /// - [`Error::SelectorNotFound`] if the class does not respond
    /// - argument and return kind mismatches
    /// - whatever the implementation returns, including
    ///   [`Error::ManagedException`] from forwarded methods
    pub fn send_message(&self, receiver: Handle, selector: Selector, args: &[Value]) -> Result<Value> {
        if receiver.is_null() {
            return Ok(Value::Void);
        }
        let entry = self.object(receiver)?;
        let Some(method) = entry.class.lookup(selector) else {
            return Err(Error::SelectorNotFound {
                selector: selector.name().to_string(),
                class: entry.class.name().to_string(),
            });
        };
        if let Some(cast) = entry.cast() {
            drop(entry);
            return self.send_message(cast.peer, selector, args);
        }
        drop(entry);

        method
            .signature()
            .check_args(args.iter().map(Value::kind))?;

        let result = match method.imp() {
            Imp::Native(imp) => imp(self, receiver, args)?,
            Imp::Forward(descriptor) => {
                self.forward(receiver, descriptor, args, ExceptionPolicy::Propagate)?
            }
        };

        let expected = method.signature().return_kind();
        if result.kind() != expected {
            return Err(Error::ReturnKindMismatch {
                expected: expected.encoding(),
                got: result.kind().encoding(),
            });
        }
        Ok(result)
    }

    /// Sends a message by selector name.
    ///
    /// # Errors
    ///
    /// See [`Bridge::send_message`].
    pub fn send(&self, receiver: Handle, selector: &str, args: &[Value]) -> Result<Value> {
        self.send_message(receiver, Selector::register(selector), args)
    }

    /// Returns whether `object` responds to `selector`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if `object` is not a live object.
    pub fn responds_to(&self, object: Handle, selector: &str) -> Result<bool> {
        Ok(self
            .object(object)?
            .class
            .responds_to(Selector::register(selector)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::encoding::Signature;
    use crate::BridgeConfig;

    fn adder(bridge: &Bridge) -> Handle {
        let class = bridge.define_class("DispatchAdder", None).unwrap();
        bridge
            .add_method(
                class,
                "add:to:",
                Signature::parse("i@:ii").unwrap(),
                |_, _, args| match args {
                    [Value::Int(a), Value::Int(b)] => Ok(Value::Int(a + b)),
                    _ => unreachable!("arguments are checked before dispatch"),
                },
            )
            .unwrap();
        bridge
            .add_method(
                class,
                "broken",
                Signature::parse("i@:").unwrap(),
                |_, _, _| Ok(Value::Double(1.0)),
            )
            .unwrap();
        class
    }

    #[test]
    fn test_send_message() {
        let bridge = Bridge::new(BridgeConfig::default());
        let class = adder(&bridge);
        let obj = bridge.alloc_instance(class).unwrap();

        let result = bridge
            .send(obj, "add:to:", &[Value::Int(2), Value::Int(3)])
            .unwrap();
        assert_eq!(result, Value::Int(5));
        assert!(bridge.responds_to(obj, "add:to:").unwrap());
        assert!(bridge.responds_to(obj, "hash").unwrap());
        bridge.release(obj).unwrap();
    }

    #[test]
    fn test_send_errors() {
        let bridge = Bridge::new(BridgeConfig::default());
        let class = adder(&bridge);
        let obj = bridge.alloc_instance(class).unwrap();

        assert!(matches!(
            bridge.send(obj, "missing", &[]),
            Err(Error::SelectorNotFound { .. })
        ));
        assert_eq!(
            bridge.send(obj, "add:to:", &[Value::Int(2)]),
            Err(Error::ArgumentCountMismatch {
                expected: 2,
                got: 1
            })
        );
        assert_eq!(
            bridge.send(obj, "broken", &[]),
            Err(Error::ReturnKindMismatch {
                expected: 'i',
                got: 'd'
            })
        );
        bridge.release(obj).unwrap();
    }

    #[test]
    fn test_nil_receiver() {
        let bridge = Bridge::new(BridgeConfig::default());
        assert_eq!(bridge.send(Handle::NULL, "anything", &[]).unwrap(), Value::Void);
    }
}
