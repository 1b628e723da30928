//! Typed call forwarding between native callers and managed targets.
//!
//! A [`CallbackDescriptor`] ties a managed method to a calling convention.
//! Descriptors are built once per (method, style, target) and addressed by
//! a non-zero `u64` data handle, which is what native code holds on to.
//!
//! # Forwarding
//!
//! A forwarded call `(peer, data, args)`:
//!
//! 1. checks the arguments against the descriptor's signature
//! 2. resolves the managed target from the peer's associations
//! 3. attaches the calling thread to the managed runtime if needed
//! 4. unmarshals arguments: objects through their Binding or Custom
//!    association, primitives by value
//! 5. invokes the managed method
//! 6. marshals the result, or handles the thrown exception
//!
//! Closure-style forwarders have no failure channel at the native call
//! site: an exception is logged with its trace and the return kind's
//! default value is returned. Protocol-style forwarders propagate the
//! exception as [`Error::ManagedException`].
//!
//! # Typed entry points
//!
//! Native code enters through one forwarder per return kind and call
//! style, such as [`Bridge::forward_int_block_call`] or
//! [`Bridge::forward_object_protocol_call`]. Each checks that the
//! descriptor's return kind matches its own.

use crate::error::{Error, Result};
use crate::runtime::association::{AssociationCategory, InstanceContainer};
use crate::runtime::bridge::Bridge;
use crate::runtime::class::{ClassKind, Imp, NativeImp};
use crate::runtime::encoding::{Kind, Signature};
use crate::runtime::heap::{BlockBody, BlockInvoke, Payload};
use crate::runtime::managed::{ManagedCall, ManagedMethod, ManagedRef, ManagedType, ManagedValue};
use crate::runtime::selector::Selector;
use crate::runtime::value::{NativeReturn, Value};
use crate::runtime::Handle;
use fxhash::FxHashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// How the native side calls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallStyle {
    /// A closure call. No failure channel.
    Block,
    /// A protocol method on a foreign object.
    Protocol,
    /// A method of a generated class.
    Method,
}

/// Where the managed receiver comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallTarget {
    /// The peer's Block association.
    Block,
    /// The peer's Binding association.
    Binding,
    /// The peer's Custom association.
    Custom,
    /// Binding, falling back to Custom.
    BindingOrCustom,
    /// A native block called from managed code.
    NativeBlock,
}

/// What to do with an exception thrown by the managed target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExceptionPolicy {
    LogAndDefault,
    Propagate,
}

/// A managed method bound to a calling convention.
pub struct CallbackDescriptor {
    data: u64,
    method: Arc<ManagedMethod>,
    style: CallStyle,
    target: CallTarget,
    selector: Option<Selector>,
}

impl CallbackDescriptor {
    /// Returns the data handle native code uses to refer to this descriptor.
    #[must_use]
    pub fn data(&self) -> u64 {
        self.data
    }

    /// Returns the managed method.
    #[must_use]
    pub fn method(&self) -> &Arc<ManagedMethod> {
        &self.method
    }

    /// Returns the signature.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        self.method.signature()
    }

    /// Returns the return kind.
    #[must_use]
    pub fn return_kind(&self) -> Kind {
        self.method.signature().return_kind()
    }

    /// Returns the call style.
    #[must_use]
    pub fn style(&self) -> CallStyle {
        self.style
    }

    /// Returns the target.
    #[must_use]
    pub fn target(&self) -> CallTarget {
        self.target
    }

    /// Returns the native selector, if the method has one.
    #[must_use]
    pub fn selector(&self) -> Option<Selector> {
        self.selector
    }
}

impl fmt::Debug for CallbackDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackDescriptor")
            .field("data", &format_args!("{:#x}", self.data))
            .field("method", &self.method.name())
            .field("signature", &self.signature().to_string())
            .field("style", &self.style)
            .field("target", &self.target)
            .finish()
    }
}

type DescriptorKey = (u64, CallStyle, CallTarget);

#[derive(Default)]
struct Descriptors {
    by_data: FxHashMap<u64, Arc<CallbackDescriptor>>,
    by_key: FxHashMap<DescriptorKey, Arc<CallbackDescriptor>>,
}

/// Descriptors of one bridge.
#[derive(Default)]
pub(crate) struct CallbackRegistry {
    inner: RwLock<Descriptors>,
}

impl CallbackRegistry {
    fn get_or_insert(
        &self,
        key: DescriptorKey,
        make: impl FnOnce() -> CallbackDescriptor,
    ) -> Arc<CallbackDescriptor> {
        if let Some(found) = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_key
            .get(&key)
        {
            return Arc::clone(found);
        }

        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(found) = inner.by_key.get(&key) {
            return Arc::clone(found);
        }
        let descriptor = Arc::new(make());
        inner
            .by_data
            .insert(descriptor.data, Arc::clone(&descriptor));
        inner.by_key.insert(key, Arc::clone(&descriptor));
        descriptor
    }

    fn get(&self, data: u64) -> Option<Arc<CallbackDescriptor>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_data
            .get(&data)
            .cloned()
    }

    pub(crate) fn clear(&self) {
        let taken = std::mem::take(&mut *self.inner.write().unwrap_or_else(PoisonError::into_inner));
        drop(taken);
    }
}

enum Resolved {
    Managed(ManagedRef),
    NativeBlock(NativeImp),
    Selector(Selector),
}

// ============================================================================
// Descriptor construction
// ============================================================================

impl Bridge {
    pub(crate) fn descriptor_for(
        &self,
        method: &Arc<ManagedMethod>,
        style: CallStyle,
        target: CallTarget,
    ) -> Arc<CallbackDescriptor> {
        self.shared
            .callbacks
            .get_or_insert((method.id(), style, target), || CallbackDescriptor {
                data: self.shared.handles.next().as_raw(),
                method: Arc::clone(method),
                style,
                target,
                selector: method.selector().map(Selector::register),
            })
    }

    /// Looks up a descriptor by data handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCallbackData`] for an unknown handle.
    pub fn callback_descriptor(&self, data: u64) -> Result<Arc<CallbackDescriptor>> {
        self.shared
            .callbacks
            .get(data)
            .ok_or(Error::InvalidCallbackData { data })
    }

    /// Builds the descriptor used when native code calls a closure backed by
    /// a managed instance's `method`.
    pub fn create_data_for_native_block(&self, method: &Arc<ManagedMethod>) -> u64 {
        self.descriptor_for(method, CallStyle::Block, CallTarget::Block)
            .data()
    }

    /// Builds one descriptor per method of `interface`, in declaration order,
    /// for native code calling protocol methods on a peer.
    pub fn create_data_for_native_protocol_proxy(&self, interface: &ManagedType) -> Vec<u64> {
        interface
            .methods()
            .iter()
            .map(|m| {
                self.descriptor_for(m, CallStyle::Protocol, CallTarget::BindingOrCustom)
                    .data()
            })
            .collect()
    }

    /// Builds the descriptor used when managed code calls a native closure
    /// through the functional interface method `method`.
    pub fn create_data_for_java_block(&self, method: &Arc<ManagedMethod>) -> u64 {
        self.descriptor_for(method, CallStyle::Block, CallTarget::NativeBlock)
            .data()
    }

    /// Wraps a managed functional object in a native heap closure.
    ///
    /// Calling the closure runs `method` on `instance`. The closure is
    /// returned with a retain the caller owns; [`Bridge::get_instance_for_java_block`]
    /// recovers `instance` from it.
    ///
    /// # Errors
    ///
    /// Returns allocation errors.
    pub fn create_native_callback_from_java_instance(
        &self,
        instance: &ManagedRef,
        method: &Arc<ManagedMethod>,
    ) -> Result<Handle> {
        let descriptor = self.descriptor_for(method, CallStyle::Block, CallTarget::Block);
        let block = self.alloc_object(
            &self.builtins().block,
            Payload::Block(BlockBody {
                signature: method.signature().clone(),
                invoke: BlockInvoke::Managed(descriptor),
            }),
        )?;
        self.set_association(
            block,
            AssociationCategory::Block,
            Some(InstanceContainer::Strong(Arc::clone(instance))),
        )?;
        Ok(block)
    }

    /// Returns the managed instance a closure was created from.
    ///
    /// # Errors
    ///
    /// - [`Error::NotABlock`] if `block` is not a closure
    /// - [`Error::NotAManagedBlock`] if it was not created by
    ///   [`Bridge::create_native_callback_from_java_instance`]
    pub fn get_instance_for_java_block(&self, block: Handle) -> Result<ManagedRef> {
        let entry = self.object(block)?;
        if entry.block().is_none() {
            return Err(Error::NotABlock { handle: block });
        }
        self.association(block, AssociationCategory::Block)?
            .ok_or(Error::NotAManagedBlock { handle: block })
    }

    /// Creates a native heap closure with a retain the caller owns.
    ///
    /// # Errors
    ///
    /// Returns allocation errors.
    pub fn create_native_block<F>(&self, signature: Signature, imp: F) -> Result<Handle>
    where
        F: Fn(&Bridge, Handle, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.alloc_block(ClassKind::Block, signature, Arc::new(imp))
    }

    /// Creates a native stack closure. It must be copied with
    /// [`Bridge::copy_block`] before it escapes.
    ///
    /// # Errors
    ///
    /// Returns allocation errors.
    pub fn create_stack_block<F>(&self, signature: Signature, imp: F) -> Result<Handle>
    where
        F: Fn(&Bridge, Handle, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.alloc_block(ClassKind::StackBlock, signature, Arc::new(imp))
    }

    fn alloc_block(&self, kind: ClassKind, signature: Signature, imp: NativeImp) -> Result<Handle> {
        let class = if kind == ClassKind::StackBlock {
            &self.builtins().stack_block
        } else {
            &self.builtins().block
        };
        self.alloc_object(
            class,
            Payload::Block(BlockBody {
                signature,
                invoke: BlockInvoke::Native(imp),
            }),
        )
    }

    /// Copies a closure.
    ///
    /// A stack closure is copied to a new heap closure, returned with a
    /// retain the caller owns; its Block association is carried over. A heap
    /// closure is retained and returned as is.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotABlock`] if `block` is not a closure.
    pub fn copy_block(&self, block: Handle) -> Result<Handle> {
        let entry = self.object(block)?;
        let Some(body) = entry.block() else {
            return Err(Error::NotABlock { handle: block });
        };
        if entry.class.kind() != ClassKind::StackBlock {
            return self.retain(block);
        }

        let copy = self.alloc_object(&self.builtins().block, Payload::Block(body.clone()))?;
        if let Some(container) = self
            .shared
            .associations
            .container(block, AssociationCategory::Block)
        {
            self.set_association(copy, AssociationCategory::Block, Some(container))?;
        }
        Ok(copy)
    }
}

// ============================================================================
// Invocation
// ============================================================================

impl Bridge {
    /// Calls a closure from native code.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotABlock`] and argument mismatches. Exceptions
    /// thrown by a managed body are logged, not returned.
    pub fn call_block(&self, block: Handle, args: &[Value]) -> Result<Value> {
        let entry = self.object(block)?;
        let Some(body) = entry.block().cloned() else {
            return Err(Error::NotABlock { handle: block });
        };
        drop(entry);

        body.signature.check_args(args.iter().map(Value::kind))?;
        match body.invoke {
            BlockInvoke::Native(imp) => imp(self, block, args),
            BlockInvoke::Managed(descriptor) => {
                self.forward(block, &descriptor, args, ExceptionPolicy::LogAndDefault)
            }
        }
    }

    /// Calls a native closure from managed code, using the signature of the
    /// descriptor built by [`Bridge::create_data_for_java_block`].
    ///
    /// Managed objects without a peer are passed as autoreleased proxies.
    ///
    /// # Errors
    ///
    /// Returns descriptor, argument and closure errors.
    pub fn invoke_block(&self, block: Handle, data: u64, args: &[ManagedValue]) -> Result<ManagedValue> {
        let descriptor = self.callback_descriptor(data)?;
        let signature = descriptor.signature();
        signature.check_args(args.iter().map(ManagedValue::kind))?;

        let native_args = args
            .iter()
            .zip(signature.arg_kinds())
            .map(|(arg, kind)| self.marshal_out(arg.clone(), *kind))
            .collect::<Result<Vec<_>>>()?;

        let result = self.call_block(block, &native_args)?;
        if result.kind() != descriptor.return_kind() {
            return Err(Error::ReturnKindMismatch {
                expected: descriptor.return_kind().encoding(),
                got: result.kind().encoding(),
            });
        }
        self.unmarshal(result)
    }

    /// Forwards a call through `descriptor` with the policy of the caller.
    pub(crate) fn forward(
        &self,
        peer: Handle,
        descriptor: &Arc<CallbackDescriptor>,
        args: &[Value],
        policy: ExceptionPolicy,
    ) -> Result<Value> {
        descriptor
            .signature()
            .check_args(args.iter().map(Value::kind))?;

        let target = match self.resolve_target(peer, descriptor)? {
            Resolved::Managed(target) => target,
            Resolved::NativeBlock(imp) => return imp(self, peer, args),
            Resolved::Selector(selector) => return self.send_message(peer, selector, args),
        };

        self.ensure_attached();

        let managed_args = args
            .iter()
            .map(|v| self.unmarshal(*v))
            .collect::<Result<Vec<_>>>()?;
        let call = ManagedCall::new(self, Some(&target), peer, &managed_args);

        let return_kind = descriptor.return_kind();
        match descriptor.method().invoke(&call) {
            Ok(value) => self.marshal_out(value, return_kind),
            Err(exception) => match policy {
                ExceptionPolicy::LogAndDefault => {
                    natbridge_log::error!(
                        "{} threw inside closure {peer}; returning default {return_kind}\n{}",
                        descriptor.method().name(),
                        exception.full_trace()
                    );
                    Ok(Value::default_for(return_kind))
                }
                ExceptionPolicy::Propagate => Err(Error::ManagedException(exception)),
            },
        }
    }

    fn resolve_target(&self, peer: Handle, descriptor: &Arc<CallbackDescriptor>) -> Result<Resolved> {
        let entry = self.object(peer)?;
        let associations = &self.shared.associations;

        let found = match descriptor.target() {
            CallTarget::Block | CallTarget::NativeBlock => {
                if let Some(obj) = associations.get(peer, AssociationCategory::Block) {
                    return Ok(Resolved::Managed(obj));
                }
                return match entry.block().map(|b| &b.invoke) {
                    Some(BlockInvoke::Native(imp)) => Ok(Resolved::NativeBlock(Arc::clone(imp))),
                    Some(BlockInvoke::Managed(_)) => Err(Error::NotAManagedBlock { handle: peer }),
                    None => Err(Error::NotABlock { handle: peer }),
                };
            }
            CallTarget::Binding => associations.get(peer, AssociationCategory::Binding),
            CallTarget::Custom => associations.get(peer, AssociationCategory::Custom),
            CallTarget::BindingOrCustom => associations
                .get(peer, AssociationCategory::Binding)
                .or_else(|| associations.get(peer, AssociationCategory::Custom)),
        };
        if let Some(obj) = found {
            return Ok(Resolved::Managed(obj));
        }

        // A protocol call on a purely native object goes to its own method.
        if descriptor.style() == CallStyle::Protocol
            && let Some(selector) = descriptor.selector()
            && entry
                .class
                .lookup(selector)
                .is_some_and(|m| !matches!(m.imp(), Imp::Forward(_)))
        {
            return Ok(Resolved::Selector(selector));
        }

        Err(Error::NoManagedTarget { handle: peer })
    }

    /// Converts a native value to its managed form.
    pub(crate) fn unmarshal(&self, value: Value) -> Result<ManagedValue> {
        Ok(match value {
            Value::Void => ManagedValue::Void,
            Value::Bool(v) => ManagedValue::Bool(v),
            Value::Byte(v) => ManagedValue::Byte(v),
            Value::Char(v) => ManagedValue::Char(v),
            Value::Short(v) => ManagedValue::Short(v),
            Value::Int(v) => ManagedValue::Int(v),
            Value::Long(v) => ManagedValue::Long(v),
            Value::Float(v) => ManagedValue::Float(v),
            Value::Double(v) => ManagedValue::Double(v),
            Value::Object(h) if h.is_null() => ManagedValue::Object(None),
            Value::Object(h) => {
                let managed = self
                    .association(h, AssociationCategory::Binding)?
                    .or(self.association(h, AssociationCategory::Custom)?);
                match managed {
                    Some(obj) => ManagedValue::Object(Some(obj)),
                    None => ManagedValue::Native(h),
                }
            }
        })
    }

    /// Converts a managed value to its native form.
    ///
    /// A managed object with a peer yields the peer, retained and
    /// autoreleased. One without gets a proxy instance, autoreleased. A
    /// transparent cast proxy is replaced by the object it stands for.
    pub(crate) fn marshal_out(&self, value: ManagedValue, expected: Kind) -> Result<Value> {
        if value.kind() != expected {
            return Err(Error::ReturnKindMismatch {
                expected: expected.encoding(),
                got: value.kind().encoding(),
            });
        }
        Ok(match value {
            ManagedValue::Void => Value::Void,
            ManagedValue::Bool(v) => Value::Bool(v),
            ManagedValue::Byte(v) => Value::Byte(v),
            ManagedValue::Char(v) => Value::Char(v),
            ManagedValue::Short(v) => Value::Short(v),
            ManagedValue::Int(v) => Value::Int(v),
            ManagedValue::Long(v) => Value::Long(v),
            ManagedValue::Float(v) => Value::Float(v),
            ManagedValue::Double(v) => Value::Double(v),
            ManagedValue::Native(h) => Value::Object(self.native_view(h)),
            ManagedValue::Object(None) => Value::Object(Handle::NULL),
            ManagedValue::Object(Some(obj)) => {
                let peer = self.native_view(obj.peer());
                if !peer.is_null() && self.is_live(peer) {
                    self.retain(peer)?;
                    Value::Object(self.autorelease(peer)?)
                } else {
                    let class = self.create_proxy_class(obj.managed_type())?;
                    let proxy = self.create_proxy_instance(class, &obj)?;
                    Value::Object(self.autorelease(proxy)?)
                }
            }
        })
    }

    fn typed_forward<T: NativeReturn>(
        &self,
        peer: Handle,
        data: u64,
        args: &[Value],
        policy: ExceptionPolicy,
    ) -> Result<T> {
        let descriptor = self.callback_descriptor(data)?;
        if descriptor.return_kind() != T::KIND {
            return Err(Error::SignatureMismatch {
                forwarder: T::KIND.encoding(),
                descriptor: descriptor.return_kind().encoding(),
            });
        }
        let value = self.forward(peer, &descriptor, args, policy)?;
        T::from_value(value).ok_or(Error::ReturnKindMismatch {
            expected: T::KIND.encoding(),
            got: value.kind().encoding(),
        })
    }
}

macro_rules! typed_forwarders {
    ($($ty:ty => $block:ident, $protocol:ident;)*) => {
        impl Bridge {
            $(
                #[doc = concat!("Forwards a closure call returning `", stringify!($ty), "`.")]
                ///
                /// A managed exception is logged and the default value returned.
                ///
                /// # Errors
                ///
                /// Returns [`Error::SignatureMismatch`] if the descriptor
                /// returns another kind, and peer or argument errors.
                pub fn $block(&self, peer: Handle, data: u64, args: &[Value]) -> Result<$ty> {
                    self.typed_forward::<$ty>(peer, data, args, ExceptionPolicy::LogAndDefault)
                }

                #[doc = concat!("Forwards a protocol call returning `", stringify!($ty), "`.")]
                ///
                /// # Errors
                ///
                /// Returns [`Error::ManagedException`] if the managed target
                /// throws, [`Error::SignatureMismatch`] if the descriptor
                /// returns another kind, and peer or argument errors.
                pub fn $protocol(&self, peer: Handle, data: u64, args: &[Value]) -> Result<$ty> {
                    self.typed_forward::<$ty>(peer, data, args, ExceptionPolicy::Propagate)
                }
            )*
        }
    };
}

typed_forwarders! {
    bool => forward_bool_block_call, forward_bool_protocol_call;
    i8 => forward_byte_block_call, forward_byte_protocol_call;
    u16 => forward_char_block_call, forward_char_protocol_call;
    i16 => forward_short_block_call, forward_short_protocol_call;
    i32 => forward_int_block_call, forward_int_protocol_call;
    i64 => forward_long_block_call, forward_long_protocol_call;
    f32 => forward_float_block_call, forward_float_protocol_call;
    f64 => forward_double_block_call, forward_double_protocol_call;
    Handle => forward_object_block_call, forward_object_protocol_call;
    () => forward_void_block_call, forward_void_protocol_call;
}
