//! Native class synthesis for managed types.
//!
//! This module turns managed types into native classes:
//!
//! - **Binding** types mirror a native class that already exists; only a
//!   descriptor is recorded.
//! - **Hybrid** types record their managed type on an existing native class.
//! - **Subclass** types get a new native class named after the managed type,
//!   inheriting from the native class of the managed superclass. Every
//!   managed method with a selector becomes a forwarder.
//! - **Proxy** classes let an arbitrary managed object stand in for a native
//!   object. They are named `<Type>$Proxy`, or `<Type>$Proxy$<Base>` when an
//!   extension type contributes extra selectors.
//!
//! Classes are built through a [`ClassFactory`], the one seam that decides
//! how a [`ClassSpec`] becomes a dispatch table. Synthesis is serialized by
//! a single lock, so two threads asking for the same proxy class get the
//! same handle.
//!
//! # Example
//!
//! ```
//! use natbridge::runtime::encoding::Signature;
//! use natbridge::runtime::managed::{ManagedMethod, ManagedObject, ManagedType, ManagedValue};
//! use natbridge::runtime::Value;
//! use natbridge::{Bridge, BridgeConfig};
//!
//! let bridge = Bridge::new(BridgeConfig::default());
//! let widget = ManagedType::builder("Widget")
//!     .method(
//!         ManagedMethod::new("size", Signature::parse("i@:").unwrap(), |_| {
//!             Ok(ManagedValue::Int(3))
//!         })
//!         .with_selector("size"),
//!     )
//!     .build();
//!
//! let class = bridge.create_proxy_class(&widget).unwrap();
//! let m = ManagedObject::stateless(&widget);
//! let peer = bridge.create_proxy_instance(class, &m).unwrap();
//!
//! assert_eq!(bridge.send(peer, "size", &[]).unwrap(), Value::Int(3));
//! bridge.release(peer).unwrap();
//! ```

use crate::error::{Error, Result};
use crate::runtime::association::{AssociationCategory, InstanceContainer};
use crate::runtime::bridge::Bridge;
use crate::runtime::callback::{CallStyle, CallTarget};
use crate::runtime::class::{ClassKind, Imp, Method, NativeClass};
use crate::runtime::class_type::{AllocInfo, ClassDescriptor, ClassFlags, ExtensionInfo};
use crate::runtime::heap::Payload;
use crate::runtime::managed::{ManagedMethod, ManagedRef, ManagedType, TypeShape};
use crate::runtime::selector::Selector;
use crate::runtime::Handle;
use fxhash::{FxHashMap, FxHashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// Everything needed to build a native class.
#[derive(Clone)]
pub struct ClassSpec {
    /// Class name. Unique per bridge.
    pub name: String,
    /// Superclass, or `None` for a root class.
    pub superclass: Option<Arc<NativeClass>>,
    /// Instance layout.
    pub kind: ClassKind,
    /// Methods defined on the class itself.
    pub methods: Vec<Method>,
    /// Adopted protocol names.
    pub protocols: Vec<String>,
}

/// Builds native classes from specs.
///
/// Every class the bridge registers, built-ins included, goes through the
/// bridge's factory.
pub trait ClassFactory: Send + Sync {
    /// Builds the class that `spec` describes under `handle`.
    ///
    /// # Errors
    ///
    /// Implementations may reject specs they cannot build.
    fn build(&self, handle: Handle, spec: ClassSpec) -> Result<NativeClass>;
}

/// The default factory: an immutable selector-keyed dispatch table per class.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatchTableFactory;

impl ClassFactory for DispatchTableFactory {
    fn build(&self, handle: Handle, spec: ClassSpec) -> Result<NativeClass> {
        Ok(NativeClass::new(handle, spec))
    }
}

/// What a generated proxy class was built for. Types are keyed by
/// [`ManagedType::id`], never by name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum ProxyKey {
    Plain {
        ty: u64,
    },
    Extended {
        ty: u64,
        base: String,
        extension: u64,
    },
}

/// Classes produced by this module.
#[derive(Default)]
pub(crate) struct ProxyClassGenerator {
    produced: RwLock<FxHashSet<Handle>>,
    by_key: Mutex<FxHashMap<ProxyKey, Handle>>,
}

impl ProxyClassGenerator {
    pub(crate) fn lock(&self) -> MutexGuard<'_, FxHashMap<ProxyKey, Handle>> {
        self.by_key.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_produced(&self, class: Handle) -> bool {
        self.produced
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&class)
    }

    fn record(&self, keys: &mut FxHashMap<ProxyKey, Handle>, key: ProxyKey, class: Handle) {
        keys.insert(key, class);
        self.produced
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class);
    }
}

fn forwarders(
    bridge: &Bridge,
    methods: &[Arc<ManagedMethod>],
    target: CallTarget,
    skip: &[Selector],
) -> Vec<Method> {
    methods
        .iter()
        .filter_map(|m| {
            let selector = Selector::register(m.selector()?);
            if skip.contains(&selector) {
                return None;
            }
            let descriptor = bridge.descriptor_for(m, CallStyle::Method, target);
            Some(Method::new(
                selector,
                m.signature().clone(),
                Imp::Forward(descriptor),
            ))
        })
        .collect()
}

fn ensure_plain_base(class_name: &str, base: &NativeClass) -> Result<()> {
    if base.kind() != ClassKind::Plain {
        return Err(Error::IncompatibleBaseClass {
            class: class_name.to_string(),
            base: base.name().to_string(),
            reason: "string and block classes cannot be subclassed",
        });
    }
    Ok(())
}

impl Bridge {
    /// Records the native class of a managed type.
    ///
    /// Idempotent: registering a type again returns its existing descriptor.
    /// A subclass type registers its managed superclass first.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownClass`] if a binding or hybrid type names a class
    ///   that does not exist
    /// - [`Error::IncompatibleBaseClass`] if a subclass would derive from a
    ///   proxy, string or block class
    /// - [`Error::ClassAlreadyExists`] if a subclass's name is taken by a
    ///   native class that was not generated for this very type
    /// - [`Error::UnsupportedManagedType`] for plain classes and interfaces,
    ///   which only get proxies
    pub fn register_class(&self, ty: &Arc<ManagedType>) -> Result<Arc<ClassDescriptor>> {
        let _keys = self.shared.proxies.lock();
        self.register_class_locked(ty)
    }

    fn register_class_locked(&self, ty: &Arc<ManagedType>) -> Result<Arc<ClassDescriptor>> {
        let alloc_info = ty.constructor().map(|c| AllocInfo {
            constructor: Arc::clone(c),
        });

        let (class, flags) = match ty.shape() {
            TypeShape::Plain | TypeShape::Interface => {
                return Err(Error::UnsupportedManagedType {
                    name: ty.name().to_string(),
                });
            }
            TypeShape::Binding { native_class } => {
                (self.existing_class(native_class)?, ClassFlags::BINDING)
            }
            TypeShape::Hybrid { native_class } => {
                (self.existing_class(native_class)?, ClassFlags::HYBRID)
            }
            TypeShape::Subclass { superclass } => {
                if let Some(existing) = self.class_named(ty.name()) {
                    return self
                        .class_descriptor(existing.handle())
                        .filter(|d| d.managed_type().is_some_and(|t| t.id() == ty.id()))
                        .ok_or(Error::ClassAlreadyExists {
                            name: ty.name().to_string(),
                        });
                }

                let base_descriptor = self.register_class_locked(superclass)?;
                if base_descriptor.flags().is_proxy() {
                    return Err(Error::IncompatibleBaseClass {
                        class: ty.name().to_string(),
                        base: superclass.name().to_string(),
                        reason: "proxy classes cannot be subclassed",
                    });
                }
                let base = self.class(base_descriptor.class())?;
                ensure_plain_base(ty.name(), &base)?;

                let class = self.install_class(ClassSpec {
                    name: ty.name().to_string(),
                    superclass: Some(base),
                    kind: ClassKind::Plain,
                    methods: forwarders(self, &ty.selector_methods(), CallTarget::Binding, &[]),
                    protocols: ty.all_interface_names(),
                })?;
                natbridge_log::debug!(
                    "generated inherited class {} for managed type {}",
                    class.name(),
                    ty.name()
                );
                (class, ClassFlags::INHERITED)
            }
        };

        let mut descriptor = ClassDescriptor::new(class.handle(), flags).with_managed_type(ty);
        if let Some(info) = alloc_info {
            descriptor = descriptor.with_alloc_info(info);
        }
        self.register_construction_info(descriptor)
    }

    fn existing_class(&self, name: &str) -> Result<Arc<NativeClass>> {
        self.class_named(name).ok_or_else(|| Error::UnknownClass {
            name: name.to_string(),
        })
    }

    /// Returns the proxy class for `ty`, generating it on first use.
    ///
    /// The class derives from the type's own native class when it has one
    /// and from the root class otherwise. It forwards every selector the
    /// type's methods declare to the Binding association and adopts the
    /// protocols of the type's interfaces.
    ///
    /// Classes are memoized per managed type, not per name. A distinct type
    /// that shares the name of an already proxied type cannot get a class.
    ///
    /// # Errors
    ///
    /// - [`Error::ClassAlreadyExists`] if the proxy name is taken by another
    ///   type's class
    /// - the errors of [`Bridge::register_class`] for binding, hybrid and
    ///   subclass types
    pub fn create_proxy_class(&self, ty: &Arc<ManagedType>) -> Result<Handle> {
        let mut keys = self.shared.proxies.lock();
        let key = ProxyKey::Plain { ty: ty.id() };
        if let Some(&class) = keys.get(&key) {
            return Ok(class);
        }
        let name = format!("{}$Proxy", ty.name());

        let base = match ty.shape() {
            TypeShape::Plain | TypeShape::Interface => Arc::clone(&self.builtins().root),
            TypeShape::Binding { .. } | TypeShape::Hybrid { .. } | TypeShape::Subclass { .. } => {
                let descriptor = self.register_class_locked(ty)?;
                self.class(descriptor.class())?
            }
        };
        ensure_plain_base(&name, &base)?;

        let methods = forwarders(self, &ty.selector_methods(), CallTarget::Binding, &[]);
        let flags = self.proxy_flags(&base)?;
        let class = self.install_class(ClassSpec {
            name,
            superclass: Some(base),
            kind: ClassKind::Plain,
            methods,
            protocols: ty.all_interface_names(),
        })?;
        self.register_construction_info(
            ClassDescriptor::new(class.handle(), flags).with_managed_type(ty),
        )?;

        self.shared.proxies.record(&mut keys, key, class.handle());
        natbridge_log::debug!("generated proxy class {} as {}", class.name(), class.handle());
        Ok(class.handle())
    }

    /// Returns an extended proxy class for `ty` on the native class
    /// `base_name`, generating it on first use.
    ///
    /// Selectors of `ty` forward to the Binding association. Selectors that
    /// only `extension` declares forward to the Custom association, which
    /// [`Bridge::create_proxy_instance`] fills by running the extension's
    /// constructor.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownClass`] if `base_name` is not a native class
    /// - [`Error::IncompatibleBaseClass`] for string and block bases
    /// - [`Error::MissingConstructor`] if `extension` has no constructor
    pub fn create_proxy_class_with_extension(
        &self,
        ty: &Arc<ManagedType>,
        base_name: &str,
        extension: &Arc<ManagedType>,
    ) -> Result<Handle> {
        let mut keys = self.shared.proxies.lock();
        let key = ProxyKey::Extended {
            ty: ty.id(),
            base: base_name.to_string(),
            extension: extension.id(),
        };
        if let Some(&class) = keys.get(&key) {
            return Ok(class);
        }
        let name = format!("{}$Proxy${base_name}", ty.name());

        let base = self.existing_class(base_name)?;
        ensure_plain_base(&name, &base)?;
        let Some(constructor) = extension.constructor() else {
            return Err(Error::MissingConstructor {
                name: extension.name().to_string(),
            });
        };

        let mut methods = forwarders(self, &ty.selector_methods(), CallTarget::Binding, &[]);
        let own: Vec<Selector> = methods.iter().map(Method::selector).collect();
        methods.extend(forwarders(
            self,
            &extension.selector_methods(),
            CallTarget::Custom,
            &own,
        ));

        let mut protocols = ty.all_interface_names();
        for protocol in extension.all_interface_names() {
            if !protocols.contains(&protocol) {
                protocols.push(protocol);
            }
        }

        let flags = self.proxy_flags(&base)?;
        let class = self.install_class(ClassSpec {
            name,
            superclass: Some(base),
            kind: ClassKind::Plain,
            methods,
            protocols,
        })?;
        self.register_construction_info(
            ClassDescriptor::new(class.handle(), flags)
                .with_managed_type(ty)
                .with_extension_info(ExtensionInfo {
                    extension_type: Arc::clone(extension),
                    constructor: Arc::clone(constructor),
                }),
        )?;

        self.shared.proxies.record(&mut keys, key, class.handle());
        natbridge_log::debug!(
            "generated extended proxy class {} as {}",
            class.name(),
            class.handle()
        );
        Ok(class.handle())
    }

    fn proxy_flags(&self, base: &NativeClass) -> Result<ClassFlags> {
        Ok(if self.classify(base.handle())?.is_inherited() {
            ClassFlags::PROXY | ClassFlags::INHERITED
        } else {
            ClassFlags::PROXY
        })
    }

    /// Allocates an instance of a proxy class bound to `managed`.
    ///
    /// The Binding association holds `managed` strongly, and `managed`
    /// records the instance as its peer if it has none yet. For an extended
    /// proxy class the extension instance is built and stored in the Custom
    /// association. The caller owns the returned retain.
    ///
    /// # Errors
    ///
    /// - [`Error::NotAProxyClass`] if `class` was not generated by
    ///   [`Bridge::create_proxy_class`] or
    ///   [`Bridge::create_proxy_class_with_extension`]
    /// - [`Error::ManagedException`] if the extension constructor throws
    /// - allocation errors
    pub fn create_proxy_instance(&self, class: Handle, managed: &ManagedRef) -> Result<Handle> {
        if !self.shared.proxies.is_produced(class) {
            return Err(Error::NotAProxyClass { class });
        }
        let native_class = self.class(class)?;
        let peer = self.alloc_object(&native_class, Payload::None)?;

        if let Err(err) = self.bind_proxy(peer, class, managed) {
            // Drops the Binding again through deallocation.
            self.release(peer)?;
            return Err(err);
        }
        Ok(peer)
    }

    fn bind_proxy(&self, peer: Handle, class: Handle, managed: &ManagedRef) -> Result<()> {
        self.set_association(
            peer,
            AssociationCategory::Binding,
            Some(InstanceContainer::Strong(Arc::clone(managed))),
        )?;

        let extension = self
            .class_descriptor(class)
            .and_then(|d| d.extension_info().cloned());
        if let Some(extension) = extension {
            let instance = (extension.constructor)(self, peer)?;
            self.set_association(
                peer,
                AssociationCategory::Custom,
                Some(InstanceContainer::Strong(instance)),
            )?;
        }
        Ok(())
    }
}
