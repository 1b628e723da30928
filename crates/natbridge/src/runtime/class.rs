//! Native classes.
//!
//! A [`NativeClass`] has a name, an optional superclass, a method table keyed
//! by [`Selector`], a list of adopted protocol names and a [`ClassKind`]
//! marking the built-in string and block classes. Classes are never
//! unregistered; they live as long as the bridge.
//!
//! Method lookup walks the superclass chain and memoizes hits in a
//! per-class cache. Adding a method anywhere clears every cache, since a
//! subclass may have cached the inherited implementation.
//!
//! Every class is built through the bridge's
//! [`ClassFactory`](crate::runtime::proxy::ClassFactory), including the
//! built-in ones.

use crate::error::{Error, Result};
use crate::runtime::bridge::Bridge;
use crate::runtime::callback::CallbackDescriptor;
use crate::runtime::encoding::Signature;
use crate::runtime::proxy::ClassSpec;
use crate::runtime::selector::Selector;
use crate::runtime::value::Value;
use crate::runtime::Handle;
use fxhash::FxHashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// A native method body: `(bridge, receiver, args) -> result`.
pub type NativeImp = Arc<dyn Fn(&Bridge, Handle, &[Value]) -> Result<Value> + Send + Sync>;

/// A method implementation.
#[derive(Clone)]
pub enum Imp {
    /// Implemented natively.
    Native(NativeImp),
    /// Forwards into a managed method.
    Forward(Arc<CallbackDescriptor>),
}

/// A method: selector, signature and implementation.
#[derive(Clone)]
pub struct Method {
    selector: Selector,
    signature: Signature,
    imp: Imp,
}

impl Method {
    /// Creates a method.
    #[must_use]
    pub fn new(selector: Selector, signature: Signature, imp: Imp) -> Self {
        Method {
            selector,
            signature,
            imp,
        }
    }

    /// Creates a natively implemented method.
    pub fn native<F>(selector: &str, signature: Signature, imp: F) -> Self
    where
        F: Fn(&Bridge, Handle, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Method::new(Selector::register(selector), signature, Imp::Native(Arc::new(imp)))
    }

    /// Returns the selector.
    #[must_use]
    pub fn selector(&self) -> Selector {
        self.selector
    }

    /// Returns the signature.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Returns the implementation.
    #[must_use]
    pub fn imp(&self) -> &Imp {
        &self.imp
    }

    /// Returns whether this method forwards into managed code.
    #[must_use]
    pub fn is_forwarder(&self) -> bool {
        matches!(self.imp, Imp::Forward(_))
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("selector", &self.selector)
            .field("signature", &self.signature.to_string())
            .field("forwarder", &self.is_forwarder())
            .finish()
    }
}

/// Marks the built-in classes with special instance layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassKind {
    /// Ordinary objects.
    Plain,
    /// String objects.
    String,
    /// Heap closures.
    Block,
    /// Stack closures. Must be copied before they outlive their frame.
    StackBlock,
}

impl ClassKind {
    /// Returns whether instances are closures.
    #[must_use]
    pub fn is_block(self) -> bool {
        matches!(self, ClassKind::Block | ClassKind::StackBlock)
    }
}

/// A class in the native runtime.
pub struct NativeClass {
    handle: Handle,
    name: String,
    super_class: Option<Arc<NativeClass>>,
    kind: ClassKind,
    methods: RwLock<FxHashMap<Selector, Method>>,
    cache: RwLock<FxHashMap<Selector, Method>>,
    protocols: RwLock<Vec<String>>,
}

impl NativeClass {
    /// Creates a class from its parts. Does not register it.
    #[must_use]
    pub fn new(handle: Handle, spec: ClassSpec) -> Self {
        let methods = spec
            .methods
            .into_iter()
            .map(|m| (m.selector(), m))
            .collect();
        NativeClass {
            handle,
            name: spec.name,
            super_class: spec.superclass,
            kind: spec.kind,
            methods: RwLock::new(methods),
            cache: RwLock::new(FxHashMap::default()),
            protocols: RwLock::new(spec.protocols),
        }
    }

    /// Returns the class handle.
    #[must_use]
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Returns the class name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the superclass, or `None` for a root class.
    #[must_use]
    pub fn superclass(&self) -> Option<&Arc<NativeClass>> {
        self.super_class.as_ref()
    }

    /// Returns the class kind.
    #[must_use]
    pub fn kind(&self) -> ClassKind {
        self.kind
    }

    /// Iterates over this class and its ancestors, most derived first.
    pub fn ancestors(self: &Arc<Self>) -> impl Iterator<Item = &Arc<NativeClass>> {
        std::iter::successors(Some(self), |c| c.super_class.as_ref())
    }

    /// Returns whether `self` is `other` or inherits from it.
    #[must_use]
    pub fn is_subclass_of(self: &Arc<Self>, other: &NativeClass) -> bool {
        self.ancestors().any(|c| c.handle == other.handle)
    }

    /// Looks up `selector` on this class and its ancestors.
    ///
    /// Hits are cached on `self`.
    #[must_use]
    pub fn lookup(self: &Arc<Self>, selector: Selector) -> Option<Method> {
        if let Some(m) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&selector)
        {
            return Some(m.clone());
        }

        let found = self.ancestors().find_map(|c| {
            c.methods
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&selector)
                .cloned()
        })?;

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(selector, found.clone());
        Some(found)
    }

    /// Returns whether instances respond to `selector`.
    #[must_use]
    pub fn responds_to(self: &Arc<Self>, selector: Selector) -> bool {
        self.lookup(selector).is_some()
    }

    /// Returns the methods declared on this class itself.
    #[must_use]
    pub fn own_methods(&self) -> Vec<Method> {
        self.methods
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Returns the protocols adopted by this class itself.
    #[must_use]
    pub fn protocols(&self) -> Vec<String> {
        self.protocols
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns whether this class or an ancestor adopts `protocol`.
    #[must_use]
    pub fn conforms_to(self: &Arc<Self>, protocol: &str) -> bool {
        self.ancestors().any(|c| {
            c.protocols
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .any(|p| p == protocol)
        })
    }

    fn insert_method(&self, method: Method) {
        self.methods
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(method.selector(), method);
    }

    fn clear_cache(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl fmt::Debug for NativeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeClass")
            .field("handle", &self.handle)
            .field("name", &self.name)
            .field("superclass", &self.super_class.as_ref().map(|s| s.name()))
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Class table
// ============================================================================

#[derive(Default)]
struct ClassMaps {
    by_handle: FxHashMap<Handle, Arc<NativeClass>>,
    by_name: FxHashMap<String, Arc<NativeClass>>,
}

/// Every class registered with a bridge.
#[derive(Default)]
pub(crate) struct ClassTable {
    maps: RwLock<ClassMaps>,
}

impl ClassTable {
    pub(crate) fn insert(&self, class: Arc<NativeClass>) -> Result<()> {
        let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
        if maps.by_name.contains_key(class.name()) {
            return Err(Error::ClassAlreadyExists {
                name: class.name().to_string(),
            });
        }
        maps.by_name
            .insert(class.name().to_string(), Arc::clone(&class));
        maps.by_handle.insert(class.handle(), class);
        Ok(())
    }

    pub(crate) fn get(&self, handle: Handle) -> Option<Arc<NativeClass>> {
        self.maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_handle
            .get(&handle)
            .cloned()
    }

    pub(crate) fn named(&self, name: &str) -> Option<Arc<NativeClass>> {
        self.maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_name
            .get(name)
            .cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_handle
            .len()
    }

    fn invalidate_caches(&self) {
        for class in self
            .maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_handle
            .values()
        {
            class.clear_cache();
        }
    }
}

// ============================================================================
// Bridge operations
// ============================================================================

impl Bridge {
    /// Defines a plain native class.
    ///
    /// The class inherits its superclass's [`ClassKind`], so a subclass of
    /// the built-in string class still holds strings.
    ///
    /// # Errors
    ///
    /// - [`Error::ClassAlreadyExists`] if the name is taken
    /// - [`Error::NotAClass`] / [`Error::InvalidHandle`] for a bad superclass
    /// - [`Error::ShutDown`] after [`Bridge::shutdown`]
    pub fn define_class(&self, name: &str, superclass: Option<Handle>) -> Result<Handle> {
        let superclass = superclass.map(|h| self.class(h)).transpose()?;
        let kind = superclass.as_ref().map_or(ClassKind::Plain, |s| s.kind());
        let class = self.install_class(ClassSpec {
            name: name.to_string(),
            superclass,
            kind,
            methods: Vec::new(),
            protocols: Vec::new(),
        })?;
        Ok(class.handle())
    }

    /// Adds a native method to a class, replacing any method with the same
    /// selector on that class.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAClass`] or [`Error::InvalidHandle`] for a bad
    /// class handle.
    pub fn add_method<F>(
        &self,
        class: Handle,
        selector: &str,
        signature: Signature,
        imp: F,
    ) -> Result<()>
    where
        F: Fn(&Bridge, Handle, &[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        let class = self.class(class)?;
        class.insert_method(Method::native(selector, signature, imp));
        self.shared.classes.invalidate_caches();
        Ok(())
    }

    /// Records that a class adopts `protocol`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAClass`] or [`Error::InvalidHandle`] for a bad
    /// class handle.
    pub fn add_protocol(&self, class: Handle, protocol: &str) -> Result<()> {
        let class = self.class(class)?;
        let mut protocols = class
            .protocols
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if !protocols.iter().any(|p| p == protocol) {
            protocols.push(protocol.to_string());
        }
        Ok(())
    }

    /// Returns whether instances of `class` conform to `protocol`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAClass`] or [`Error::InvalidHandle`] for a bad
    /// class handle.
    pub fn class_conforms_to(&self, class: Handle, protocol: &str) -> Result<bool> {
        Ok(self.class(class)?.conforms_to(protocol))
    }

    /// Returns the number of registered classes, built-ins included.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.shared.classes.len()
    }

    /// Resolves a class handle.
    pub(crate) fn class(&self, handle: Handle) -> Result<Arc<NativeClass>> {
        if handle.is_null() {
            return Err(Error::NullHandle);
        }
        if let Some(class) = self.shared.classes.get(handle) {
            return Ok(class);
        }
        if self.shared.heap.get(handle).is_some() {
            return Err(Error::NotAClass { handle });
        }
        Err(Error::InvalidHandle { handle })
    }

    pub(crate) fn class_named(&self, name: &str) -> Option<Arc<NativeClass>> {
        self.shared.classes.named(name)
    }

    /// Builds a class through the factory and registers it.
    pub(crate) fn install_class(&self, spec: ClassSpec) -> Result<Arc<NativeClass>> {
        self.ensure_running()?;
        let handle = self.shared.handles.next();
        let name = spec.name.clone();
        let class = Arc::new(self.shared.factory.build(handle, spec)?);
        self.shared.classes.insert(Arc::clone(&class))?;
        natbridge_log::debug!("registered class {name} as {handle}");
        Ok(class)
    }
}
