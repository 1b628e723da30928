//! The managed side of the bridge.
//!
//! Managed objects live in a garbage-collected world. Here that world is
//! modelled with `Arc`: a [`ManagedRef`] is a strong handle, and an object
//! "becomes collectible" when the last one is dropped. Managed methods are
//! closures; a thrown exception is an `Err(ManagedException)`.
//!
//! # Dual ownership
//!
//! A managed object and its native peer can own each other in one of two
//! directions:
//!
//! - **Native owns managed**: proxy instances and natively allocated
//!   instances of inherited classes. The peer's Binding association holds the
//!   managed object strongly; the managed object only records the peer handle.
//!   When the peer's refcount reaches zero the association is dropped and the
//!   managed object becomes collectible.
//! - **Managed owns native**: wrappers created from managed code. The managed
//!   object holds one retain on the peer ([`PeerLink`] is marked owned) and
//!   releases it when dropped. The Binding association is weak while the
//!   managed retain is the only one, and strong while native code also holds
//!   the peer, so neither side keeps the other alive on its own.
//!
//! The `owned` flag in [`PeerLink`] is the single atomic that decides which
//! side performs teardown: whoever clears it first.

use crate::runtime::bridge::{Bridge, Shared};
use crate::runtime::encoding::{Kind, Signature};
use crate::runtime::Handle;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// A strong reference to a managed object.
pub type ManagedRef = Arc<ManagedObject>;

/// The outcome of a managed method.
pub type ManagedResult = std::result::Result<ManagedValue, ManagedException>;

/// A managed method body.
pub type MethodBody = Arc<dyn Fn(&ManagedCall<'_>) -> ManagedResult + Send + Sync>;

/// Builds the managed counterpart of a freshly allocated native peer.
pub type Constructor = Arc<
    dyn Fn(&Bridge, Handle) -> std::result::Result<ManagedRef, ManagedException>
        + Send
        + Sync,
>;

static NEXT_METHOD_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_TYPE_ID: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// Exceptions
// ============================================================================

/// An exception thrown by managed code.
///
/// The stack trace is produced by the managed runtime and carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedException {
    class_name: String,
    message: String,
    stack_trace: Vec<String>,
}

impl ManagedException {
    /// Creates an exception with an empty stack trace.
    pub fn new(class_name: impl Into<String>, message: impl Into<String>) -> Self {
        ManagedException {
            class_name: class_name.into(),
            message: message.into(),
            stack_trace: Vec::new(),
        }
    }

    /// Appends a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack_trace.push(frame.into());
        self
    }

    /// Returns the exception class name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the stack frames, innermost first.
    #[must_use]
    pub fn stack_trace(&self) -> &[String] {
        &self.stack_trace
    }

    /// Renders the exception and its stack trace.
    #[must_use]
    pub fn full_trace(&self) -> String {
        let mut out = self.to_string();
        for frame in &self.stack_trace {
            out.push_str("\n\tat ");
            out.push_str(frame);
        }
        out
    }
}

impl fmt::Display for ManagedException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class_name, self.message)
    }
}

impl std::error::Error for ManagedException {}

// ============================================================================
// Values
// ============================================================================

/// A value on the managed side of the bridge.
#[derive(Clone)]
pub enum ManagedValue {
    /// No value.
    Void,
    /// `boolean`
    Bool(bool),
    /// `byte`
    Byte(i8),
    /// `char`
    Char(u16),
    /// `short`
    Short(i16),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// A managed reference, or null.
    Object(Option<ManagedRef>),
    /// A native object with no managed counterpart yet.
    Native(Handle),
}

impl ManagedValue {
    /// Returns the kind of this value. `Native` is an object.
    #[must_use]
    pub fn kind(&self) -> Kind {
        match self {
            ManagedValue::Void => Kind::Void,
            ManagedValue::Bool(_) => Kind::Bool,
            ManagedValue::Byte(_) => Kind::Byte,
            ManagedValue::Char(_) => Kind::Char,
            ManagedValue::Short(_) => Kind::Short,
            ManagedValue::Int(_) => Kind::Int,
            ManagedValue::Long(_) => Kind::Long,
            ManagedValue::Float(_) => Kind::Float,
            ManagedValue::Double(_) => Kind::Double,
            ManagedValue::Object(_) | ManagedValue::Native(_) => Kind::Object,
        }
    }

    /// Returns the `boolean`, if this is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ManagedValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the `int`, if this is one.
    #[must_use]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            ManagedValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the `long`, if this is one.
    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            ManagedValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the `double`, if this is one.
    #[must_use]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            ManagedValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the managed reference, if this is a non-null managed object.
    #[must_use]
    pub fn as_object(&self) -> Option<&ManagedRef> {
        match self {
            ManagedValue::Object(Some(obj)) => Some(obj),
            _ => None,
        }
    }

    /// Returns whether this is a null object reference.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, ManagedValue::Object(None))
            || matches!(self, ManagedValue::Native(h) if h.is_null())
    }
}

impl fmt::Debug for ManagedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagedValue::Void => f.write_str("Void"),
            ManagedValue::Bool(v) => write!(f, "Bool({v})"),
            ManagedValue::Byte(v) => write!(f, "Byte({v})"),
            ManagedValue::Char(v) => write!(f, "Char({v})"),
            ManagedValue::Short(v) => write!(f, "Short({v})"),
            ManagedValue::Int(v) => write!(f, "Int({v})"),
            ManagedValue::Long(v) => write!(f, "Long({v})"),
            ManagedValue::Float(v) => write!(f, "Float({v})"),
            ManagedValue::Double(v) => write!(f, "Double({v})"),
            ManagedValue::Object(None) => f.write_str("Object(null)"),
            ManagedValue::Object(Some(obj)) => {
                write!(f, "Object({})", obj.managed_type().name())
            }
            ManagedValue::Native(h) => write!(f, "Native({h})"),
        }
    }
}

impl From<bool> for ManagedValue {
    fn from(v: bool) -> Self {
        ManagedValue::Bool(v)
    }
}

impl From<i32> for ManagedValue {
    fn from(v: i32) -> Self {
        ManagedValue::Int(v)
    }
}

impl From<i64> for ManagedValue {
    fn from(v: i64) -> Self {
        ManagedValue::Long(v)
    }
}

impl From<f64> for ManagedValue {
    fn from(v: f64) -> Self {
        ManagedValue::Double(v)
    }
}

impl From<ManagedRef> for ManagedValue {
    fn from(v: ManagedRef) -> Self {
        ManagedValue::Object(Some(v))
    }
}

// ============================================================================
// Methods
// ============================================================================

/// A managed method, optionally exposed to native code under a selector.
pub struct ManagedMethod {
    id: u64,
    name: String,
    selector: Option<String>,
    signature: Signature,
    body: MethodBody,
}

impl ManagedMethod {
    /// Creates a method that native code cannot see until it is given a
    /// selector.
    pub fn new<F>(name: impl Into<String>, signature: Signature, body: F) -> Self
    where
        F: Fn(&ManagedCall<'_>) -> ManagedResult + Send + Sync + 'static,
    {
        ManagedMethod {
            id: NEXT_METHOD_ID.fetch_add(1, Ordering::Relaxed),
            name: name.into(),
            selector: None,
            signature,
            body: Arc::new(body),
        }
    }

    /// Exposes the method to native code under `selector`.
    #[must_use]
    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    /// Process-unique identity, used to memoize callback descriptors.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the managed method name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the native selector, if exposed.
    #[must_use]
    pub fn selector(&self) -> Option<&str> {
        self.selector.as_deref()
    }

    /// Returns the signature.
    #[must_use]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Runs the method body.
    ///
    /// # Errors
    ///
    /// Returns whatever exception the body throws.
    pub fn invoke(&self, call: &ManagedCall<'_>) -> ManagedResult {
        (self.body)(call)
    }
}

impl fmt::Debug for ManagedMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedMethod")
            .field("name", &self.name)
            .field("selector", &self.selector)
            .field("signature", &self.signature.to_string())
            .finish()
    }
}

/// The context a managed method body runs in.
pub struct ManagedCall<'a> {
    bridge: &'a Bridge,
    receiver: Option<&'a ManagedRef>,
    peer: Handle,
    args: &'a [ManagedValue],
}

impl<'a> ManagedCall<'a> {
    /// Creates a call context.
    #[must_use]
    pub fn new(
        bridge: &'a Bridge,
        receiver: Option<&'a ManagedRef>,
        peer: Handle,
        args: &'a [ManagedValue],
    ) -> Self {
        ManagedCall {
            bridge,
            receiver,
            peer,
            args,
        }
    }

    /// The bridge the call came through.
    #[must_use]
    pub fn bridge(&self) -> &'a Bridge {
        self.bridge
    }

    /// The managed receiver (`this`), if the call has one.
    #[must_use]
    pub fn receiver(&self) -> Option<&'a ManagedRef> {
        self.receiver
    }

    /// The native peer the message arrived on.
    #[must_use]
    pub fn peer(&self) -> Handle {
        self.peer
    }

    /// All arguments.
    #[must_use]
    pub fn args(&self) -> &'a [ManagedValue] {
        self.args
    }

    /// One argument, or `Void` when out of range.
    #[must_use]
    pub fn arg(&self, index: usize) -> &'a ManagedValue {
        const VOID: &ManagedValue = &ManagedValue::Void;
        self.args.get(index).unwrap_or(VOID)
    }

    /// The receiver's state, downcast to `T`.
    #[must_use]
    pub fn receiver_state<T: Any>(&self) -> Option<&'a T> {
        self.receiver.and_then(|r| r.state::<T>())
    }
}

// ============================================================================
// Types
// ============================================================================

/// How a managed type relates to the native runtime.
#[derive(Clone)]
pub enum TypeShape {
    /// An ordinary managed class with no native class of its own.
    Plain,
    /// A managed interface, mirrored as a native protocol.
    Interface,
    /// Mirrors an existing native class.
    Binding {
        /// Name of the native class.
        native_class: String,
    },
    /// A managed subclass of a binding or inherited type; a native class is
    /// generated for it.
    Subclass {
        /// The managed superclass.
        superclass: Arc<ManagedType>,
    },
    /// An existing native class that also has a managed implementation.
    Hybrid {
        /// Name of the native class.
        native_class: String,
    },
}

/// A managed class or interface.
pub struct ManagedType {
    id: u64,
    name: String,
    shape: TypeShape,
    interfaces: Vec<Arc<ManagedType>>,
    methods: Vec<Arc<ManagedMethod>>,
    constructor: Option<Constructor>,
}

impl ManagedType {
    /// Starts building a plain managed type.
    pub fn builder(name: impl Into<String>) -> ManagedTypeBuilder {
        ManagedTypeBuilder {
            name: name.into(),
            shape: TypeShape::Plain,
            interfaces: Vec::new(),
            methods: Vec::new(),
            constructor: None,
        }
    }

    /// Process-unique identity. Two types built with the same name are
    /// still distinct.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the fully qualified type name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the shape of the type.
    #[must_use]
    pub fn shape(&self) -> &TypeShape {
        &self.shape
    }

    /// Returns whether this is an interface.
    #[must_use]
    pub fn is_interface(&self) -> bool {
        matches!(self.shape, TypeShape::Interface)
    }

    /// Returns the managed superclass of a `Subclass` type.
    #[must_use]
    pub fn superclass(&self) -> Option<&Arc<ManagedType>> {
        match &self.shape {
            TypeShape::Subclass { superclass } => Some(superclass),
            _ => None,
        }
    }

    /// Returns the directly implemented interfaces.
    #[must_use]
    pub fn interfaces(&self) -> &[Arc<ManagedType>] {
        &self.interfaces
    }

    /// Returns the methods declared on this type itself.
    #[must_use]
    pub fn methods(&self) -> &[Arc<ManagedMethod>] {
        &self.methods
    }

    /// Returns the constructor, if the type has one.
    #[must_use]
    pub fn constructor(&self) -> Option<&Constructor> {
        self.constructor.as_ref()
    }

    /// Finds a method by managed name: own methods, then the superclass
    /// chain, then interfaces.
    #[must_use]
    pub fn find_method(&self, name: &str) -> Option<Arc<ManagedMethod>> {
        if let Some(m) = self.methods.iter().find(|m| m.name() == name) {
            return Some(Arc::clone(m));
        }
        if let Some(sup) = self.superclass()
            && let Some(m) = sup.find_method(name)
        {
            return Some(m);
        }
        self.interfaces.iter().find_map(|i| i.find_method(name))
    }

    /// Returns every method visible to native code, most derived first.
    ///
    /// A selector appears once; a type's own method shadows the same selector
    /// declared by a superclass or interface.
    #[must_use]
    pub fn selector_methods(&self) -> Vec<Arc<ManagedMethod>> {
        let mut out: Vec<Arc<ManagedMethod>> = Vec::new();
        self.collect_selector_methods(&mut out);
        out
    }

    fn collect_selector_methods(&self, out: &mut Vec<Arc<ManagedMethod>>) {
        for m in &self.methods {
            if let Some(sel) = m.selector()
                && !out.iter().any(|o| o.selector() == Some(sel))
            {
                out.push(Arc::clone(m));
            }
        }
        if let Some(sup) = self.superclass() {
            sup.collect_selector_methods(out);
        }
        for iface in &self.interfaces {
            iface.collect_selector_methods(out);
        }
    }

    /// Returns the names of all interfaces this type conforms to, transitively.
    #[must_use]
    pub fn all_interface_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        let mut pending: Vec<&ManagedType> = vec![self];
        while let Some(ty) = pending.pop() {
            for iface in &ty.interfaces {
                if !out.iter().any(|n: &String| n == iface.name()) {
                    out.push(iface.name().to_string());
                }
                pending.push(iface);
            }
            if let Some(sup) = ty.superclass() {
                pending.push(sup);
            }
        }
        out
    }
}

impl fmt::Debug for ManagedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shape = match &self.shape {
            TypeShape::Plain => "plain".to_string(),
            TypeShape::Interface => "interface".to_string(),
            TypeShape::Binding { native_class } => format!("binding({native_class})"),
            TypeShape::Subclass { superclass } => format!("subclass({})", superclass.name()),
            TypeShape::Hybrid { native_class } => format!("hybrid({native_class})"),
        };
        f.debug_struct("ManagedType")
            .field("name", &self.name)
            .field("shape", &shape)
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// Builder for [`ManagedType`].
pub struct ManagedTypeBuilder {
    name: String,
    shape: TypeShape,
    interfaces: Vec<Arc<ManagedType>>,
    methods: Vec<Arc<ManagedMethod>>,
    constructor: Option<Constructor>,
}

impl ManagedTypeBuilder {
    /// Makes the type an interface.
    #[must_use]
    pub fn interface(mut self) -> Self {
        self.shape = TypeShape::Interface;
        self
    }

    /// Makes the type a binding for an existing native class.
    #[must_use]
    pub fn binding(mut self, native_class: impl Into<String>) -> Self {
        self.shape = TypeShape::Binding {
            native_class: native_class.into(),
        };
        self
    }

    /// Makes the type a managed subclass of `superclass`.
    #[must_use]
    pub fn subclass_of(mut self, superclass: &Arc<ManagedType>) -> Self {
        self.shape = TypeShape::Subclass {
            superclass: Arc::clone(superclass),
        };
        self
    }

    /// Makes the type the managed half of a hybrid native class.
    #[must_use]
    pub fn hybrid(mut self, native_class: impl Into<String>) -> Self {
        self.shape = TypeShape::Hybrid {
            native_class: native_class.into(),
        };
        self
    }

    /// Adds an implemented interface.
    #[must_use]
    pub fn implements(mut self, interface: &Arc<ManagedType>) -> Self {
        self.interfaces.push(Arc::clone(interface));
        self
    }

    /// Adds a method.
    #[must_use]
    pub fn method(mut self, method: ManagedMethod) -> Self {
        self.methods.push(Arc::new(method));
        self
    }

    /// Sets the constructor used when native code allocates an instance.
    #[must_use]
    pub fn constructor<F>(mut self, constructor: F) -> Self
    where
        F: Fn(&Bridge, Handle) -> std::result::Result<ManagedRef, ManagedException>
            + Send
            + Sync
            + 'static,
    {
        self.constructor = Some(Arc::new(constructor));
        self
    }

    /// Finishes the type.
    #[must_use]
    pub fn build(self) -> Arc<ManagedType> {
        Arc::new(ManagedType {
            id: NEXT_TYPE_ID.fetch_add(1, Ordering::Relaxed),
            name: self.name,
            shape: self.shape,
            interfaces: self.interfaces,
            methods: self.methods,
            constructor: self.constructor,
        })
    }
}

// ============================================================================
// Objects
// ============================================================================

/// The managed object's view of its native peer.
pub(crate) struct PeerLink {
    handle: AtomicU64,
    owned: AtomicBool,
    bridge: Mutex<Weak<Shared>>,
}

impl PeerLink {
    fn new() -> Self {
        PeerLink {
            handle: AtomicU64::new(0),
            owned: AtomicBool::new(false),
            bridge: Mutex::new(Weak::new()),
        }
    }
}

/// An instance in the managed runtime.
pub struct ManagedObject {
    ty: Arc<ManagedType>,
    state: Box<dyn Any + Send + Sync>,
    peer: PeerLink,
}

impl ManagedObject {
    /// Creates an instance carrying `state`.
    pub fn new<T: Any + Send + Sync>(ty: &Arc<ManagedType>, state: T) -> ManagedRef {
        Arc::new(ManagedObject {
            ty: Arc::clone(ty),
            state: Box::new(state),
            peer: PeerLink::new(),
        })
    }

    /// Creates an instance with no state.
    pub fn stateless(ty: &Arc<ManagedType>) -> ManagedRef {
        Self::new(ty, ())
    }

    /// Returns the instance's type.
    #[must_use]
    pub fn managed_type(&self) -> &Arc<ManagedType> {
        &self.ty
    }

    /// Returns the state, downcast to `T`.
    #[must_use]
    pub fn state<T: Any>(&self) -> Option<&T> {
        self.state.downcast_ref::<T>()
    }

    /// Returns the native peer, or null if the object has none.
    #[must_use]
    pub fn peer(&self) -> Handle {
        Handle::from_raw(self.peer.handle.load(Ordering::Acquire))
    }

    /// Returns whether this object holds a retain on its peer.
    #[must_use]
    pub fn owns_peer(&self) -> bool {
        self.peer.owned.load(Ordering::Acquire)
    }

    /// Records `handle` as this object's peer if it has none yet.
    pub(crate) fn bind_peer(&self, shared: &Arc<Shared>, handle: Handle) -> bool {
        let bound = self
            .peer
            .handle
            .compare_exchange(0, handle.as_raw(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if bound {
            *self
                .peer
                .bridge
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Arc::downgrade(shared);
        }
        bound
    }

    /// Marks the peer retain as held by this object. Returns `false` if it
    /// already was.
    pub(crate) fn take_ownership(&self) -> bool {
        !self.peer.owned.swap(true, Ordering::AcqRel)
    }

    /// Forgets `handle` after native teardown.
    ///
    /// Returns `true` if this object still believed it owned a retain on the
    /// peer, which means the peer was over-released somewhere.
    pub(crate) fn sever_peer(&self, handle: Handle) -> bool {
        if self
            .peer
            .handle
            .compare_exchange(handle.as_raw(), 0, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.peer.owned.swap(false, Ordering::AcqRel)
    }
}

impl Drop for ManagedObject {
    fn drop(&mut self) {
        if !self.peer.owned.swap(false, Ordering::AcqRel) {
            return;
        }

        let handle = self.peer();
        let shared = self
            .peer
            .bridge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .upgrade();

        if let Some(shared) = shared {
            let bridge = Bridge::from_shared(shared);
            if let Err(err) = bridge.release(handle) {
                natbridge_log::warn!(
                    "collected {} could not release peer {handle}: {err}",
                    self.ty.name()
                );
            }
        }
    }
}

impl fmt::Debug for ManagedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedObject")
            .field("type", &self.ty.name())
            .field("peer", &self.peer())
            .field("owns_peer", &self.owns_peer())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_method(name: &str) -> ManagedMethod {
        ManagedMethod::new(name, Signature::parse("i@:").unwrap(), |_| {
            Ok(ManagedValue::Int(1))
        })
    }

    #[test]
    fn test_exception_trace_rendering() {
        let exc = ManagedException::new("java.lang.IllegalStateException", "boom")
            .with_frame("Widget.spin(Widget.java:10)")
            .with_frame("Main.main(Main.java:3)");

        assert_eq!(exc.to_string(), "java.lang.IllegalStateException: boom");
        assert_eq!(
            exc.full_trace(),
            "java.lang.IllegalStateException: boom\n\tat Widget.spin(Widget.java:10)\n\tat Main.main(Main.java:3)"
        );
    }

    #[test]
    fn test_method_ids_are_unique() {
        let a = int_method("a");
        let b = int_method("a");
        assert_ne!(a.id(), b.id());

        let first = ManagedType::builder("Same").build();
        let second = ManagedType::builder("Same").build();
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_find_method_walks_superclass_and_interfaces() {
        let iface = ManagedType::builder("Runnable")
            .interface()
            .method(int_method("run").with_selector("run"))
            .build();
        let base = ManagedType::builder("Base")
            .binding("BridgeObject")
            .method(int_method("size").with_selector("size"))
            .build();
        let derived = ManagedType::builder("Derived")
            .subclass_of(&base)
            .implements(&iface)
            .method(int_method("size").with_selector("size"))
            .build();

        assert!(derived.find_method("run").is_some());
        assert!(derived.find_method("missing").is_none());

        let methods = derived.selector_methods();
        assert_eq!(methods.len(), 2);
        assert!(Arc::ptr_eq(&methods[0], &derived.methods()[0]));
        assert_eq!(derived.all_interface_names(), vec!["Runnable".to_string()]);
    }

    #[test]
    fn test_object_state_and_peer_defaults() {
        let ty = ManagedType::builder("Counter").build();
        let obj = ManagedObject::new(&ty, 41u32);

        assert_eq!(obj.state::<u32>(), Some(&41));
        assert!(obj.state::<String>().is_none());
        assert!(obj.peer().is_null());
        assert!(!obj.owns_peer());
    }

    #[test]
    fn test_value_kinds() {
        assert_eq!(ManagedValue::Native(Handle::NULL).kind(), Kind::Object);
        assert!(ManagedValue::Object(None).is_null());
        assert_eq!(ManagedValue::from(3).as_int(), Some(3));
        assert_eq!(ManagedValue::from(2.5).as_double(), Some(2.5));
    }
}
