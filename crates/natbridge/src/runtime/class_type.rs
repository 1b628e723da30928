//! Class classification and construction metadata.
//!
//! Every native class that has a managed counterpart gets a
//! [`ClassDescriptor`] the first time the bridge needs it. The descriptor
//! records how the class relates to the managed world ([`ClassFlags`]) and how
//! to build managed counterparts of its instances. Descriptors are immutable
//! and first-insert-wins: registering again returns the stored descriptor.
//!
//! # Flags
//!
//! | Flag        | Bit   | Meaning                                             |
//! |-------------|-------|-----------------------------------------------------|
//! | `INHERITED` | `0x1` | generated for a managed subclass                    |
//! | `PROXY`     | `0x2` | generated to forward to an arbitrary managed object |
//! | `HYBRID`    | `0x4` | native class with a managed implementation          |
//! | `BINDING`   | `0x8` | native class mirrored by a managed binding type     |
//!
//! `HYBRID` and `INHERITED` are mutually exclusive. A proxy class may also
//! be inherited when its base is.

use crate::error::{Error, Result};
use crate::runtime::bridge::Bridge;
use crate::runtime::managed::{Constructor, ManagedType};
use crate::runtime::Handle;
use fxhash::FxHashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Classification bits of a native class.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ClassFlags(u8);

impl ClassFlags {
    /// No managed relationship.
    pub const NONE: ClassFlags = ClassFlags(0);
    /// Generated for a managed subclass.
    pub const INHERITED: ClassFlags = ClassFlags(0x1);
    /// Generated to forward to a managed object.
    pub const PROXY: ClassFlags = ClassFlags(0x2);
    /// Native class with a managed implementation.
    pub const HYBRID: ClassFlags = ClassFlags(0x4);
    /// Mirrored by a managed binding type.
    pub const BINDING: ClassFlags = ClassFlags(0x8);

    /// Validates raw flag bits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IncompatibleClassFlags`] for unknown bits or for
    /// `INHERITED | HYBRID`.
    pub fn new(bits: u8) -> Result<Self> {
        let both = Self::INHERITED.0 | Self::HYBRID.0;
        if bits & !0xf != 0 || bits & both == both {
            return Err(Error::IncompatibleClassFlags { flags: bits });
        }
        Ok(ClassFlags(bits))
    }

    /// Returns the raw bits.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: ClassFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns whether the class was generated for a managed subclass.
    #[must_use]
    pub const fn is_inherited(self) -> bool {
        self.contains(Self::INHERITED)
    }

    /// Returns whether the class is a generated proxy.
    #[must_use]
    pub const fn is_proxy(self) -> bool {
        self.contains(Self::PROXY)
    }

    /// Returns whether the class is hybrid.
    #[must_use]
    pub const fn is_hybrid(self) -> bool {
        self.0 & (Self::INHERITED.0 | Self::HYBRID.0) == Self::HYBRID.0
    }

    /// Returns whether the class is mirrored by a binding type.
    #[must_use]
    pub const fn is_binding(self) -> bool {
        self.contains(Self::BINDING)
    }
}

impl std::ops::BitOr for ClassFlags {
    type Output = ClassFlags;

    fn bitor(self, rhs: Self) -> Self {
        ClassFlags(self.0 | rhs.0)
    }
}

impl fmt::Debug for ClassFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = [
            (Self::INHERITED, "INHERITED"),
            (Self::PROXY, "PROXY"),
            (Self::HYBRID, "HYBRID"),
            (Self::BINDING, "BINDING"),
        ]
        .into_iter()
        .filter(|(flag, _)| self.contains(*flag))
        .map(|(_, name)| name)
        .collect();
        if names.is_empty() {
            f.write_str("ClassFlags(NONE)")
        } else {
            write!(f, "ClassFlags({})", names.join(" | "))
        }
    }
}

/// How to build the managed counterpart of a natively allocated instance.
#[derive(Clone)]
pub struct AllocInfo {
    /// Builds the managed object for a fresh peer.
    pub constructor: Constructor,
}

/// The auxiliary instance attached to every instance of an extended proxy
/// class.
#[derive(Clone)]
pub struct ExtensionInfo {
    /// The extension's managed type.
    pub extension_type: Arc<ManagedType>,
    /// Builds the extension instance for a fresh peer.
    pub constructor: Constructor,
}

/// Everything the bridge knows about a native class with a managed
/// counterpart.
#[derive(Clone)]
pub struct ClassDescriptor {
    class: Handle,
    flags: ClassFlags,
    alloc_info: Option<AllocInfo>,
    extension_info: Option<ExtensionInfo>,
    managed_type: Option<Arc<ManagedType>>,
}

impl ClassDescriptor {
    /// Creates a descriptor.
    #[must_use]
    pub fn new(class: Handle, flags: ClassFlags) -> Self {
        ClassDescriptor {
            class,
            flags,
            alloc_info: None,
            extension_info: None,
            managed_type: None,
        }
    }

    /// Sets the allocation info.
    #[must_use]
    pub fn with_alloc_info(mut self, info: AllocInfo) -> Self {
        self.alloc_info = Some(info);
        self
    }

    /// Sets the extension info.
    #[must_use]
    pub fn with_extension_info(mut self, info: ExtensionInfo) -> Self {
        self.extension_info = Some(info);
        self
    }

    /// Records the managed type the class was created for.
    #[must_use]
    pub fn with_managed_type(mut self, ty: &Arc<ManagedType>) -> Self {
        self.managed_type = Some(Arc::clone(ty));
        self
    }

    /// Returns the class handle.
    #[must_use]
    pub fn class(&self) -> Handle {
        self.class
    }

    /// Returns the flags.
    #[must_use]
    pub fn flags(&self) -> ClassFlags {
        self.flags
    }

    /// Returns the allocation info.
    #[must_use]
    pub fn alloc_info(&self) -> Option<&AllocInfo> {
        self.alloc_info.as_ref()
    }

    /// Returns the extension info.
    #[must_use]
    pub fn extension_info(&self) -> Option<&ExtensionInfo> {
        self.extension_info.as_ref()
    }

    /// Returns the managed type.
    #[must_use]
    pub fn managed_type(&self) -> Option<&Arc<ManagedType>> {
        self.managed_type.as_ref()
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("class", &self.class)
            .field("flags", &self.flags)
            .field("alloc_info", &self.alloc_info.is_some())
            .field(
                "extension",
                &self.extension_info.as_ref().map(|e| e.extension_type.name()),
            )
            .field("managed_type", &self.managed_type.as_ref().map(|t| t.name()))
            .finish()
    }
}

/// Descriptors of one bridge.
#[derive(Default)]
pub(crate) struct ClassTypeRegistry {
    descriptors: RwLock<FxHashMap<Handle, Arc<ClassDescriptor>>>,
}

impl ClassTypeRegistry {
    /// Stores `descriptor` unless one exists; returns the stored one.
    pub(crate) fn register(&self, descriptor: ClassDescriptor) -> Arc<ClassDescriptor> {
        if let Some(existing) = self.lookup(descriptor.class) {
            return existing;
        }
        let mut descriptors = self
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            descriptors
                .entry(descriptor.class)
                .or_insert_with(|| Arc::new(descriptor)),
        )
    }

    pub(crate) fn lookup(&self, class: Handle) -> Option<Arc<ClassDescriptor>> {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&class)
            .cloned()
    }
}

// ============================================================================
// Bridge operations
// ============================================================================

impl Bridge {
    /// Records construction metadata for `descriptor.class()`.
    ///
    /// Idempotent: if the class already has a descriptor, that descriptor is
    /// returned unchanged.
    ///
    /// # Errors
    ///
    /// - [`Error::IncompatibleClassFlags`] if the flags combine `INHERITED`
    ///   and `HYBRID` or carry unknown bits
    /// - [`Error::NotAClass`] or [`Error::InvalidHandle`] if the handle is
    ///   not a class
    pub fn register_construction_info(
        &self,
        descriptor: ClassDescriptor,
    ) -> Result<Arc<ClassDescriptor>> {
        ClassFlags::new(descriptor.flags().bits())?;
        self.class(descriptor.class())?;
        let stored = self.shared.class_types.register(descriptor);
        natbridge_log::trace!("class {} described as {:?}", stored.class(), stored.flags());
        Ok(stored)
    }

    /// Returns the descriptor of `class`, if it has one.
    #[must_use]
    pub fn class_descriptor(&self, class: Handle) -> Option<Arc<ClassDescriptor>> {
        self.shared.class_types.lookup(class)
    }

    /// Classifies a class.
    ///
    /// A described class yields its own flags. An undescribed subclass of a
    /// described class is treated as a binding; a purely native class yields
    /// no flags.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotAClass`] or [`Error::InvalidHandle`] if the handle
    /// is not a class.
    pub fn classify(&self, class: Handle) -> Result<ClassFlags> {
        let class = self.class(class)?;
        if let Some(desc) = self.class_descriptor(class.handle()) {
            return Ok(desc.flags());
        }
        let described_ancestor = class
            .ancestors()
            .skip(1)
            .any(|c| self.class_descriptor(c.handle()).is_some());
        Ok(if described_ancestor {
            ClassFlags::BINDING
        } else {
            ClassFlags::NONE
        })
    }

    /// Returns whether `class` was generated for a managed subclass.
    ///
    /// # Errors
    ///
    /// See [`Bridge::classify`].
    pub fn is_inherited_class(&self, class: Handle) -> Result<bool> {
        Ok(self.classify(class)?.is_inherited())
    }

    /// Returns whether `class` is a generated proxy class.
    ///
    /// # Errors
    ///
    /// See [`Bridge::classify`].
    pub fn is_proxy_class(&self, class: Handle) -> Result<bool> {
        Ok(self.classify(class)?.is_proxy())
    }

    /// Returns whether `class` is hybrid.
    ///
    /// # Errors
    ///
    /// See [`Bridge::classify`].
    pub fn is_hybrid_class(&self, class: Handle) -> Result<bool> {
        Ok(self.classify(class)?.is_hybrid())
    }

    /// Returns whether `class` is mirrored by a binding type.
    ///
    /// # Errors
    ///
    /// See [`Bridge::classify`].
    pub fn is_binding_class(&self, class: Handle) -> Result<bool> {
        Ok(self.classify(class)?.is_binding())
    }

    /// Returns the managed type recorded for a hybrid class.
    ///
    /// # Errors
    ///
    /// See [`Bridge::classify`].
    pub fn managed_type_for_hybrid_class(&self, class: Handle) -> Result<Option<Arc<ManagedType>>> {
        self.class(class)?;
        Ok(self
            .class_descriptor(class)
            .filter(|d| d.flags().is_hybrid())
            .and_then(|d| d.managed_type().cloned()))
    }
}
