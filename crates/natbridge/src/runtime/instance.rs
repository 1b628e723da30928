//! Allocation of native instances that have managed counterparts.
//!
//! An inherited class can be instantiated from either side:
//!
//! - **Managed-initiated**: managed code has already built the object and
//!   calls [`Bridge::construct_inherited`]. The object is parked as the
//!   thread's init target, the allocation adopts it, and the managed object
//!   owns the peer's initial retain.
//! - **Native-initiated**: native code calls [`Bridge::alloc_instance`]
//!   with no init target pending. The class's constructor builds the managed
//!   object, which the Binding association keeps alive for the peer's
//!   lifetime.
//!
//! An adopted managed object owns its peer. While native code holds extra
//! retains the Binding association is strong, so the managed object cannot
//! be collected while native code still uses it. Once only the managed
//! object's own retain is left the association turns weak again.

use crate::error::{Error, Result};
use crate::runtime::association::{AssociationCategory, InstanceContainer};
use crate::runtime::bridge::Bridge;
use crate::runtime::class::{ClassKind, NativeClass};
use crate::runtime::class_type::ClassDescriptor;
use crate::runtime::heap::Payload;
use crate::runtime::init_target::{take_init_target_if, InitTargetGuard};
use crate::runtime::managed::{ManagedObject, ManagedRef, ManagedType};
use crate::runtime::Handle;
use std::sync::Arc;

/// Returns whether `obj` is an instance of `ty` or of a managed subclass.
fn instance_of(obj: &ManagedObject, ty: &Arc<ManagedType>) -> bool {
    let mut current = Some(obj.managed_type());
    while let Some(t) = current {
        if Arc::ptr_eq(t, ty) {
            return true;
        }
        current = t.superclass();
    }
    false
}

fn inherited_descriptor(descriptor: Option<Arc<ClassDescriptor>>) -> Option<Arc<ClassDescriptor>> {
    descriptor.filter(|d| d.flags().is_inherited() && !d.flags().is_proxy())
}

impl Bridge {
    /// Allocates an instance of `class`. The caller owns the returned retain,
    /// except when a pending init target adopts the instance; then the
    /// retain belongs to the init target.
    ///
    /// Instances of inherited classes get a managed counterpart. Instances
    /// of hybrid classes with a constructor get their managed implementation
    /// in the Custom association.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingConstructor`] if an inherited class has no
    ///   constructor and no init target is pending
    /// - [`Error::IncompatibleBaseClass`] for block classes, whose instances
    ///   are made from closures
    /// - [`Error::ManagedException`] if the constructor throws
    /// - allocation errors
    pub fn alloc_instance(&self, class: Handle) -> Result<Handle> {
        let native = self.class(class)?;
        let payload = match native.kind() {
            ClassKind::Plain => Payload::None,
            ClassKind::String => Payload::String(String::new()),
            ClassKind::Block | ClassKind::StackBlock => {
                return Err(Error::IncompatibleBaseClass {
                    class: native.name().to_string(),
                    base: native.name().to_string(),
                    reason: "blocks are created from closures",
                });
            }
        };

        let descriptor = self.class_descriptor(class);
        if let Some(inherited) = inherited_descriptor(descriptor.clone()) {
            return self.alloc_inherited(&native, &inherited, payload);
        }

        let peer = self.alloc_object(&native, payload)?;
        let hybrid = descriptor.filter(|d| d.flags().is_hybrid());
        if let Some(info) = hybrid.as_ref().and_then(|d| d.alloc_info()) {
            let built = (info.constructor)(self, peer).map_err(Error::from).and_then(|obj| {
                self.set_association(
                    peer,
                    AssociationCategory::Custom,
                    Some(InstanceContainer::Strong(obj)),
                )
            });
            if let Err(err) = built {
                self.release(peer)?;
                return Err(err);
            }
        }
        Ok(peer)
    }

    fn alloc_inherited(
        &self,
        native: &Arc<NativeClass>,
        descriptor: &ClassDescriptor,
        payload: Payload,
    ) -> Result<Handle> {
        let ty = descriptor.managed_type();
        let target = take_init_target_if(|t| {
            t.peer().is_null() && ty.is_some_and(|ty| instance_of(t, ty))
        });

        if let Some(target) = target {
            let peer = self.alloc_object(native, payload)?;
            if let Err(err) = self.adopt(peer, &target) {
                self.release(peer)?;
                return Err(err);
            }
            natbridge_log::trace!("{peer} adopted managed {}", target.managed_type().name());
            return Ok(peer);
        }

        let Some(info) = descriptor.alloc_info() else {
            return Err(Error::MissingConstructor {
                name: ty.map_or_else(|| native.name().to_string(), |t| t.name().to_string()),
            });
        };

        let peer = self.alloc_object(native, payload)?;
        let built = (info.constructor)(self, peer).map_err(Error::from).and_then(|obj| {
            self.set_association(
                peer,
                AssociationCategory::Binding,
                Some(InstanceContainer::Strong(obj)),
            )
        });
        if let Err(err) = built {
            self.release(peer)?;
            return Err(err);
        }
        Ok(peer)
    }

    /// Builds the native half of `managed`, an instance of an inherited
    /// class's managed type.
    ///
    /// `managed` is parked as the thread's init target for the duration of
    /// the allocation only. On success it owns the returned peer's retain
    /// and is released with it.
    ///
    /// # Errors
    ///
    /// - [`Error::InitTargetAlreadySet`] if another construction is in
    ///   flight on this thread
    /// - [`Error::IncompatibleBaseClass`] if `class` is not inherited or
    ///   `managed` is not an instance of its type
    /// - allocation errors
    pub fn construct_inherited(&self, class: Handle, managed: &ManagedRef) -> Result<Handle> {
        let native = self.class(class)?;
        let fits = inherited_descriptor(self.class_descriptor(class))
            .and_then(|d| d.managed_type().cloned())
            .is_some_and(|ty| instance_of(managed, &ty));
        if !fits || !managed.peer().is_null() {
            return Err(Error::IncompatibleBaseClass {
                class: managed.managed_type().name().to_string(),
                base: native.name().to_string(),
                reason: "the managed object is not an unbound instance of the class's type",
            });
        }

        let _guard = InitTargetGuard::set(managed)?;
        self.alloc_instance(class)
    }

    /// Gives `managed` ownership of one retain on `peer` and binds it weakly.
    pub(crate) fn adopt(&self, peer: Handle, managed: &ManagedRef) -> Result<()> {
        self.set_association(
            peer,
            AssociationCategory::Binding,
            Some(InstanceContainer::Weak(Arc::downgrade(managed))),
        )?;
        managed.take_ownership();
        self.sync_binding(peer);
        Ok(())
    }

    /// Returns the managed object bound to `object`, wrapping it in a new
    /// instance of `ty` if it has none.
    ///
    /// A new wrapper retains `object` and releases it when collected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullHandle`] or [`Error::InvalidHandle`] if `object`
    /// is not a live object.
    pub fn wrap_native(&self, object: Handle, ty: &Arc<ManagedType>) -> Result<ManagedRef> {
        self.object(object)?;
        if let Some(existing) = self.binding(object)? {
            return Ok(existing);
        }

        let wrapper = ManagedObject::stateless(ty);
        self.retain(object)?;
        if let Err(err) = self.adopt(object, &wrapper) {
            self.release(object)?;
            return Err(err);
        }
        Ok(wrapper)
    }
}
