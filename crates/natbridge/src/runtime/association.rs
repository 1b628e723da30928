//! Links from native objects to managed objects.
//!
//! Every native object has three independent association slots:
//!
//! - **Binding**: the canonical managed counterpart. Identity queries and
//!   argument marshaling use this slot.
//! - **Custom**: a non-binding managed object serving the peer, such as a
//!   proxy extension instance.
//! - **Block**: the managed instance a closure was created from.
//!
//! Objects may also carry any number of auxiliary managed objects that live
//! exactly as long as the peer.
//!
//! # Replacement
//!
//! Replacing a slot hands the previous container back to the caller, which
//! drops it after the table lock is released. A managed finalizer that
//! re-enters the bridge therefore never deadlocks on this table.
//!
//! # Binding strength
//!
//! A managed wrapper that owns its peer (holds a retain on it) is stored in a
//! weak container while that retain is the only one, and promoted to a strong
//! container as soon as native code retains the peer too. The wrapper is
//! then kept alive for as long as native code holds the peer, and collected
//! once only its own retain remains.

use crate::error::Result;
use crate::runtime::bridge::Bridge;
use crate::runtime::managed::{ManagedObject, ManagedRef};
use crate::runtime::Handle;
use fxhash::FxHashMap;
use std::mem;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// One association slot's value.
#[derive(Clone)]
pub enum InstanceContainer {
    /// Keeps the managed object alive.
    Strong(ManagedRef),
    /// Observes the managed object without keeping it alive.
    Weak(Weak<ManagedObject>),
}

impl InstanceContainer {
    /// Returns the managed object, if it is still alive.
    #[must_use]
    pub fn get(&self) -> Option<ManagedRef> {
        match self {
            InstanceContainer::Strong(obj) => Some(Arc::clone(obj)),
            InstanceContainer::Weak(weak) => weak.upgrade(),
        }
    }

    /// Returns whether this container keeps its object alive.
    #[must_use]
    pub fn is_strong(&self) -> bool {
        matches!(self, InstanceContainer::Strong(_))
    }

    fn refers_to(&self, obj: &ManagedRef) -> bool {
        match self {
            InstanceContainer::Strong(held) => Arc::ptr_eq(held, obj),
            InstanceContainer::Weak(weak) => std::ptr::eq(weak.as_ptr(), Arc::as_ptr(obj)),
        }
    }
}

impl From<ManagedRef> for InstanceContainer {
    fn from(obj: ManagedRef) -> Self {
        InstanceContainer::Strong(obj)
    }
}

/// The association categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssociationCategory {
    /// Canonical managed counterpart.
    Binding,
    /// Non-binding managed object.
    Custom,
    /// Originating managed instance of a closure.
    Block,
}

/// Everything associated with one native object.
#[derive(Default)]
pub(crate) struct ObjectAssociations {
    binding: Option<InstanceContainer>,
    custom: Option<InstanceContainer>,
    block: Option<InstanceContainer>,
    auxiliary: Vec<ManagedRef>,
}

impl ObjectAssociations {
    fn slot(&mut self, category: AssociationCategory) -> &mut Option<InstanceContainer> {
        match category {
            AssociationCategory::Binding => &mut self.binding,
            AssociationCategory::Custom => &mut self.custom,
            AssociationCategory::Block => &mut self.block,
        }
    }

    fn is_empty(&self) -> bool {
        self.binding.is_none()
            && self.custom.is_none()
            && self.block.is_none()
            && self.auxiliary.is_empty()
    }

    /// Returns every managed object still reachable from these slots.
    pub(crate) fn managed_objects(&self) -> Vec<ManagedRef> {
        [&self.binding, &self.custom, &self.block]
            .into_iter()
            .flatten()
            .filter_map(InstanceContainer::get)
            .chain(self.auxiliary.iter().cloned())
            .collect()
    }

    /// Drops the slots in teardown order.
    pub(crate) fn clear(mut self) {
        drop(mem::take(&mut self.auxiliary));
        drop(self.custom.take());
        drop(self.block.take());
        drop(self.binding.take());
    }
}

/// Associations of every object in one bridge.
#[derive(Default)]
pub(crate) struct AssociationTable {
    entries: Mutex<FxHashMap<Handle, ObjectAssociations>>,
}

impl AssociationTable {
    fn lock(&self) -> std::sync::MutexGuard<'_, FxHashMap<Handle, ObjectAssociations>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces one slot. Returns the previous container for the caller to drop.
    pub(crate) fn set(
        &self,
        handle: Handle,
        category: AssociationCategory,
        container: Option<InstanceContainer>,
    ) -> Option<InstanceContainer> {
        let mut entries = self.lock();
        let assoc = entries.entry(handle).or_default();
        let old = mem::replace(assoc.slot(category), container);
        if assoc.is_empty() {
            entries.remove(&handle);
        }
        old
    }

    pub(crate) fn get(&self, handle: Handle, category: AssociationCategory) -> Option<ManagedRef> {
        let mut entries = self.lock();
        entries
            .get_mut(&handle)
            .and_then(|assoc| assoc.slot(category).as_ref())
            .and_then(InstanceContainer::get)
    }

    pub(crate) fn container(
        &self,
        handle: Handle,
        category: AssociationCategory,
    ) -> Option<InstanceContainer> {
        let mut entries = self.lock();
        entries
            .get_mut(&handle)
            .and_then(|assoc| assoc.slot(category).clone())
    }

    pub(crate) fn associate(&self, handle: Handle, obj: ManagedRef) {
        self.lock().entry(handle).or_default().auxiliary.push(obj);
    }

    /// Removes one auxiliary attachment of `obj`. Returns it for the caller
    /// to drop.
    pub(crate) fn dissociate(&self, handle: Handle, obj: &ManagedRef) -> Option<ManagedRef> {
        let mut entries = self.lock();
        let assoc = entries.get_mut(&handle)?;
        let index = assoc.auxiliary.iter().position(|a| Arc::ptr_eq(a, obj))?;
        let removed = assoc.auxiliary.remove(index);
        if assoc.is_empty() {
            entries.remove(&handle);
        }
        Some(removed)
    }

    pub(crate) fn take_all(&self, handle: Handle) -> Option<ObjectAssociations> {
        self.lock().remove(&handle)
    }

    pub(crate) fn take_everything(&self) -> Vec<ObjectAssociations> {
        mem::take(&mut *self.lock()).into_values().collect()
    }

    /// Promotes or demotes the Binding container of a peer owned by its
    /// managed wrapper. `refcount` is read under the table lock.
    ///
    /// Returns the references the caller must drop once the lock is gone:
    /// a demoted strong container and the reference taken here to inspect it.
    pub(crate) fn sync_binding_strength(
        &self,
        handle: Handle,
        refcount: impl FnOnce() -> u32,
    ) -> (Option<InstanceContainer>, Option<ManagedRef>) {
        let mut entries = self.lock();
        let Some(slot) = entries.get_mut(&handle).map(|assoc| &mut assoc.binding) else {
            return (None, None);
        };
        let Some(obj) = slot.as_ref().and_then(InstanceContainer::get) else {
            return (None, None);
        };
        if !obj.owns_peer() || obj.peer() != handle {
            return (None, Some(obj));
        }

        let shared_with_native = refcount() > 1;
        let is_strong = slot.as_ref().is_some_and(InstanceContainer::is_strong);
        let demoted = if shared_with_native && !is_strong {
            slot.replace(InstanceContainer::Strong(Arc::clone(&obj)))
        } else if !shared_with_native && is_strong {
            slot.replace(InstanceContainer::Weak(Arc::downgrade(&obj)))
        } else {
            None
        };
        (demoted, Some(obj))
    }
}

// ============================================================================
// Bridge operations
// ============================================================================

impl Bridge {
    /// Replaces an association slot of `object`.
    ///
    /// The previous occupant is released exactly once, after the table lock
    /// is dropped. `None` clears the slot. A managed object placed in the
    /// Binding slot records `object` as its peer if it has none yet; one
    /// displaced from it forgets `object` unless it owns a retain on it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullHandle`](crate::Error::NullHandle) or
    /// [`Error::InvalidHandle`](crate::Error::InvalidHandle) if `object` is
    /// not a live object.
    pub fn set_association(
        &self,
        object: Handle,
        category: AssociationCategory,
        container: Option<InstanceContainer>,
    ) -> Result<()> {
        self.object(object)?;
        if category != AssociationCategory::Binding {
            let old = self.shared.associations.set(object, category, container);
            drop(old);
            return Ok(());
        }

        let incoming = container.as_ref().and_then(InstanceContainer::get);
        if let Some(obj) = &incoming {
            obj.bind_peer(&self.shared, object);
        }

        let old = self.shared.associations.set(object, category, container);
        let displaced = old
            .as_ref()
            .and_then(InstanceContainer::get)
            .filter(|prev| incoming.as_ref().is_none_or(|new| !Arc::ptr_eq(prev, new)));
        // An owner keeps its link: its retain still holds `object` alive.
        if let Some(prev) = &displaced
            && !prev.owns_peer()
        {
            prev.sever_peer(object);
        }
        drop(displaced);
        drop(incoming);
        drop(old);

        self.sync_binding(object);
        Ok(())
    }

    /// Returns the managed object in an association slot.
    ///
    /// An empty slot, a collected weak occupant and the null handle all
    /// yield `None`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`](crate::Error::InvalidHandle) for an
    /// unknown non-null handle.
    pub fn association(
        &self,
        object: Handle,
        category: AssociationCategory,
    ) -> Result<Option<ManagedRef>> {
        if object.is_null() {
            return Ok(None);
        }
        if self.shared.heap.get(object).is_none() {
            return Err(crate::Error::InvalidHandle { handle: object });
        }
        Ok(self.shared.associations.get(object, category))
    }

    /// Sets the Binding association strongly.
    ///
    /// # Errors
    ///
    /// See [`Bridge::set_association`].
    pub fn set_binding(&self, object: Handle, managed: Option<&ManagedRef>) -> Result<()> {
        self.set_association(
            object,
            AssociationCategory::Binding,
            managed.map(|m| InstanceContainer::Strong(Arc::clone(m))),
        )
    }

    /// Returns the Binding association.
    ///
    /// # Errors
    ///
    /// See [`Bridge::association`].
    pub fn binding(&self, object: Handle) -> Result<Option<ManagedRef>> {
        self.association(object, AssociationCategory::Binding)
    }

    /// Sets the Custom association strongly.
    ///
    /// # Errors
    ///
    /// See [`Bridge::set_association`].
    pub fn set_custom(&self, object: Handle, managed: Option<&ManagedRef>) -> Result<()> {
        self.set_association(
            object,
            AssociationCategory::Custom,
            managed.map(|m| InstanceContainer::Strong(Arc::clone(m))),
        )
    }

    /// Returns the Custom association.
    ///
    /// # Errors
    ///
    /// See [`Bridge::association`].
    pub fn custom(&self, object: Handle) -> Result<Option<ManagedRef>> {
        self.association(object, AssociationCategory::Custom)
    }

    /// Ties `managed` to the lifetime of `object`.
    ///
    /// The same managed object may be associated several times; each
    /// association is released separately.
    ///
    /// # Errors
    ///
    /// Returns an error if `object` is not a live object.
    pub fn associate(&self, object: Handle, managed: &ManagedRef) -> Result<()> {
        self.object(object)?;
        self.shared
            .associations
            .associate(object, Arc::clone(managed));
        Ok(())
    }

    /// Releases one association of `managed` with `object`.
    ///
    /// Returns `false` if `managed` was not associated with `object`.
    ///
    /// # Errors
    ///
    /// Returns an error if `object` is not a live object.
    pub fn dissociate(&self, object: Handle, managed: &ManagedRef) -> Result<bool> {
        self.object(object)?;
        let removed = self.shared.associations.dissociate(object, managed);
        Ok(removed.is_some())
    }

    /// Re-evaluates the Binding container strength after a refcount change.
    pub(crate) fn sync_binding(&self, object: Handle) {
        let Some(entry) = self.shared.heap.get(object) else {
            return;
        };
        let (demoted, observed) = self
            .shared
            .associations
            .sync_binding_strength(object, || entry.refcount.load(Ordering::Acquire));
        drop(entry);
        drop(observed);
        drop(demoted);
    }
}
