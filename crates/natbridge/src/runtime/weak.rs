//! Weak references to native objects.
//!
//! A weak slot is a caller-owned location, identified by a `u64`, that
//! observes one object. Once the object's final release begins, every slot
//! observing it reads as null.
//!
//! The final release performs its 1 → 0 transition while holding this
//! table's lock, and loads retain while holding it, so a load either sees
//! the object alive and keeps it alive, or sees null. It never returns a
//! handle to an object that is being torn down.

use crate::error::{Error, Result};
use crate::runtime::bridge::Bridge;
use crate::runtime::Handle;
use fxhash::{FxHashMap, FxHashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Default)]
pub(crate) struct WeakSlots {
    slots: FxHashMap<u64, Handle>,
    referrers: FxHashMap<Handle, FxHashSet<u64>>,
}

impl WeakSlots {
    fn unregister(&mut self, location: u64) {
        if let Some(old) = self.slots.remove(&location)
            && let Some(locations) = self.referrers.get_mut(&old)
        {
            locations.remove(&location);
            if locations.is_empty() {
                self.referrers.remove(&old);
            }
        }
    }

    fn register(&mut self, location: u64, object: Handle) {
        self.unregister(location);
        if !object.is_null() {
            self.slots.insert(location, object);
            self.referrers.entry(object).or_default().insert(location);
        }
    }

    /// Nulls every slot observing `object`.
    pub(crate) fn clear_referent(&mut self, object: Handle) -> usize {
        let Some(locations) = self.referrers.remove(&object) else {
            return 0;
        };
        for location in &locations {
            self.slots.remove(location);
        }
        locations.len()
    }
}

/// Weak slots of one bridge.
#[derive(Default)]
pub(crate) struct WeakTable {
    inner: Mutex<WeakSlots>,
}

impl WeakTable {
    pub(crate) fn lock(&self) -> MutexGuard<'_, WeakSlots> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Bridge {
    /// Makes `location` observe `object`, replacing what it observed before.
    ///
    /// Storing the null handle clears the slot.
    ///
    /// # Errors
    ///
    /// - [`Error::NullHandle`] if `location` is zero
    /// - [`Error::InvalidHandle`] if `object` is not a live object
    pub fn store_weak(&self, location: u64, object: Handle) -> Result<()> {
        if location == 0 {
            return Err(Error::NullHandle);
        }
        let mut weak = self.shared.weak.lock();
        if !object.is_null() {
            let entry = self.object(object)?;
            if entry.refcount.load(std::sync::atomic::Ordering::Acquire) == 0 {
                return Err(Error::InvalidHandle { handle: object });
            }
        }
        weak.register(location, object);
        Ok(())
    }

    /// Loads the object observed by `location`, retained and autoreleased
    /// into the current pool.
    ///
    /// Returns the null handle once the referent is gone, or if nothing was
    /// ever stored at `location`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RefCountOverflow`] if the referent cannot be retained.
    pub fn load_weak(&self, location: u64) -> Result<Handle> {
        let handle = self.load_weak_retained(location)?;
        if handle.is_null() {
            return Ok(handle);
        }
        self.autorelease(handle)
    }

    /// Loads the object observed by `location` with a retain the caller
    /// must balance.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RefCountOverflow`] if the referent cannot be retained.
    pub fn load_weak_retained(&self, location: u64) -> Result<Handle> {
        let (handle, count) = {
            let weak = self.shared.weak.lock();
            let Some(&handle) = weak.slots.get(&location) else {
                return Ok(Handle::NULL);
            };
            let Some(entry) = self.shared.heap.get(handle) else {
                return Ok(Handle::NULL);
            };
            match entry.try_retain()? {
                Some(count) => (handle, count),
                None => return Ok(Handle::NULL),
            }
        };

        if count == 2 {
            self.sync_binding(handle);
        }
        Ok(handle)
    }

    /// Stops `location` from observing anything.
    pub fn destroy_weak(&self, location: u64) {
        self.shared.weak.lock().unregister(location);
    }

    /// Creates a self-destroying weak slot observing `object`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if `object` is not a live object.
    pub fn weak_slot(&self, object: Handle) -> Result<WeakSlot> {
        let slot = WeakSlot {
            bridge: self.clone(),
            location: self.shared.handles.next().as_raw(),
        };
        slot.store(object)?;
        Ok(slot)
    }
}

/// A weak reference that deregisters itself when dropped.
///
/// ```
/// use natbridge::{Bridge, BridgeConfig};
///
/// let bridge = Bridge::new(BridgeConfig::default());
/// let s = bridge.create_native_string("short-lived").unwrap();
/// let slot = bridge.weak_slot(s).unwrap();
///
/// let loaded = slot.load_retained().unwrap();
/// assert_eq!(loaded, s);
/// bridge.release(loaded).unwrap();
///
/// bridge.release(s).unwrap();
/// assert!(slot.load_retained().unwrap().is_null());
/// ```
pub struct WeakSlot {
    bridge: Bridge,
    location: u64,
}

impl WeakSlot {
    /// Observes `object` instead.
    ///
    /// # Errors
    ///
    /// See [`Bridge::store_weak`].
    pub fn store(&self, object: Handle) -> Result<()> {
        self.bridge.store_weak(self.location, object)
    }

    /// See [`Bridge::load_weak`].
    ///
    /// # Errors
    ///
    /// See [`Bridge::load_weak`].
    pub fn load(&self) -> Result<Handle> {
        self.bridge.load_weak(self.location)
    }

    /// See [`Bridge::load_weak_retained`].
    ///
    /// # Errors
    ///
    /// See [`Bridge::load_weak_retained`].
    pub fn load_retained(&self) -> Result<Handle> {
        self.bridge.load_weak_retained(self.location)
    }

    /// Returns the location this slot is registered under.
    #[must_use]
    pub fn location(&self) -> u64 {
        self.location
    }
}

impl Drop for WeakSlot {
    fn drop(&mut self) {
        self.bridge.destroy_weak(self.location);
    }
}

impl std::fmt::Debug for WeakSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakSlot")
            .field("location", &self.location)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeConfig;

    #[test]
    fn test_load_after_death_is_null() {
        let bridge = Bridge::new(BridgeConfig::default());
        let obj = bridge.create_native_string("o").unwrap();
        bridge.store_weak(0x10, obj).unwrap();
        bridge.store_weak(0x20, obj).unwrap();

        let loaded = bridge.load_weak_retained(0x10).unwrap();
        assert_eq!(loaded, obj);
        assert_eq!(bridge.retain_count(obj).unwrap(), 2);
        bridge.release(loaded).unwrap();

        bridge.release(obj).unwrap();
        assert!(bridge.load_weak_retained(0x10).unwrap().is_null());
        assert!(bridge.load_weak_retained(0x20).unwrap().is_null());
    }

    #[test]
    fn test_store_replaces_and_destroy_clears() {
        let bridge = Bridge::new(BridgeConfig::default());
        let a = bridge.create_native_string("a").unwrap();
        let b = bridge.create_native_string("b").unwrap();

        bridge.store_weak(0x30, a).unwrap();
        bridge.store_weak(0x30, b).unwrap();
        let loaded = bridge.load_weak_retained(0x30).unwrap();
        assert_eq!(loaded, b);
        bridge.release(loaded).unwrap();

        // a's death must not disturb a slot that moved on.
        bridge.release(a).unwrap();
        let loaded = bridge.load_weak_retained(0x30).unwrap();
        assert_eq!(loaded, b);
        bridge.release(loaded).unwrap();

        bridge.destroy_weak(0x30);
        assert!(bridge.load_weak_retained(0x30).unwrap().is_null());
        bridge.release(b).unwrap();
    }

    #[test]
    fn test_store_validation() {
        let bridge = Bridge::new(BridgeConfig::default());
        assert_eq!(
            bridge.store_weak(0, Handle::NULL),
            Err(Error::NullHandle)
        );
        assert!(bridge.store_weak(0x40, Handle::from_raw(0x9999_9999)).is_err());
        bridge.store_weak(0x40, Handle::NULL).unwrap();
        assert!(bridge.load_weak_retained(0x40).unwrap().is_null());
    }

    #[test]
    fn test_slot_destroys_itself() {
        let bridge = Bridge::new(BridgeConfig::default());
        let obj = bridge.create_native_string("o").unwrap();
        let location = {
            let slot = bridge.weak_slot(obj).unwrap();
            slot.location()
        };
        assert!(bridge.load_weak_retained(location).unwrap().is_null());
        bridge.release(obj).unwrap();
    }
}
