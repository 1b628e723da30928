//! Reference counting across the bridge.
//!
//! `retain` and `release` are atomic compare-and-swap loops over the
//! object's count. The final 1 → 0 transition runs under the weak table
//! lock so that weak loads are serialized against it, and triggers
//! [`deallocation`](#deallocation) exactly once.
//!
//! # Deallocation
//!
//! Teardown runs in a fixed order:
//!
//! 1. weak slots observing the object are nulled (still under the weak lock)
//! 2. association slots are taken out of the table
//! 3. managed peers are severed from the handle
//! 4. the taken associations are dropped, releasing managed references
//! 5. the object's monitor is discarded
//! 6. the entry leaves the heap
//! 7. a cast proxy releases the object it stands for
//!
//! Step 4 runs with no bridge lock held, so managed finalizers may call back
//! into the bridge.
//!
//! # Binding strength
//!
//! Whenever a count crosses between one and two, the Binding association is
//! re-evaluated; see [`association`](crate::runtime::association).

use crate::error::{Error, Result};
use crate::runtime::bridge::Bridge;
use crate::runtime::heap::ObjectEntry;
use crate::runtime::Handle;
use std::sync::atomic::Ordering;

impl Bridge {
    /// Increments the reference count of `object`.
    ///
    /// Retaining the null handle or a class is a no-op. Returns `object`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidHandle`] if `object` is unknown or already dead
    /// - [`Error::RefCountOverflow`] if the count would exceed `u32::MAX`
    pub fn retain(&self, object: Handle) -> Result<Handle> {
        if object.is_null() || self.shared.classes.get(object).is_some() {
            return Ok(object);
        }
        let entry = self.object(object)?;
        match entry.try_retain()? {
            Some(2) => self.sync_binding(object),
            Some(_) => {}
            None => return Err(Error::InvalidHandle { handle: object }),
        }
        Ok(object)
    }

    /// Decrements the reference count of `object`, deallocating it at zero.
    ///
    /// Releasing the null handle or a class is a no-op.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidHandle`] if `object` is unknown
    /// - [`Error::OverRelease`] if the object is already being torn down
    pub fn release(&self, object: Handle) -> Result<()> {
        if object.is_null() || self.shared.classes.get(object).is_some() {
            return Ok(());
        }
        let entry = self.object(object)?;

        let mut current = entry.refcount.load(Ordering::Acquire);
        loop {
            match current {
                0 => return Err(Error::OverRelease { handle: object }),
                1 => {
                    let mut weak = self.shared.weak.lock();
                    if entry
                        .refcount
                        .compare_exchange(1, 0, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        let cleared = weak.clear_referent(object);
                        drop(weak);
                        if cleared > 0 {
                            natbridge_log::trace!("nulled {cleared} weak slots of {object}");
                        }
                        self.deallocate(&entry);
                        return Ok(());
                    }
                    drop(weak);
                    current = entry.refcount.load(Ordering::Acquire);
                }
                _ => match entry.refcount.compare_exchange_weak(
                    current,
                    current - 1,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        if current == 2 {
                            self.sync_binding(object);
                        }
                        return Ok(());
                    }
                    Err(actual) => current = actual,
                },
            }
        }
    }

    /// Returns the reference count of `object`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullHandle`] or [`Error::InvalidHandle`] if `object`
    /// is not a live object.
    pub fn retain_count(&self, object: Handle) -> Result<u32> {
        Ok(self.object(object)?.refcount.load(Ordering::Acquire))
    }

    /// Returns the number of live objects.
    #[must_use]
    pub fn live_object_count(&self) -> usize {
        self.shared.heap.len()
    }

    /// Returns whether `object` is a live object of this bridge.
    #[must_use]
    pub fn is_live(&self, object: Handle) -> bool {
        self.shared
            .heap
            .get(object)
            .is_some_and(|e| e.refcount.load(Ordering::Acquire) > 0)
    }

    fn deallocate(&self, entry: &ObjectEntry) {
        if entry.deallocating.swap(true, Ordering::AcqRel) {
            return;
        }
        let handle = entry.handle;

        let associations = self.shared.associations.take_all(handle);
        if let Some(associations) = associations {
            for managed in associations.managed_objects() {
                if managed.sever_peer(handle) {
                    natbridge_log::warn!(
                        "{handle} deallocated while {} still owned it; over-release?",
                        managed.managed_type().name()
                    );
                }
            }
            associations.clear();
        }

        self.shared.monitors.remove(handle);
        self.shared.heap.remove(handle);
        natbridge_log::trace!("dealloc {handle} <{}>", entry.class.name());

        if let Some(cast) = entry.cast()
            && let Err(err) = self.release(cast.peer)
        {
            natbridge_log::warn!("cast proxy {handle} could not release {}: {err}", cast.peer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BridgeConfig;

    #[test]
    fn test_balanced_retain_release() {
        let bridge = Bridge::new(BridgeConfig::default());
        let obj = bridge.create_native_string("o").unwrap();

        for _ in 0..10 {
            bridge.retain(obj).unwrap();
        }
        assert_eq!(bridge.retain_count(obj).unwrap(), 11);
        for _ in 0..10 {
            bridge.release(obj).unwrap();
        }
        assert_eq!(bridge.retain_count(obj).unwrap(), 1);

        bridge.release(obj).unwrap();
        assert!(!bridge.is_live(obj));
        assert_eq!(bridge.live_object_count(), 0);
    }

    #[test]
    fn test_null_and_class_are_noops() {
        let bridge = Bridge::new(BridgeConfig::default());
        assert_eq!(bridge.retain(Handle::NULL).unwrap(), Handle::NULL);
        bridge.release(Handle::NULL).unwrap();

        let class = bridge.root_class();
        bridge.retain(class).unwrap();
        bridge.release(class).unwrap();
        bridge.release(class).unwrap();
    }

    #[test]
    fn test_dead_handle_is_rejected() {
        let bridge = Bridge::new(BridgeConfig::default());
        let obj = bridge.create_native_string("o").unwrap();
        bridge.release(obj).unwrap();

        assert_eq!(
            bridge.retain(obj),
            Err(Error::InvalidHandle { handle: obj })
        );
        assert_eq!(
            bridge.release(obj),
            Err(Error::InvalidHandle { handle: obj })
        );
    }

    #[test]
    fn test_overflow() {
        let bridge = Bridge::new(BridgeConfig::default());
        let obj = bridge.create_native_string("o").unwrap();
        bridge
            .object(obj)
            .unwrap()
            .refcount
            .store(u32::MAX, Ordering::Release);

        assert_eq!(bridge.retain(obj), Err(Error::RefCountOverflow));
        bridge
            .object(obj)
            .unwrap()
            .refcount
            .store(1, Ordering::Release);
        bridge.release(obj).unwrap();
    }
}
