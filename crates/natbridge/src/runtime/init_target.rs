//! Thread-local construction correlation.
//!
//! When managed code constructs an instance of an inherited class, the
//! managed object exists before its native peer. The managed side parks the
//! object here, triggers native allocation, and the allocation path picks it
//! up and binds it instead of building a second managed object.
//!
//! The slot holds a value only while one construction is in flight on the
//! thread. [`InitTargetGuard`] clears it on every exit path, unwinding
//! included.
//!
//! # Reentrancy
//!
//! A construction that starts another construction on the same thread before
//! the first allocation has consumed the target is rejected with
//! [`Error::InitTargetAlreadySet`]. Allocations that do not match the target's
//! type leave it in place.

use crate::error::{Error, Result};
use crate::runtime::managed::ManagedRef;
use std::cell::RefCell;

thread_local! {
    static INIT_TARGET: RefCell<Option<ManagedRef>> = const { RefCell::new(None) };
}

/// Parks `target` on the calling thread.
///
/// # Errors
///
/// Returns [`Error::InitTargetAlreadySet`] if a target is already parked.
pub fn set_init_target(target: &ManagedRef) -> Result<()> {
    INIT_TARGET.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return Err(Error::InitTargetAlreadySet);
        }
        *slot = Some(ManagedRef::clone(target));
        Ok(())
    })
}

/// Clears the calling thread's slot and returns what it held.
pub fn unset_init_target() -> Option<ManagedRef> {
    INIT_TARGET
        .try_with(|slot| slot.borrow_mut().take())
        .ok()
        .flatten()
}

/// Returns the calling thread's parked target without clearing it.
#[must_use]
pub fn init_target() -> Option<ManagedRef> {
    INIT_TARGET.with(|slot| slot.borrow().clone())
}

/// Takes the parked target if `accept` approves it.
pub(crate) fn take_init_target_if(accept: impl FnOnce(&ManagedRef) -> bool) -> Option<ManagedRef> {
    INIT_TARGET.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.as_ref().is_some_and(accept) {
            slot.take()
        } else {
            None
        }
    })
}

/// Keeps an init target parked for its own lifetime.
///
/// ```
/// use natbridge::runtime::init_target::{init_target, InitTargetGuard};
/// use natbridge::runtime::managed::{ManagedObject, ManagedType};
///
/// let ty = ManagedType::builder("Example").build();
/// let obj = ManagedObject::stateless(&ty);
/// {
///     let _guard = InitTargetGuard::set(&obj).unwrap();
///     assert!(init_target().is_some());
/// }
/// assert!(init_target().is_none());
/// ```
#[derive(Debug)]
pub struct InitTargetGuard {
    _private: (),
}

impl InitTargetGuard {
    /// Parks `target` until the guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InitTargetAlreadySet`] if a target is already parked.
    pub fn set(target: &ManagedRef) -> Result<Self> {
        set_init_target(target)?;
        Ok(InitTargetGuard { _private: () })
    }
}

impl Drop for InitTargetGuard {
    fn drop(&mut self) {
        drop(unset_init_target());
    }
}
