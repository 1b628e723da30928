//! Per-object monitors.
//!
//! Any native object can be used as a lock. Monitors live in a side table
//! keyed by handle, are created on first use and discarded when the object
//! is deallocated.
//!
//! Monitors are recursive: the owning thread may lock again, and must unlock
//! once per lock. Unlocking from any other thread is an error.

use crate::error::{Error, Result};
use crate::runtime::bridge::Bridge;
use crate::runtime::Handle;
use fxhash::FxHashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, ThreadId};

#[derive(Default)]
struct MonitorState {
    owner: Option<ThreadId>,
    depth: usize,
}

#[derive(Default)]
struct Monitor {
    state: Mutex<MonitorState>,
    available: Condvar,
}

impl Monitor {
    fn enter(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    return;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    return;
                }
                Some(_) => {
                    state = self
                        .available
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner);
                }
            }
        }
    }

    fn exit(&self) -> bool {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.owner != Some(me) {
            return false;
        }
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.available.notify_one();
        }
        true
    }
}

/// Monitors of one bridge.
#[derive(Default)]
pub(crate) struct MonitorTable {
    monitors: Mutex<FxHashMap<Handle, Arc<Monitor>>>,
}

impl MonitorTable {
    /// Returns the monitor of `handle`, creating it on first use. `live` is
    /// checked under the table lock, which deallocation also takes to drop
    /// the monitor, so a dead handle never gets one.
    fn get_or_create(&self, handle: Handle, live: impl FnOnce() -> bool) -> Option<Arc<Monitor>> {
        let mut monitors = self.monitors.lock().unwrap_or_else(PoisonError::into_inner);
        if !live() {
            return None;
        }
        Some(Arc::clone(monitors.entry(handle).or_default()))
    }

    fn get(&self, handle: Handle) -> Option<Arc<Monitor>> {
        self.monitors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
    }

    pub(crate) fn remove(&self, handle: Handle) {
        self.monitors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle);
    }
}

impl Bridge {
    /// Acquires the monitor of `object`, blocking while another thread
    /// holds it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NullHandle`] or [`Error::InvalidHandle`] if `object`
    /// is not a live object.
    pub fn lock_object(&self, object: Handle) -> Result<()> {
        let entry = self.object(object)?;
        let monitor = self
            .shared
            .monitors
            .get_or_create(object, || !entry.deallocating.load(Ordering::Acquire))
            .ok_or(Error::InvalidHandle { handle: object })?;
        drop(entry);
        monitor.enter();
        Ok(())
    }

    /// Releases one level of the monitor of `object`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotLockOwner`] if the calling thread does not hold
    /// the monitor.
    pub fn unlock_object(&self, object: Handle) -> Result<()> {
        let released = self
            .shared
            .monitors
            .get(object)
            .is_some_and(|monitor| monitor.exit());
        if released {
            Ok(())
        } else {
            Err(Error::NotLockOwner { handle: object })
        }
    }
}
