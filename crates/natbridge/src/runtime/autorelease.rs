//! Autorelease pools.
//!
//! Each thread keeps its own stack of pools per bridge. `autorelease` defers
//! one release to the innermost open pool on the calling thread; popping a
//! pool performs those releases in reverse order of registration.
//!
//! Popping a pool that is not innermost also pops every pool opened after it,
//! innermost first. Pools still open when a thread exits are drained by the
//! thread-local destructor.
//!
//! # Example
//!
//! ```
//! use natbridge::{Bridge, BridgeConfig};
//!
//! let bridge = Bridge::new(BridgeConfig::default());
//! let pool = bridge.push_pool();
//! let s = bridge.create_native_string("temporary").unwrap();
//! bridge.autorelease(s).unwrap();
//! assert!(bridge.is_live(s));
//!
//! bridge.pop_pool(pool).unwrap();
//! assert!(!bridge.is_live(s));
//! ```

use crate::error::{Error, Result};
use crate::runtime::bridge::{Bridge, Shared};
use crate::runtime::Handle;
use fxhash::FxHashMap;
use std::cell::RefCell;
use std::sync::Weak;

thread_local! {
    static POOLS: RefCell<FxHashMap<u64, PoolStack>> = RefCell::new(FxHashMap::default());
}

struct PoolFrame {
    marker: Handle,
    objects: Vec<Handle>,
}

/// One thread's pools for one bridge.
struct PoolStack {
    bridge: Weak<Shared>,
    frames: Vec<PoolFrame>,
}

impl Drop for PoolStack {
    fn drop(&mut self) {
        if self.frames.is_empty() {
            return;
        }
        let Some(shared) = self.bridge.upgrade() else {
            return;
        };
        let bridge = Bridge::from_shared(shared);
        natbridge_log::debug!(
            "draining {} autorelease pools at thread exit",
            self.frames.len()
        );
        bridge.drain(std::mem::take(&mut self.frames));
    }
}

impl Bridge {
    /// Opens a pool on the calling thread and returns its marker.
    pub fn push_pool(&self) -> Handle {
        let marker = self.shared.handles.next();
        let pushed = POOLS.try_with(|pools| {
            pools
                .borrow_mut()
                .entry(self.shared.id)
                .or_insert_with(|| PoolStack {
                    bridge: std::sync::Arc::downgrade(&self.shared),
                    frames: Vec::new(),
                })
                .frames
                .push(PoolFrame {
                    marker,
                    objects: Vec::new(),
                });
        });
        if pushed.is_err() {
            natbridge_log::warn!("pool {marker} opened during thread teardown is ignored");
        }
        marker
    }

    /// Pops the pool `marker` and every pool opened after it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPool`] if `marker` is not open on the calling
    /// thread.
    pub fn pop_pool(&self, marker: Handle) -> Result<()> {
        let popped = POOLS
            .try_with(|pools| {
                let mut pools = pools.borrow_mut();
                let stack = pools.get_mut(&self.shared.id)?;
                let index = stack.frames.iter().position(|f| f.marker == marker)?;
                Some(stack.frames.split_off(index))
            })
            .ok()
            .flatten();

        match popped {
            Some(frames) => {
                self.drain(frames);
                Ok(())
            }
            None => Err(Error::InvalidPool { marker }),
        }
    }

    /// Defers one release of `object` to the innermost pool on this thread.
    ///
    /// With no pool open the object is leaked, with a warning unless
    /// disabled in the configuration. Returns `object`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHandle`] if `object` is not a live object.
    pub fn autorelease(&self, object: Handle) -> Result<Handle> {
        if object.is_null() || self.shared.classes.get(object).is_some() {
            return Ok(object);
        }
        if !self.is_live(object) {
            return Err(Error::InvalidHandle { handle: object });
        }

        let queued = POOLS
            .try_with(|pools| {
                let mut pools = pools.borrow_mut();
                let frame = pools.get_mut(&self.shared.id)?.frames.last_mut()?;
                frame.objects.push(object);
                Some(())
            })
            .ok()
            .flatten();

        if queued.is_none() && self.shared.config.warn_on_poolless_autorelease {
            natbridge_log::warn!("{object} autoreleased with no pool in place; leaking");
        }
        Ok(object)
    }

    /// Returns the number of pools open on the calling thread.
    #[must_use]
    pub fn pool_depth(&self) -> usize {
        POOLS
            .try_with(|pools| {
                pools
                    .borrow()
                    .get(&self.shared.id)
                    .map_or(0, |s| s.frames.len())
            })
            .unwrap_or(0)
    }

    fn drain(&self, frames: Vec<PoolFrame>) {
        for frame in frames.into_iter().rev() {
            natbridge_log::trace!(
                "draining pool {} ({} objects)",
                frame.marker,
                frame.objects.len()
            );
            for object in frame.objects.into_iter().rev() {
                if let Err(err) = self.release(object) {
                    natbridge_log::warn!("pool {} failed to release {object}: {err}", frame.marker);
                }
            }
        }
    }
}
