//! Opaque 64-bit handles.
//!
//! Objects, classes, pool markers and callback descriptors are all addressed
//! by a `Handle`. Zero is the null sentinel everywhere. Handles come from a
//! single monotonically increasing counter per bridge, so a handle is never
//! reissued and a stale handle is always detectably invalid.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// An opaque reference into the native runtime. `Handle::NULL` is absent.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Handle(u64);

impl Handle {
    /// The null handle.
    pub const NULL: Handle = Handle(0);

    /// Wraps a raw handle value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Handle(raw)
    }

    /// Returns the raw handle value.
    #[must_use]
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// Returns whether this is the null handle.
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Returns `None` for the null handle.
    #[must_use]
    pub const fn non_null(self) -> Option<Handle> {
        if self.is_null() { None } else { Some(self) }
    }
}

impl From<Handle> for u64 {
    fn from(handle: Handle) -> u64 {
        handle.0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            f.write_str("Handle(null)")
        } else {
            write!(f, "Handle({:#x})", self.0)
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Issues fresh handles.
#[derive(Debug)]
pub(crate) struct HandleAllocator {
    next: AtomicU64,
}

impl HandleAllocator {
    pub(crate) const fn new() -> Self {
        // Small values are left free so that accidental integer handles are
        // rejected instead of aliasing a real object.
        HandleAllocator {
            next: AtomicU64::new(0x1000),
        }
    }

    pub(crate) fn next(&self) -> Handle {
        Handle(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_handle() {
        assert!(Handle::NULL.is_null());
        assert_eq!(Handle::NULL.non_null(), None);
        assert_eq!(Handle::default(), Handle::NULL);
        assert_eq!(format!("{:?}", Handle::NULL), "Handle(null)");
    }

    #[test]
    fn test_allocator_is_monotonic() {
        let alloc = HandleAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        assert!(!a.is_null());
        assert!(b > a);
        assert_eq!(Handle::from_raw(a.as_raw()), a);
    }
}
