//! The native object heap.
//!
//! Objects are addressed by [`Handle`] and stored as shared
//! [`ObjectEntry`] records. An entry carries the object's class, its atomic
//! reference count, a one-shot `deallocating` flag, and a payload for the
//! built-in string and block layouts and for cast proxies.
//!
//! The heap only stores entries. Reference counting and teardown live in
//! [`reference`](crate::runtime::reference).

use crate::error::{Error, Result};
use crate::runtime::callback::CallbackDescriptor;
use crate::runtime::class::{NativeClass, NativeImp};
use crate::runtime::encoding::Signature;
use crate::runtime::Handle;
use fxhash::FxHashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

/// How a block runs when called.
#[derive(Clone)]
pub(crate) enum BlockInvoke {
    /// A native closure.
    Native(NativeImp),
    /// Forwards to the managed instance in the block's Block association.
    Managed(Arc<CallbackDescriptor>),
}

/// The body of a block object.
#[derive(Clone)]
pub(crate) struct BlockBody {
    pub(crate) signature: Signature,
    pub(crate) invoke: BlockInvoke,
}

/// The object a cast proxy stands for. The proxy holds one retain on it.
#[derive(Clone, Copy)]
pub(crate) struct CastBody {
    pub(crate) peer: Handle,
    pub(crate) transparent: bool,
}

/// Layout-specific instance data.
pub(crate) enum Payload {
    None,
    String(String),
    Block(BlockBody),
    Cast(CastBody),
}

/// A live native object.
pub(crate) struct ObjectEntry {
    pub(crate) handle: Handle,
    pub(crate) class: Arc<NativeClass>,
    pub(crate) refcount: AtomicU32,
    pub(crate) deallocating: AtomicBool,
    pub(crate) payload: Payload,
    #[cfg(feature = "alloc_backtrace")]
    pub(crate) backtrace: backtrace::Backtrace,
}

impl ObjectEntry {
    pub(crate) fn new(handle: Handle, class: Arc<NativeClass>, payload: Payload) -> Self {
        ObjectEntry {
            handle,
            class,
            refcount: AtomicU32::new(1),
            deallocating: AtomicBool::new(false),
            payload,
            #[cfg(feature = "alloc_backtrace")]
            backtrace: backtrace::Backtrace::new_unresolved(),
        }
    }

    /// Retains unless the count has already reached zero.
    ///
    /// Returns the new count, or `None` if the object is dead.
    pub(crate) fn try_retain(&self) -> Result<Option<u32>> {
        let mut current = self.refcount.load(Ordering::Acquire);
        loop {
            if current == 0 {
                return Ok(None);
            }
            let next = current.checked_add(1).ok_or(Error::RefCountOverflow)?;
            match self.refcount.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(Some(next)),
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn block(&self) -> Option<&BlockBody> {
        match &self.payload {
            Payload::Block(body) => Some(body),
            _ => None,
        }
    }

    pub(crate) fn string(&self) -> Option<&str> {
        match &self.payload {
            Payload::String(s) => Some(s),
            _ => None,
        }
    }

    pub(crate) fn cast(&self) -> Option<CastBody> {
        match self.payload {
            Payload::Cast(body) => Some(body),
            _ => None,
        }
    }
}

/// All live objects of one bridge.
#[derive(Default)]
pub(crate) struct NativeHeap {
    objects: RwLock<FxHashMap<Handle, Arc<ObjectEntry>>>,
}

impl NativeHeap {
    /// Inserts a new entry, enforcing the live object limit.
    pub(crate) fn insert(&self, entry: ObjectEntry, limit: Option<usize>) -> Result<Arc<ObjectEntry>> {
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(limit) = limit
            && objects.len() >= limit
        {
            return Err(Error::OutOfMemory {
                live: objects.len(),
            });
        }
        let entry = Arc::new(entry);
        objects.insert(entry.handle, Arc::clone(&entry));
        Ok(entry)
    }

    pub(crate) fn get(&self, handle: Handle) -> Option<Arc<ObjectEntry>> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&handle)
            .cloned()
    }

    pub(crate) fn remove(&self, handle: Handle) -> Option<Arc<ObjectEntry>> {
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&handle)
    }

    pub(crate) fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Describes every live object, for leak reports.
    pub(crate) fn leak_report(&self) -> Vec<String> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        let mut report: Vec<String> = objects
            .values()
            .map(|entry| {
                let line = format!(
                    "{} <{}> refcount={}",
                    entry.handle,
                    entry.class.name(),
                    entry.refcount.load(Ordering::Relaxed)
                );
                #[cfg(feature = "alloc_backtrace")]
                let line = {
                    let mut bt = entry.backtrace.clone();
                    bt.resolve();
                    format!("{line}\n{bt:?}")
                };
                line
            })
            .collect();
        report.sort();
        report
    }
}
