//! The bridge value.
//!
//! A [`Bridge`] owns every table the runtime needs: the class table, the
//! object heap, class descriptors, associations, weak slots, monitors and
//! callback descriptors. It is cheap to clone; clones share state.
//!
//! Several bridges may coexist in one process. Thread-local state (pools,
//! init target, attachment) is keyed by bridge id where it matters.
//!
//! # Example
//!
//! ```
//! use natbridge::{Bridge, BridgeConfig};
//!
//! let bridge = Bridge::new(BridgeConfig::default());
//! let s = bridge.create_native_string("hello").unwrap();
//! assert_eq!(bridge.native_string_value(s).unwrap(), "hello");
//! bridge.release(s).unwrap();
//! assert_eq!(bridge.live_object_count(), 0);
//! ```

use crate::config::BridgeConfig;
use crate::error::{Error, Result};
use crate::runtime::association::AssociationTable;
use crate::runtime::callback::CallbackRegistry;
use crate::runtime::class::{ClassKind, ClassTable, Method, NativeClass};
use crate::runtime::class_type::ClassTypeRegistry;
use crate::runtime::encoding::Signature;
use crate::runtime::handle::HandleAllocator;
use crate::runtime::heap::{NativeHeap, ObjectEntry, Payload};
use crate::runtime::lock::MonitorTable;
use crate::runtime::proxy::{ClassFactory, ClassSpec, DispatchTableFactory, ProxyClassGenerator};
use crate::runtime::value::Value;
use crate::runtime::weak::WeakTable;
use crate::runtime::Handle;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_BRIDGE_ID: AtomicU64 = AtomicU64::new(1);

/// Name of the root class.
pub const ROOT_CLASS: &str = "BridgeObject";
/// Name of the string class.
pub const STRING_CLASS: &str = "BridgeString";
/// Name of the heap block class.
pub const BLOCK_CLASS: &str = "BridgeBlock";
/// Name of the stack block class.
pub const STACK_BLOCK_CLASS: &str = "BridgeStackBlock";

pub(crate) struct Builtins {
    pub(crate) root: Arc<NativeClass>,
    pub(crate) string: Arc<NativeClass>,
    pub(crate) block: Arc<NativeClass>,
    pub(crate) stack_block: Arc<NativeClass>,
}

/// State shared by every clone of a [`Bridge`].
pub(crate) struct Shared {
    pub(crate) id: u64,
    pub(crate) config: BridgeConfig,
    pub(crate) handles: HandleAllocator,
    pub(crate) factory: Box<dyn ClassFactory>,
    pub(crate) classes: ClassTable,
    pub(crate) heap: NativeHeap,
    pub(crate) class_types: ClassTypeRegistry,
    pub(crate) associations: AssociationTable,
    pub(crate) weak: WeakTable,
    pub(crate) monitors: MonitorTable,
    pub(crate) callbacks: CallbackRegistry,
    pub(crate) proxies: ProxyClassGenerator,
    pub(crate) attached_threads: AtomicUsize,
    pub(crate) shut_down: AtomicBool,
    builtins: std::sync::OnceLock<Builtins>,
}

/// A bridge between the native runtime and the managed runtime.
#[derive(Clone)]
pub struct Bridge {
    pub(crate) shared: Arc<Shared>,
}

impl Bridge {
    /// Creates a bridge with the default class factory.
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_factory(config, DispatchTableFactory)
    }

    /// Creates a bridge that builds classes through `factory`.
    ///
    /// # Panics
    ///
    /// Panics if the factory fails to build the built-in classes.
    #[must_use]
    pub fn with_factory(config: BridgeConfig, factory: impl ClassFactory + 'static) -> Self {
        let shared = Arc::new(Shared {
            id: NEXT_BRIDGE_ID.fetch_add(1, Ordering::Relaxed),
            config,
            handles: HandleAllocator::new(),
            factory: Box::new(factory),
            classes: ClassTable::default(),
            heap: NativeHeap::default(),
            class_types: ClassTypeRegistry::default(),
            associations: AssociationTable::default(),
            weak: WeakTable::default(),
            monitors: MonitorTable::default(),
            callbacks: CallbackRegistry::default(),
            proxies: ProxyClassGenerator::default(),
            attached_threads: AtomicUsize::new(0),
            shut_down: AtomicBool::new(false),
            builtins: std::sync::OnceLock::new(),
        });
        let bridge = Bridge { shared };

        let builtins = match bridge.install_builtins() {
            Ok(builtins) => builtins,
            Err(err) => panic!("class factory rejected the built-in classes: {err}"),
        };
        let _ = bridge.shared.builtins.set(builtins);

        natbridge_log::info!("bridge {} created", bridge.shared.id);
        bridge
    }

    pub(crate) fn from_shared(shared: Arc<Shared>) -> Self {
        Bridge { shared }
    }

    /// Returns this bridge's process-unique id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &BridgeConfig {
        &self.shared.config
    }

    /// Returns whether [`Bridge::shutdown`] has run.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.shut_down.load(Ordering::Acquire)
    }

    /// Tears the bridge down.
    ///
    /// Drops every association and callback descriptor so that managed
    /// objects held by native peers become collectible, then reports objects
    /// still alive. Reference counting keeps working afterwards so that
    /// late releases from managed finalizers are harmless; new allocations
    /// and class definitions fail with [`Error::ShutDown`].
    ///
    /// Returns the number of objects still alive.
    pub fn shutdown(&self) -> usize {
        if self.shared.shut_down.swap(true, Ordering::AcqRel) {
            return self.shared.heap.len();
        }

        let associations = self.shared.associations.take_everything();
        drop(associations);
        self.shared.callbacks.clear();

        let leaked = self.shared.heap.leak_report();
        if !leaked.is_empty() {
            natbridge_log::warn!(
                "bridge {} shut down with {} live objects",
                self.shared.id,
                leaked.len()
            );
            for line in &leaked {
                natbridge_log::debug!("leaked {line}");
            }
        }
        natbridge_log::info!("bridge {} shut down", self.shared.id);
        leaked.len()
    }

    /// Returns the root class handle.
    #[must_use]
    pub fn root_class(&self) -> Handle {
        self.builtins().root.handle()
    }

    /// Returns the string class handle.
    #[must_use]
    pub fn string_class(&self) -> Handle {
        self.builtins().string.handle()
    }

    /// Returns the heap block class handle.
    #[must_use]
    pub fn block_class(&self) -> Handle {
        self.builtins().block.handle()
    }

    pub(crate) fn builtins(&self) -> &Builtins {
        match self.shared.builtins.get() {
            Some(builtins) => builtins,
            None => unreachable!("built-in classes are installed during construction"),
        }
    }

    pub(crate) fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(Error::ShutDown);
        }
        Ok(())
    }

    /// Resolves an object handle to its live entry.
    pub(crate) fn object(&self, handle: Handle) -> Result<Arc<ObjectEntry>> {
        if handle.is_null() {
            return Err(Error::NullHandle);
        }
        match self.shared.heap.get(handle) {
            Some(entry) => Ok(entry),
            None => Err(Error::InvalidHandle { handle }),
        }
    }

    /// Allocates an object with refcount one, owned by the caller.
    pub(crate) fn alloc_object(&self, class: &Arc<NativeClass>, payload: Payload) -> Result<Handle> {
        self.ensure_running()?;
        let handle = self.shared.handles.next();
        let entry = ObjectEntry::new(handle, Arc::clone(class), payload);
        self.shared
            .heap
            .insert(entry, self.shared.config.max_live_objects)?;
        natbridge_log::trace!("alloc {handle} <{}>", class.name());
        Ok(handle)
    }

    fn install_builtins(&self) -> Result<Builtins> {
        let root = self.install_class(ClassSpec {
            name: ROOT_CLASS.to_string(),
            superclass: None,
            kind: ClassKind::Plain,
            methods: vec![
                Method::native("description", Signature::parse("@@:")?, |bridge, this, _| {
                    let entry = bridge.object(this)?;
                    let text = match entry.string() {
                        Some(s) => s.to_string(),
                        None => format!("<{}: {this}>", entry.class.name()),
                    };
                    let s = bridge.create_native_string(&text)?;
                    bridge.autorelease(s)?;
                    Ok(Value::Object(s))
                }),
                Method::native("hash", Signature::parse("q@:")?, |_, this, _| {
                    #[allow(clippy::cast_possible_wrap)]
                    Ok(Value::Long(this.as_raw() as i64))
                }),
            ],
            protocols: Vec::new(),
        })?;

        let string = self.install_class(ClassSpec {
            name: STRING_CLASS.to_string(),
            superclass: Some(Arc::clone(&root)),
            kind: ClassKind::String,
            methods: vec![Method::native(
                "length",
                Signature::parse("q@:")?,
                |bridge, this, _| {
                    let len = bridge.native_string_value(this)?.encode_utf16().count();
                    Ok(Value::Long(i64::try_from(len).unwrap_or(i64::MAX)))
                },
            )],
            protocols: Vec::new(),
        })?;

        let block = self.install_class(ClassSpec {
            name: BLOCK_CLASS.to_string(),
            superclass: Some(Arc::clone(&root)),
            kind: ClassKind::Block,
            methods: Vec::new(),
            protocols: Vec::new(),
        })?;

        let stack_block = self.install_class(ClassSpec {
            name: STACK_BLOCK_CLASS.to_string(),
            superclass: Some(Arc::clone(&block)),
            kind: ClassKind::StackBlock,
            methods: Vec::new(),
            protocols: Vec::new(),
        })?;

        Ok(Builtins {
            root,
            string,
            block,
            stack_block,
        })
    }
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("id", &self.shared.id)
            .field("live_objects", &self.shared.heap.len())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::selector::Selector;

    #[test]
    fn test_builtin_classes() {
        let bridge = Bridge::new(BridgeConfig::default());
        let string = bridge.class(bridge.string_class()).unwrap();
        assert_eq!(string.kind(), ClassKind::String);
        assert_eq!(string.superclass().unwrap().name(), ROOT_CLASS);
        assert!(string.responds_to(Selector::register("description")));
        assert_eq!(bridge.class_count(), 4);
    }

    #[test]
    fn test_bridges_are_independent() {
        let a = Bridge::new(BridgeConfig::default());
        let b = Bridge::new(BridgeConfig::default());
        assert_ne!(a.id(), b.id());

        let s = a.create_native_string("only in a").unwrap();
        assert_eq!(a.live_object_count(), 1);
        assert_eq!(b.live_object_count(), 0);
        a.release(s).unwrap();
    }

    #[test]
    fn test_shutdown_rejects_allocation() {
        let bridge = Bridge::new(BridgeConfig::default());
        let s = bridge.create_native_string("kept").unwrap();

        assert_eq!(bridge.shutdown(), 1);
        assert!(bridge.is_shut_down());
        assert_eq!(bridge.create_native_string("late"), Err(Error::ShutDown));
        assert_eq!(bridge.define_class("Late", None), Err(Error::ShutDown));

        bridge.release(s).unwrap();
        assert_eq!(bridge.live_object_count(), 0);
    }

    #[test]
    fn test_allocation_limit() {
        let bridge = Bridge::new(BridgeConfig::default().with_max_live_objects(Some(2)));
        let a = bridge.create_native_string("a").unwrap();
        let b = bridge.create_native_string("b").unwrap();
        assert_eq!(
            bridge.create_native_string("c"),
            Err(Error::OutOfMemory { live: 2 })
        );
        bridge.release(a).unwrap();
        bridge.release(b).unwrap();
    }
}
