//! `natbridge`: a lifetime and message bridge between a reference-counted
//! dynamic object runtime and a garbage-collected managed runtime.
//!
//! The native side has classes, selectors, closures ("blocks"), protocols
//! and thread-scoped autorelease pools. The managed side has types,
//! methods, interfaces and a collector. The bridge lets each side hold,
//! message and subclass objects of the other:
//!
//! - **Reference bridging**: retain/release/autorelease, weak slots and
//!   per-object monitors, reconciled with managed ownership
//! - **Associations**: managed objects attached to native objects, released
//!   exactly once
//! - **Class synthesis**: native classes generated for managed subclasses
//!   and proxies, built through a pluggable [`ClassFactory`](runtime::ClassFactory)
//! - **Call forwarding**: typed forwarders for every primitive return kind
//!   plus objects, for both closures and protocol methods
//!
//! # Architecture
//!
//! - [`runtime`]: the [`Bridge`] value and everything it owns
//! - [`api`]: a process-wide bridge behind raw 64-bit handles, for the
//!   foreign-function boundary
//! - [`config`]: [`BridgeConfig`]
//! - [`error`]: [`Error`], [`ErrorKind`] and [`Result`]
//!
//! # Example
//!
//! ```
//! use natbridge::runtime::encoding::Signature;
//! use natbridge::runtime::managed::{ManagedMethod, ManagedObject, ManagedType, ManagedValue};
//! use natbridge::runtime::Value;
//! use natbridge::{Bridge, BridgeConfig};
//! use std::sync::Arc;
//!
//! let bridge = Bridge::new(BridgeConfig::default());
//!
//! // A managed closure exposed to native code as a block.
//! let apply = Arc::new(ManagedMethod::new(
//!     "applyAsInt",
//!     Signature::parse("i@:ii").unwrap(),
//!     |call| Ok(ManagedValue::Int(call.arg(0).as_int().unwrap() * call.arg(1).as_int().unwrap())),
//! ));
//! let op = ManagedObject::stateless(&ManagedType::builder("IntBinaryOperator").build());
//! let block = bridge.create_native_callback_from_java_instance(&op, &apply).unwrap();
//! let data = bridge.create_data_for_native_block(&apply);
//!
//! let product = bridge
//!     .forward_int_block_call(block, data, &[Value::Int(6), Value::Int(7)])
//!     .unwrap();
//! assert_eq!(product, 42);
//!
//! bridge.release(block).unwrap();
//! assert_eq!(bridge.live_object_count(), 0);
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod runtime;

// Re-export commonly used types
pub use config::{BridgeConfig, VariadicUnboxPolicy};
pub use error::{Error, ErrorKind, Result};
pub use runtime::{
    AssociationCategory, Bridge, ClassDescriptor, ClassFlags, Handle, InitTargetGuard,
    ManagedException, ManagedObject, ManagedRef, ManagedType, ManagedValue, Selector, Signature,
    Value, WeakSlot,
};
