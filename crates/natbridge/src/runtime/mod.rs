//! natbridge runtime module.
//!
//! The runtime is organized into several modules:
//!
//! - [`class`] and [`selector`]: the native object model, classes with
//!   selector-keyed dispatch tables
//! - [`managed`]: the managed object model the bridge talks to
//! - [`class_type`]: classification of native classes
//! - [`association`]: managed objects attached to native objects
//! - [`proxy`]: native classes synthesized for managed types
//! - `cast`: objects presented as instances of another class
//! - [`callback`]: typed call forwarding between the two sides
//! - [`init_target`]: thread-local construction correlation
//! - `reference`, `weak`, `autorelease`, `lock`: object lifetime
//!
//! Everything hangs off a [`Bridge`] value; the modules without a public
//! path only add methods to it.

pub mod association;
mod attach;
mod autorelease;
mod bridge;
pub mod callback;
mod cast;
pub mod class;
pub mod class_type;
mod dispatch;
pub mod encoding;
mod handle;
mod heap;
pub mod init_target;
mod instance;
mod introspection;
mod lock;
pub mod managed;
pub mod proxy;
mod reference;
pub mod selector;
mod value;
mod weak;

pub use association::{AssociationCategory, InstanceContainer};
pub use bridge::{BLOCK_CLASS, Bridge, ROOT_CLASS, STACK_BLOCK_CLASS, STRING_CLASS};
pub use callback::{CallStyle, CallTarget, CallbackDescriptor};
pub use class::{ClassKind, Imp, Method, NativeClass, NativeImp};
pub use class_type::{AllocInfo, ClassDescriptor, ClassFlags, ExtensionInfo};
pub use encoding::{Kind, Signature};
pub use handle::Handle;
pub use init_target::InitTargetGuard;
pub use managed::{
    ManagedCall, ManagedException, ManagedMethod, ManagedObject, ManagedRef, ManagedType,
    ManagedValue, TypeShape,
};
pub use proxy::{ClassFactory, ClassSpec, DispatchTableFactory};
pub use selector::Selector;
pub use value::{NativeReturn, Value};
pub use weak::WeakSlot;
