//! Error types for the natbridge runtime.
//!
//! Every fallible bridge operation returns [`Result`]. Lookups that simply
//! find nothing (no association, no class by that name) are not errors and
//! return an empty sentinel instead.

use crate::runtime::Handle;
use crate::runtime::managed::ManagedException;
use std::fmt;

/// Broad classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Handle misuse or a broken calling convention. Never tolerated.
    Programmer,
    /// The native side could not allocate.
    ResourceExhaustion,
    /// A managed type cannot be mapped onto the requested native class.
    Configuration,
    /// Managed code threw while servicing a native call.
    ManagedException,
}

/// Errors that can occur in the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A null handle was passed where an object is required.
    NullHandle,

    /// The handle does not name a live object or class.
    InvalidHandle {
        /// The offending handle.
        handle: Handle,
    },

    /// An object handle was passed where a class handle is required.
    NotAClass {
        /// The offending handle.
        handle: Handle,
    },

    /// Reference count overflow detected.
    RefCountOverflow,

    /// Release of an object whose count is already zero.
    OverRelease {
        /// The object.
        handle: Handle,
    },

    /// The class was not produced by the proxy class generator.
    NotAProxyClass {
        /// The class.
        class: Handle,
    },

    /// The object is not a block.
    NotABlock {
        /// The object.
        handle: Handle,
    },

    /// The block was not created from a managed instance.
    NotAManagedBlock {
        /// The block.
        handle: Handle,
    },

    /// The object is not a cast proxy.
    NotACastProxy {
        /// The object.
        handle: Handle,
    },

    /// The object is not a string.
    NotAString {
        /// The object.
        handle: Handle,
    },

    /// A forwarded call found no managed object to run on.
    NoManagedTarget {
        /// The native peer.
        handle: Handle,
    },

    /// No native class with this name is registered.
    UnknownClass {
        /// The class name.
        name: String,
    },

    /// The native base cannot host the requested managed type.
    IncompatibleBaseClass {
        /// Name of the class being created.
        class: String,
        /// Name of the base class.
        base: String,
        /// Why the base was rejected.
        reason: &'static str,
    },

    /// `Inherited` and `Hybrid` were requested together.
    IncompatibleClassFlags {
        /// The raw flag bits.
        flags: u8,
    },

    /// The managed type has no native representation.
    UnsupportedManagedType {
        /// The managed type name.
        name: String,
    },

    /// The managed type needs a constructor but has none.
    MissingConstructor {
        /// The managed type name.
        name: String,
    },

    /// Class name already exists in the native runtime.
    ClassAlreadyExists {
        /// The class name.
        name: String,
    },

    /// Invalid type encoding string.
    InvalidEncoding {
        /// The encoding.
        encoding: String,
    },

    /// Selector not found in class or inheritance chain.
    SelectorNotFound {
        /// The selector name.
        selector: String,
        /// The receiver's class name.
        class: String,
    },

    /// Argument count mismatch for method signature.
    ArgumentCountMismatch {
        /// Expected number of arguments
        expected: usize,
        /// Actual number of arguments provided
        got: usize,
    },

    /// Argument type mismatch for method signature.
    ArgumentTypeMismatch {
        /// Expected type encoding
        expected: char,
        /// Actual type encoding
        got: char,
        /// Argument index
        index: usize,
    },

    /// A method returned a value of the wrong kind.
    ReturnKindMismatch {
        /// Declared return encoding
        expected: char,
        /// Actual return encoding
        got: char,
    },

    /// A typed forwarder was called with a descriptor of another return kind.
    SignatureMismatch {
        /// The forwarder's return encoding.
        forwarder: char,
        /// The descriptor's return encoding.
        descriptor: char,
    },

    /// The callback data handle is unknown.
    InvalidCallbackData {
        /// The data handle.
        data: u64,
    },

    /// An init target is already pending on this thread.
    InitTargetAlreadySet,

    /// The pool marker is not open on this thread.
    InvalidPool {
        /// The marker.
        marker: Handle,
    },

    /// The calling thread does not hold the object's monitor.
    NotLockOwner {
        /// The object.
        handle: Handle,
    },

    /// Managed code threw.
    ManagedException(ManagedException),

    /// The live object limit was reached.
    OutOfMemory {
        /// Number of live objects at the time of the failure.
        live: usize,
    },

    /// The process-wide bridge has not been initialized.
    NotInitialized,

    /// The bridge has been shut down.
    ShutDown,
}

impl Error {
    /// Returns the broad classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnknownClass { .. }
            | Error::IncompatibleBaseClass { .. }
            | Error::IncompatibleClassFlags { .. }
            | Error::UnsupportedManagedType { .. }
            | Error::MissingConstructor { .. }
            | Error::ClassAlreadyExists { .. } => ErrorKind::Configuration,
            Error::OutOfMemory { .. } => ErrorKind::ResourceExhaustion,
            Error::ManagedException(_) => ErrorKind::ManagedException,
            _ => ErrorKind::Programmer,
        }
    }

    /// Returns the managed exception, if this error carries one.
    #[must_use]
    pub fn managed_exception(&self) -> Option<&ManagedException> {
        match self {
            Error::ManagedException(exc) => Some(exc),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NullHandle => write!(f, "null handle where an object is required"),
            Error::InvalidHandle { handle } => write!(f, "invalid handle: {handle}"),
            Error::NotAClass { handle } => write!(f, "handle {handle} is not a class"),
            Error::RefCountOverflow => write!(f, "reference count overflow"),
            Error::OverRelease { handle } => {
                write!(f, "object {handle} released more times than retained")
            }
            Error::NotAProxyClass { class } => {
                write!(f, "class {class} was not generated as a proxy class")
            }
            Error::NotABlock { handle } => write!(f, "object {handle} is not a block"),
            Error::NotAManagedBlock { handle } => {
                write!(f, "block {handle} was not created from a managed instance")
            }
            Error::NotACastProxy { handle } => {
                write!(f, "object {handle} is not a cast proxy")
            }
            Error::NotAString { handle } => write!(f, "object {handle} is not a string"),
            Error::NoManagedTarget { handle } => {
                write!(f, "object {handle} has no managed object to forward to")
            }
            Error::UnknownClass { name } => write!(f, "unknown native class: {name}"),
            Error::IncompatibleBaseClass { class, base, reason } => {
                write!(f, "cannot derive {class} from {base}: {reason}")
            }
            Error::IncompatibleClassFlags { flags } => {
                write!(f, "incompatible class flags: {flags:#x}")
            }
            Error::UnsupportedManagedType { name } => {
                write!(f, "managed type {name} has no native representation")
            }
            Error::MissingConstructor { name } => {
                write!(f, "managed type {name} has no constructor")
            }
            Error::ClassAlreadyExists { name } => write!(f, "class already exists: {name}"),
            Error::InvalidEncoding { encoding } => {
                write!(f, "invalid type encoding: {encoding:?}")
            }
            Error::SelectorNotFound { selector, class } => {
                write!(f, "{class} does not respond to {selector}")
            }
            Error::ArgumentCountMismatch { expected, got } => {
                write!(f, "argument count mismatch: expected {expected}, got {got}")
            }
            Error::ArgumentTypeMismatch {
                expected,
                got,
                index,
            } => write!(
                f,
                "argument type mismatch at index {index}: expected '{expected}', got '{got}'"
            ),
            Error::ReturnKindMismatch { expected, got } => {
                write!(f, "return kind mismatch: expected '{expected}', got '{got}'")
            }
            Error::SignatureMismatch {
                forwarder,
                descriptor,
            } => write!(
                f,
                "forwarder returning '{forwarder}' called with a descriptor returning '{descriptor}'"
            ),
            Error::InvalidCallbackData { data } => {
                write!(f, "invalid callback data: {data:#x}")
            }
            Error::InitTargetAlreadySet => {
                write!(f, "an init target is already pending on this thread")
            }
            Error::InvalidPool { marker } => {
                write!(f, "autorelease pool {marker} is not open on this thread")
            }
            Error::NotLockOwner { handle } => {
                write!(f, "current thread does not hold the monitor of {handle}")
            }
            Error::ManagedException(exc) => write!(f, "{}", exc.full_trace()),
            Error::OutOfMemory { live } => {
                write!(f, "out of memory: {live} live objects")
            }
            Error::NotInitialized => write!(f, "bridge not initialized"),
            Error::ShutDown => write!(f, "bridge has been shut down"),
        }
    }
}

impl std::error::Error for Error {}

impl From<ManagedException> for Error {
    fn from(exc: ManagedException) -> Self {
        Error::ManagedException(exc)
    }
}

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;
