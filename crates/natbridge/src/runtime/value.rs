//! Native-side values.
//!
//! A [`Value`] is what native code passes to and receives from a message
//! send or closure call. Objects travel as handles; the marshaler resolves
//! them to managed counterparts on the way in.

use crate::runtime::Handle;
use crate::runtime::encoding::Kind;

/// A value on the native side of the bridge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// No value.
    Void,
    /// `B`
    Bool(bool),
    /// `c`
    Byte(i8),
    /// `S`
    Char(u16),
    /// `s`
    Short(i16),
    /// `i`
    Int(i32),
    /// `q`
    Long(i64),
    /// `f`
    Float(f32),
    /// `d`
    Double(f64),
    /// `@`, possibly null.
    Object(Handle),
}

impl Value {
    /// Returns the kind of this value.
    #[must_use]
    pub const fn kind(&self) -> Kind {
        match self {
            Value::Void => Kind::Void,
            Value::Bool(_) => Kind::Bool,
            Value::Byte(_) => Kind::Byte,
            Value::Char(_) => Kind::Char,
            Value::Short(_) => Kind::Short,
            Value::Int(_) => Kind::Int,
            Value::Long(_) => Kind::Long,
            Value::Float(_) => Kind::Float,
            Value::Double(_) => Kind::Double,
            Value::Object(_) => Kind::Object,
        }
    }

    /// Returns the zero value of `kind`.
    ///
    /// This is what a closure call with no failure channel returns when the
    /// managed side throws.
    #[must_use]
    pub const fn default_for(kind: Kind) -> Value {
        match kind {
            Kind::Void => Value::Void,
            Kind::Bool => Value::Bool(false),
            Kind::Byte => Value::Byte(0),
            Kind::Char => Value::Char(0),
            Kind::Short => Value::Short(0),
            Kind::Int => Value::Int(0),
            Kind::Long => Value::Long(0),
            Kind::Float => Value::Float(0.0),
            Kind::Double => Value::Double(0.0),
            Kind::Object => Value::Object(Handle::NULL),
        }
    }

    /// Returns the handle if this is an object value.
    #[must_use]
    pub const fn as_object(&self) -> Option<Handle> {
        match self {
            Value::Object(h) => Some(*h),
            _ => None,
        }
    }
}

/// A Rust type that a typed forwarder can return.
///
/// Implemented for the ten forwarder return types: `bool`, `i8`, `u16`,
/// `i16`, `i32`, `i64`, `f32`, `f64`, [`Handle`] and `()`.
pub trait NativeReturn: Sized {
    /// The kind a descriptor must declare to be called through this type.
    const KIND: Kind;

    /// Extracts the Rust value. Returns `None` if the kinds disagree.
    fn from_value(value: Value) -> Option<Self>;
}

macro_rules! native_return {
    ($($ty:ty => $kind:ident($pat:pat) => $out:expr;)*) => {
        $(
            impl NativeReturn for $ty {
                const KIND: Kind = Kind::$kind;

                fn from_value(value: Value) -> Option<Self> {
                    match value {
                        Value::$kind($pat) => Some($out),
                        _ => None,
                    }
                }
            }
        )*
    };
}

native_return! {
    bool => Bool(v) => v;
    i8 => Byte(v) => v;
    u16 => Char(v) => v;
    i16 => Short(v) => v;
    i32 => Int(v) => v;
    i64 => Long(v) => v;
    f32 => Float(v) => v;
    f64 => Double(v) => v;
    Handle => Object(v) => v;
}

impl NativeReturn for () {
    const KIND: Kind = Kind::Void;

    fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Void => Some(()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_kind() {
        for kind in Kind::ALL {
            assert_eq!(Value::default_for(kind).kind(), kind);
        }
    }

    #[test]
    fn test_native_return_extraction() {
        assert_eq!(i32::from_value(Value::Int(7)), Some(7));
        assert_eq!(i32::from_value(Value::Long(7)), None);
        assert_eq!(<()>::from_value(Value::Void), Some(()));
        assert_eq!(
            Handle::from_value(Value::Object(Handle::from_raw(0x2000))),
            Some(Handle::from_raw(0x2000))
        );
        assert_eq!(u16::KIND, Kind::Char);
    }
}
