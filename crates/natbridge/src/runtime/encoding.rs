//! Value kinds and method signature encodings.
//!
//! Every value that crosses the bridge has one of ten kinds: eight
//! primitives, a generic object, and void. Signatures use the familiar
//! one-character-per-type encoding with the receiver and selector in
//! positions one and two:
//!
//! | Kind   | Code | Managed     | Native  |
//! |--------|------|-------------|---------|
//! | Bool   | `B`  | `boolean`   | `bool`  |
//! | Byte   | `c`  | `byte`      | `i8`    |
//! | Char   | `S`  | `char`      | `u16`   |
//! | Short  | `s`  | `short`     | `i16`   |
//! | Int    | `i`  | `int`       | `i32`   |
//! | Long   | `q`  | `long`      | `i64`   |
//! | Float  | `f`  | `float`     | `f32`   |
//! | Double | `d`  | `double`    | `f64`   |
//! | Object | `@`  | reference   | handle  |
//! | Void   | `v`  | `void`      | -       |
//!
//! `"i@:ii"` is a method returning `int` and taking two `int`s.

use crate::error::{Error, Result};
use std::fmt;

/// The kind of a value crossing the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// `B`
    Bool,
    /// `c`
    Byte,
    /// `S`, a UTF-16 code unit.
    Char,
    /// `s`
    Short,
    /// `i`
    Int,
    /// `q`
    Long,
    /// `f`
    Float,
    /// `d`
    Double,
    /// `@`
    Object,
    /// `v`, only valid as a return kind.
    Void,
}

impl Kind {
    /// All kinds, in forwarder order.
    pub const ALL: [Kind; 10] = [
        Kind::Bool,
        Kind::Byte,
        Kind::Char,
        Kind::Short,
        Kind::Int,
        Kind::Long,
        Kind::Float,
        Kind::Double,
        Kind::Object,
        Kind::Void,
    ];

    /// Returns the one-character encoding of this kind.
    #[must_use]
    pub const fn encoding(self) -> char {
        match self {
            Kind::Bool => 'B',
            Kind::Byte => 'c',
            Kind::Char => 'S',
            Kind::Short => 's',
            Kind::Int => 'i',
            Kind::Long => 'q',
            Kind::Float => 'f',
            Kind::Double => 'd',
            Kind::Object => '@',
            Kind::Void => 'v',
        }
    }

    /// Parses a one-character encoding.
    #[must_use]
    pub const fn from_encoding(code: char) -> Option<Kind> {
        match code {
            'B' => Some(Kind::Bool),
            'c' => Some(Kind::Byte),
            'S' => Some(Kind::Char),
            's' => Some(Kind::Short),
            'i' => Some(Kind::Int),
            'q' => Some(Kind::Long),
            'f' => Some(Kind::Float),
            'd' => Some(Kind::Double),
            '@' => Some(Kind::Object),
            'v' => Some(Kind::Void),
            _ => None,
        }
    }

    /// Returns whether this kind is one of the eight primitives.
    #[must_use]
    pub const fn is_primitive(self) -> bool {
        !matches!(self, Kind::Object | Kind::Void)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Kind::Bool => "bool",
            Kind::Byte => "byte",
            Kind::Char => "char",
            Kind::Short => "short",
            Kind::Int => "int",
            Kind::Long => "long",
            Kind::Float => "float",
            Kind::Double => "double",
            Kind::Object => "object",
            Kind::Void => "void",
        };
        f.write_str(name)
    }
}

/// A method signature: return kind plus ordered argument kinds.
///
/// The receiver and selector are implicit and not part of `args`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    ret: Kind,
    args: Vec<Kind>,
}

impl Signature {
    /// Creates a signature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEncoding`] if an argument kind is `Void`.
    pub fn new(ret: Kind, args: impl Into<Vec<Kind>>) -> Result<Self> {
        let args = args.into();
        if args.contains(&Kind::Void) {
            return Err(Error::InvalidEncoding {
                encoding: encode(ret, &args),
            });
        }
        Ok(Signature { ret, args })
    }

    /// Parses an encoding such as `"i@:ii"`.
    ///
    /// ```
    /// use natbridge::runtime::encoding::{Kind, Signature};
    ///
    /// let sig = Signature::parse("d@:iq").unwrap();
    /// assert_eq!(sig.return_kind(), Kind::Double);
    /// assert_eq!(sig.arg_kinds(), &[Kind::Int, Kind::Long]);
    /// assert!(Signature::parse("i:").is_err());
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidEncoding`] if the string is empty, lacks the
    /// receiver and selector markers, uses an unknown code, or declares a
    /// `void` argument.
    pub fn parse(encoding: &str) -> Result<Self> {
        let invalid = || Error::InvalidEncoding {
            encoding: encoding.to_string(),
        };

        let mut chars = encoding.chars();
        let ret = chars.next().and_then(Kind::from_encoding).ok_or_else(invalid)?;

        if chars.next() != Some('@') || chars.next() != Some(':') {
            return Err(invalid());
        }

        let args = chars
            .map(|c| match Kind::from_encoding(c) {
                Some(Kind::Void) | None => Err(invalid()),
                Some(kind) => Ok(kind),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Signature { ret, args })
    }

    /// Returns the return kind.
    #[must_use]
    pub fn return_kind(&self) -> Kind {
        self.ret
    }

    /// Returns the argument kinds.
    #[must_use]
    pub fn arg_kinds(&self) -> &[Kind] {
        &self.args
    }

    /// Returns the number of explicit arguments.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.args.len()
    }

    /// Checks a list of argument kinds against this signature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ArgumentCountMismatch`] or
    /// [`Error::ArgumentTypeMismatch`].
    pub fn check_args(&self, actual: impl ExactSizeIterator<Item = Kind>) -> Result<()> {
        if actual.len() != self.args.len() {
            return Err(Error::ArgumentCountMismatch {
                expected: self.args.len(),
                got: actual.len(),
            });
        }

        for (index, (expected, got)) in self.args.iter().zip(actual).enumerate() {
            if *expected != got {
                return Err(Error::ArgumentTypeMismatch {
                    expected: expected.encoding(),
                    got: got.encoding(),
                    index,
                });
            }
        }

        Ok(())
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self.ret, &self.args))
    }
}

fn encode(ret: Kind, args: &[Kind]) -> String {
    let mut out = String::with_capacity(args.len() + 3);
    out.push(ret.encoding());
    out.push_str("@:");
    out.extend(args.iter().map(|k| k.encoding()));
    out
}
