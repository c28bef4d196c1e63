//! Runtime-typed argument values and reply coercion.
//!
//! Controllers send argument overrides as strings. [`ArgValue::coerce_from`]
//! converts such a string to the runtime type of the argument it replaces,
//! or reports why it cannot.

use std::fmt;

/// Runtime-typed value of one argument (or of a return value).
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// Null reference.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Unsigned integer.
    UInt(u64),
    /// Floating point.
    Float(f64),
    /// Single character.
    Char(char),
    /// String.
    Str(String),
    /// Any other host object, identified by type name and display text.
    Object {
        /// Fully qualified runtime type name.
        type_name: String,
        /// Human-readable rendering.
        display: String,
    },
}

/// Why a reply value could not replace an argument.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoerceError {
    /// The string does not parse as the target type.
    #[error("cannot convert {value:?} to {target}")]
    Parse {
        /// Raw value from the reply.
        value: String,
        /// Name of the target type.
        target: &'static str,
    },

    /// The original argument is null, so it has no runtime type to target.
    #[error("original argument is null; no target type")]
    NullTarget,

    /// The original argument is an opaque host object.
    #[error("cannot convert a string to host type {0}")]
    Unsupported(String),
}

impl ArgValue {
    /// Short name of the runtime type.
    pub fn type_name(&self) -> &str {
        match self {
            ArgValue::Null => "null",
            ArgValue::Bool(_) => "bool",
            ArgValue::Int(_) => "int",
            ArgValue::UInt(_) => "uint",
            ArgValue::Float(_) => "float",
            ArgValue::Char(_) => "char",
            ArgValue::Str(_) => "string",
            ArgValue::Object { type_name, .. } => type_name,
        }
    }

    /// Convert `raw` to a value of the same runtime type as `self`.
    pub fn coerce_from(&self, raw: &str) -> Result<ArgValue, CoerceError> {
        let parse_err = |target| CoerceError::Parse {
            value: raw.to_string(),
            target,
        };
        let trimmed = raw.trim();
        match self {
            ArgValue::Null => Err(CoerceError::NullTarget),
            ArgValue::Bool(_) => {
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(ArgValue::Bool(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(ArgValue::Bool(false))
                } else {
                    Err(parse_err("bool"))
                }
            }
            ArgValue::Int(_) => trimmed
                .parse()
                .map(ArgValue::Int)
                .map_err(|_e| parse_err("int")),
            ArgValue::UInt(_) => trimmed
                .parse()
                .map(ArgValue::UInt)
                .map_err(|_e| parse_err("uint")),
            ArgValue::Float(_) => trimmed
                .parse()
                .map(ArgValue::Float)
                .map_err(|_e| parse_err("float")),
            ArgValue::Char(_) => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(ArgValue::Char(c)),
                    _ => Err(parse_err("char")),
                }
            }
            ArgValue::Str(_) => Ok(ArgValue::Str(raw.to_string())),
            ArgValue::Object { type_name, .. } => Err(CoerceError::Unsupported(type_name.clone())),
        }
    }
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Null => f.write_str(crate::constants::NULL_SENTINEL),
            ArgValue::Bool(v) => write!(f, "{v}"),
            ArgValue::Int(v) => write!(f, "{v}"),
            ArgValue::UInt(v) => write!(f, "{v}"),
            ArgValue::Float(v) => write!(f, "{v}"),
            ArgValue::Char(v) => write!(f, "{v}"),
            ArgValue::Str(v) => f.write_str(v),
            ArgValue::Object { display, .. } => f.write_str(display),
        }
    }
}

impl From<bool> for ArgValue {
    fn from(v: bool) -> Self {
        ArgValue::Bool(v)
    }
}

impl From<i64> for ArgValue {
    fn from(v: i64) -> Self {
        ArgValue::Int(v)
    }
}

impl From<i32> for ArgValue {
    fn from(v: i32) -> Self {
        ArgValue::Int(i64::from(v))
    }
}

impl From<u64> for ArgValue {
    fn from(v: u64) -> Self {
        ArgValue::UInt(v)
    }
}

impl From<f64> for ArgValue {
    fn from(v: f64) -> Self {
        ArgValue::Float(v)
    }
}

impl From<char> for ArgValue {
    fn from(v: char) -> Self {
        ArgValue::Char(v)
    }
}

impl From<&str> for ArgValue {
    fn from(v: &str) -> Self {
        ArgValue::Str(v.to_string())
    }
}

impl From<String> for ArgValue {
    fn from(v: String) -> Self {
        ArgValue::Str(v)
    }
}

impl<T: Into<ArgValue>> From<Option<T>> for ArgValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(ArgValue::Null, Into::into)
    }
}
