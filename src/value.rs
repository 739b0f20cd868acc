//! Host values passed to and returned from bound calls

use crate::types::TypeTag;
use std::fmt;

/// Dynamically typed host value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f64),
    Str(String),
    Unicode(String),
}

impl Value {
    /// Runtime type tag of the value
    #[inline]
    pub const fn type_tag(&self) -> TypeTag {
        match self {
            Self::None => TypeTag::None,
            Self::Bool(_) => TypeTag::Bool,
            Self::Int(_) => TypeTag::Int,
            Self::Long(_) => TypeTag::Long,
            Self::Float(_) => TypeTag::Float,
            Self::Str(_) => TypeTag::Str,
            Self::Unicode(_) => TypeTag::Unicode,
        }
    }

    /// Parse `text` as a value of type `tag`
    pub fn parse(tag: TypeTag, text: &str) -> Result<Self, String> {
        let bad = |e: &dyn fmt::Display| format!("cannot parse '{}' as {}: {}", text, tag, e);
        match tag {
            TypeTag::None => Ok(Self::None),
            TypeTag::Bool => match text {
                "true" | "True" | "1" => Ok(Self::Bool(true)),
                "false" | "False" | "0" => Ok(Self::Bool(false)),
                _ => Err(bad(&"expected true or false")),
            },
            TypeTag::Int => text.parse().map(Self::Int).map_err(|e| bad(&e)),
            TypeTag::Long => text.parse().map(Self::Long).map_err(|e| bad(&e)),
            TypeTag::Float => text.parse().map(Self::Float).map_err(|e| bad(&e)),
            TypeTag::Str => Ok(Self::Str(text.to_string())),
            TypeTag::Unicode => Ok(Self::Unicode(text.to_string())),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integral value, widening `Int`
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(i64::from(*i)),
            Self::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) | Self::Unicode(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Bool(b) => f.write_str(if *b { "True" } else { "False" }),
            Self::Int(i) => write!(f, "{}", i),
            Self::Long(l) => write!(f, "{}L", l),
            Self::Float(x) => write!(f, "{:?}", x),
            Self::Str(s) => write!(f, "{:?}", s),
            Self::Unicode(s) => write!(f, "u{:?}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Self::Long(l)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

/// Runtime type tags of a list of values
pub fn type_tags(values: &[Value]) -> Vec<TypeTag> {
    values.iter().map(Value::type_tag).collect()
}
