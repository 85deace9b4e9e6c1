//! Value types flowing through expression trees.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

/// Type tag attached to every primitive input/output and terminal.
///
/// The set is closed: there is no implicit coercion between types, so
/// bridging (integer to float, say) must be registered as a primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Type {
    /// Boolean.
    Bool,
    /// Signed 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
    /// Text label.
    Text,
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "text",
        };
        f.write_str(name)
    }
}

/// A typed runtime value.
///
/// Floats compare by bit pattern, so a NaN constant equals itself and a
/// tree holding one still matches its terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(#[serde(with = "crate::gp::float_repr::scalar")] f64),
    /// Text label.
    Text(String),
}

impl Value {
    /// The type of this value.
    #[must_use]
    pub fn ty(&self) -> Type {
        match self {
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::Text(_) => Type::Text,
        }
    }

    /// Boolean payload, if this is a `Bool`.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer payload, if this is an `Int`.
    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Float payload, if this is a `Float`.
    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Text payload, if this is a `Text`.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            // Debug keeps the trailing `.0` on whole floats
            Self::Float(x) => write!(f, "{x:?}"),
            Self::Text(s) => write_text(f, s),
        }
    }
}

/// Quote `s`, escaping exactly the characters the tree parser decodes.
fn write_text(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\""),
            '\\' => f.write_str("\\\\"),
            '\n' => f.write_str("\\n"),
            '\t' => f.write_str("\\t"),
            '\r' => f.write_str("\\r"),
            '\0' => f.write_str("\\0"),
            _ => f.write_char(c),
        }?;
    }
    f.write_char('"')
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_types() {
        assert_eq!(Value::from(true).ty(), Type::Bool);
        assert_eq!(Value::from(3_i64).ty(), Type::Int);
        assert_eq!(Value::from(2.5).ty(), Type::Float);
        assert_eq!(Value::from("large").ty(), Type::Text);
    }

    #[test]
    fn test_value_accessors() {
        assert_eq!(Value::Int(7).as_int(), Some(7));
        assert_eq!(Value::Int(7).as_float(), None);
        assert_eq!(Value::Text("a".into()).as_text(), Some("a"));
        assert_eq!(Value::Bool(false).as_bool(), Some(false));
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Int(-4).to_string(), "-4");
        assert_eq!(Value::Text("large".into()).to_string(), "\"large\"");
        assert_eq!(Value::Text("a\rb\"\\".into()).to_string(), r#""a\rb\"\\""#);
        assert_eq!(Value::Text("é\u{1}".into()).to_string(), "\"é\u{1}\"");
    }

    #[test]
    fn test_float_values_compare_by_bits() {
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_ne!(Value::Float(0.0), Value::Float(-0.0));
        assert_ne!(Value::Float(1.0), Value::Int(1));
    }

    #[test]
    fn test_non_finite_float_serializes() {
        let values = vec![Value::Float(f64::INFINITY), Value::Float(f64::NAN), Value::Float(0.5)];
        let json = serde_json::to_string(&values).unwrap();
        assert_eq!(json, r#"[{"Float":"inf"},{"Float":"nan"},{"Float":0.5}]"#);
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, values);
    }
}
