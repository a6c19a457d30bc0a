use serde::{Deserialize, Serialize};

use crate::frontend::lexer::quote_string;

/// Caller-facing result of evaluating a config entry.
///
/// Operator and reference cells never escape the machine; only these four
/// shapes are handed back. Boolean "flags" written as `0`/`1` stay integers
/// and are read with [`Value::as_bool`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// 64-bit signed integer.
    Int(i64),

    /// 64-bit floating-point number.
    Double(f64),

    /// UTF-8 string value.
    String(String),

    /// Boolean value.
    Bool(bool),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "integer",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Bool(_) => "boolean",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Int(_) | Value::Double(_))
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Numeric view; integers promote.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Double(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view. Integer flags map `0` to `false` and anything else to `true`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(n) => Some(*n != 0),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Double(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl std::fmt::Display for Value {
    /// Format a value using config-language surface syntax.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(n) => write!(f, "{}", n),
            Value::Double(x) => write!(f, "{}", x),
            Value::String(s) => f.write_str(&quote_string(s)),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_flags_read_as_bool() {
        assert_eq!(Value::Int(0).as_bool(), Some(false));
        assert_eq!(Value::Int(1).as_bool(), Some(true));
        assert_eq!(Value::Bool(true).as_bool(), Some(true));
        assert_eq!(Value::Double(1.0).as_bool(), None);
    }

    #[test]
    fn test_as_double_promotes_int() {
        assert_eq!(Value::Int(3).as_double(), Some(3.0));
        assert_eq!(Value::String("x".into()).as_double(), None);
    }

    #[test]
    fn test_display_uses_surface_syntax() {
        assert_eq!(Value::String("GFS".into()).to_string(), "\"GFS\"");
        assert_eq!(Value::Double(2.5).to_string(), "2.5");
        assert_eq!(Value::Bool(false).to_string(), "false");
    }
}
