//! Bind parameter and column values.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::catalog::ColumnType;

/// A SQL value exchanged with a connection.
///
/// Floats compare and hash by bit pattern so values can key identity maps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// SQL `NULL`.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Text.
    Text(String),
    /// Binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Check if the value is `NULL`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get the value as an integer, if it is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Normalize a value read back from a driver to a column's type.
    ///
    /// Engines without a native boolean return integers for boolean
    /// columns, and integral floats may come back as integers.
    pub fn decode(self, column_type: ColumnType) -> Value {
        match (column_type, self) {
            (ColumnType::Boolean, Value::Int(v)) => Value::Bool(v != 0),
            (ColumnType::Float, Value::Int(v)) => Value::Float(v as f64),
            (_, value) => value,
        }
    }

    /// Get the value as text, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => {}
            Value::Bool(v) => v.hash(state),
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Text(v) => v.hash(state),
            Value::Bytes(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => write!(f, "'{}'", v),
            Value::Bytes(v) => write!(f, "x'{}'", hex::encode(v)),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Render parameters for log output.
pub(crate) fn display_params(params: &[Value]) -> String {
    let rendered: Vec<String> = params.iter().map(|p| p.to_string()).collect();
    format!("[{}]", rendered.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_decode_by_column_type() {
        assert_eq!(Value::Int(1).decode(ColumnType::Boolean), Value::Bool(true));
        assert_eq!(Value::Int(0).decode(ColumnType::Boolean), Value::Bool(false));
        assert_eq!(Value::Int(3).decode(ColumnType::Float), Value::Float(3.0));
        assert_eq!(Value::Int(3).decode(ColumnType::Integer), Value::Int(3));
        assert_eq!(Value::Null.decode(ColumnType::Boolean), Value::Null);
        assert_eq!(Value::from("x").decode(ColumnType::Text), Value::from("x"));
    }

    #[test]
    fn test_json_shape() {
        let values = vec![Value::Int(1), Value::from("a"), Value::Null, Value::Bool(true)];
        assert_eq!(serde_json::to_string(&values).unwrap(), r#"[1,"a",null,true]"#);
        let back: Vec<Value> = serde_json::from_str(r#"[1,"a",null,true,1.5]"#).unwrap();
        assert_eq!(back[0], Value::Int(1));
        assert_eq!(back[4], Value::Float(1.5));
    }

    #[test]
    fn test_values_key_sets() {
        let mut seen = HashSet::new();
        assert!(seen.insert(vec![Value::Int(1), Value::from("x")]));
        assert!(!seen.insert(vec![Value::Int(1), Value::from("x")]));
        assert!(seen.insert(vec![Value::Float(0.5)]));
        assert!(!seen.insert(vec![Value::Float(0.5)]));
    }

    #[test]
    fn test_display() {
        assert_eq!(display_params(&[Value::Int(3), Value::from("t"), Value::Null]), "[3, 't', NULL]");
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::Bytes(vec![0xab]).to_string(), "x'ab'");
    }
}
