//! Value payloads carried by scalar properties
//!
//! The kernel never interprets a scalar value; it only stores, snapshots and
//! compares it. The enum is closed: seven variants, no implicit coercions.
//!
//! ## Type Rules
//!
//! - Different types are NEVER equal: `Int(1) != Float(1.0)`
//! - `Bytes` are not `String`
//! - Float uses IEEE-754 equality: `NaN != NaN`, `-0.0 == 0.0`

use serde::{Deserialize, Serialize};

/// Opaque value payload of a scalar property
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point (IEEE-754)
    Float(f64),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Array of values
    Array(Vec<Value>),
}

// Custom PartialEq implementation for IEEE-754 float semantics
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // IEEE-754: NaN != NaN, -0.0 == 0.0
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            // Different types are never equal
            _ => false,
        }
    }
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::Array(_) => "Array",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as bool if this is a Bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as f64 if this is a Float value
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as &[u8] if this is a Bytes value
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Get as &[Value] if this is an Array value
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Estimated deep memory footprint in bytes
    ///
    /// Used for transaction memory accounting; an estimate, not an exact
    /// allocator measurement.
    pub fn mem_size(&self) -> usize {
        let inline = std::mem::size_of::<Value>();
        match self {
            Value::String(s) => inline + s.len(),
            Value::Bytes(b) => inline + b.len(),
            Value::Array(a) => inline + a.iter().map(Value::mem_size).sum::<usize>(),
            _ => inline,
        }
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

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Value::Bytes(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Value::Null.type_name(), "Null");
        assert_eq!(Value::Int(1).type_name(), "Int");
        assert_eq!(Value::Array(vec![]).type_name(), "Array");
    }

    #[test]
    fn test_no_cross_type_equality() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Bytes(b"hello".to_vec()), Value::String("hello".into()));
        assert_ne!(Value::Null, Value::Bool(false));
    }

    #[test]
    fn test_float_ieee754_equality() {
        assert_ne!(Value::Float(f64::NAN), Value::Float(f64::NAN));
        assert_eq!(Value::Float(-0.0), Value::Float(0.0));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::Int(42).as_int(), Some(42));
        assert_eq!(Value::Int(42).as_float(), None);
        assert_eq!(Value::from("hi").as_str(), Some("hi"));
        assert!(Value::Null.is_null());
    }

    #[test]
    fn test_mem_size_grows_with_payload() {
        let small = Value::String("a".into());
        let big = Value::String("a".repeat(1000));
        assert!(big.mem_size() > small.mem_size());
        assert!(big.mem_size() >= 1000);
    }

    #[test]
    fn test_serde_roundtrip() {
        let v = Value::Array(vec![Value::Int(1), Value::from("x"), Value::Null]);
        let json = serde_json::to_string(&v).unwrap();
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v, back);
    }
}
