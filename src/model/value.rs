use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Represents an attribute value, either wire-shaped or coerced.
///
/// Wire data only ever produces `Int`, `Float`, `String`, `Boolean` and
/// `Null`. The remaining variants are the result of coercion.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Value {
    /// Signed 64-bit integer.
    Int(i64),
    /// Floating point value.
    Float(f64),
    /// Exact decimal value.
    Decimal(Decimal),
    /// String value.
    String(String),
    /// Boolean value.
    Boolean(bool),
    /// UTC timestamp.
    Date(DateTime<Utc>),
    /// Raw bytes.
    Binary(Vec<u8>),
    /// Null value.
    Null,
}

/// Attribute name.
pub type Attribute = String;

/// Last known server-shaped attribute values of one record.
pub type RawData = HashMap<Attribute, Value>;

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Value::Date(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_decimal(&self) -> Option<&Decimal> {
        match self {
            Value::Decimal(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Convert to JSON for transport.
    ///
    /// Typed variants use their canonical text form; attribute types give
    /// finer control through [`AttributeType::serialize`](crate::model::attributetype::AttributeType::serialize).
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Int(i) => JsonValue::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Decimal(d) => JsonValue::String(d.to_string()),
            Value::String(s) => JsonValue::String(s.clone()),
            Value::Boolean(b) => JsonValue::Bool(*b),
            Value::Date(d) => JsonValue::String(d.to_rfc3339()),
            Value::Binary(bytes) => {
                JsonValue::Array(bytes.iter().map(|b| JsonValue::from(*b)).collect())
            }
            Value::Null => JsonValue::Null,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::String(s) => f.write_str(s),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Date(d) => f.write_str(&d.to_rfc3339()),
            Value::Binary(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::Null => f.write_str("null"),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Date(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Identity value of a record within its type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Int(i64),
    String(String),
}

impl PrimaryKey {
    /// Interpret an attribute value as a key.
    ///
    /// Only integers and non-empty strings identify a record.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(PrimaryKey::Int(*i)),
            Value::String(s) if !s.trim().is_empty() => Some(PrimaryKey::String(s.clone())),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            PrimaryKey::Int(i) => Value::Int(*i),
            PrimaryKey::String(s) => Value::String(s.clone()),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            PrimaryKey::Int(i) => JsonValue::from(*i),
            PrimaryKey::String(s) => JsonValue::String(s.clone()),
        }
    }
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Int(i) => write!(f, "{i}"),
            PrimaryKey::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(value: i64) -> Self {
        PrimaryKey::Int(value)
    }
}

impl From<i32> for PrimaryKey {
    fn from(value: i32) -> Self {
        PrimaryKey::Int(i64::from(value))
    }
}

impl From<&str> for PrimaryKey {
    fn from(value: &str) -> Self {
        PrimaryKey::String(value.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(value: String) -> Self {
        PrimaryKey::String(value)
    }
}

impl PartialEq<i64> for PrimaryKey {
    fn eq(&self, other: &i64) -> bool {
        matches!(self, PrimaryKey::Int(i) if i == other)
    }
}

impl PartialEq<&str> for PrimaryKey {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, PrimaryKey::String(s) if s == other)
    }
}
