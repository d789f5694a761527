use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::error::{Result, StoreError};
use crate::model::value::Value;

/// Converts a raw value into the attribute's typed representation.
pub type CoerceFn = Arc<dyn Fn(&Value) -> std::result::Result<Value, String> + Send + Sync>;

/// Converts a typed value back into its wire representation.
pub type SerializeFn = Arc<dyn Fn(&Value) -> Value + Send + Sync>;

/// Value an attribute reports when neither raw data nor an override exists.
#[derive(Clone)]
pub enum DefaultValue {
    /// A fixed value, shared by every read.
    Value(Arc<Value>),
    /// Evaluated on every read.
    Computed(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl DefaultValue {
    pub fn value(value: impl Into<Value>) -> Self {
        DefaultValue::Value(Arc::new(value.into()))
    }

    pub fn computed<F>(f: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        DefaultValue::Computed(Arc::new(f))
    }

    /// Resolve the default for one read.
    pub fn resolve(&self) -> Arc<Value> {
        match self {
            DefaultValue::Value(value) => Arc::clone(value),
            DefaultValue::Computed(f) => Arc::new(f()),
        }
    }
}

impl fmt::Debug for DefaultValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefaultValue::Value(value) => f.debug_tuple("Value").field(value).finish(),
            DefaultValue::Computed(_) => f.write_str("Computed(..)"),
        }
    }
}

/// A named coercion contract shared by every attribute declared with it.
///
/// `coerce` must be pure: equal raw input always yields an equal typed
/// output. `Null` bypasses both functions and stays `Null`.
pub struct AttributeType {
    name: String,
    coerce: CoerceFn,
    serialize: SerializeFn,
    default_value: Option<DefaultValue>,
}

impl AttributeType {
    /// Create a type whose serializer returns the typed value unchanged.
    pub fn new<F>(name: &str, coerce: F) -> Self
    where
        F: Fn(&Value) -> std::result::Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            coerce: Arc::new(coerce),
            serialize: Arc::new(|value: &Value| value.clone()),
            default_value: None,
        }
    }

    pub fn with_serializer<F>(mut self, serialize: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.serialize = Arc::new(serialize);
        self
    }

    pub fn with_default(mut self, default_value: DefaultValue) -> Self {
        self.default_value = Some(default_value);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn default_value(&self) -> Option<&DefaultValue> {
        self.default_value.as_ref()
    }

    pub fn coerce(&self, raw: &Value) -> std::result::Result<Value, String> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        (self.coerce)(raw)
    }

    pub fn serialize(&self, typed: &Value) -> Value {
        if typed.is_null() {
            return Value::Null;
        }
        (self.serialize)(typed)
    }
}

impl fmt::Debug for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeType")
            .field("name", &self.name)
            .field("default_value", &self.default_value)
            .finish_non_exhaustive()
    }
}

/// Attribute types by name.
///
/// `AttributeTypeRegistry::default()` carries the built-in types:
/// `string`, `number`, `boolean`, `date`, `decimal` and `binary`.
#[derive(Debug, Clone)]
pub struct AttributeTypeRegistry {
    types: HashMap<String, Arc<AttributeType>>,
}

impl AttributeTypeRegistry {
    /// Create a registry without any types.
    pub fn empty() -> Self {
        Self {
            types: HashMap::new(),
        }
    }

    /// Register a type, replacing any previous type of the same name.
    ///
    /// Descriptors built earlier keep the type they were declared with.
    pub fn register(&mut self, attribute_type: AttributeType) -> Arc<AttributeType> {
        let attribute_type = Arc::new(attribute_type);
        self.types
            .insert(attribute_type.name.clone(), Arc::clone(&attribute_type));
        attribute_type
    }

    pub fn get(&self, name: &str) -> Result<Arc<AttributeType>> {
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::UnknownAttributeType(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }
}

impl Default for AttributeTypeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(AttributeType::new("string", coerce_string));
        registry.register(AttributeType::new("number", coerce_number));
        registry.register(AttributeType::new("boolean", coerce_boolean));
        registry.register(AttributeType::new("date", coerce_date).with_serializer(serialize_date));
        registry.register(
            AttributeType::new("decimal", coerce_decimal).with_serializer(serialize_decimal),
        );
        registry.register(
            AttributeType::new("binary", coerce_binary).with_serializer(serialize_binary),
        );
        registry
    }
}

fn unsupported(expected: &str, raw: &Value) -> String {
    format!("cannot convert {:?} to {}", raw, expected)
}

fn coerce_string(raw: &Value) -> std::result::Result<Value, String> {
    match raw {
        Value::String(_) => Ok(raw.clone()),
        Value::Int(_) | Value::Float(_) | Value::Decimal(_) | Value::Boolean(_) | Value::Date(_) => {
            Ok(Value::String(raw.to_string()))
        }
        _ => Err(unsupported("string", raw)),
    }
}

fn coerce_number(raw: &Value) -> std::result::Result<Value, String> {
    match raw {
        Value::Int(_) | Value::Float(_) => Ok(raw.clone()),
        Value::Boolean(b) => Ok(Value::Int(i64::from(*b))),
        Value::Decimal(d) => d
            .to_f64()
            .map(Value::Float)
            .ok_or_else(|| unsupported("number", raw)),
        Value::Date(d) => Ok(Value::Int(d.timestamp_millis())),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(Value::Null);
            }
            if let Ok(i) = trimmed.parse::<i64>() {
                return Ok(Value::Int(i));
            }
            trimmed
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("`{}` is not a number", s))
        }
        _ => Err(unsupported("number", raw)),
    }
}

fn coerce_boolean(raw: &Value) -> std::result::Result<Value, String> {
    match raw {
        Value::Boolean(_) => Ok(raw.clone()),
        Value::Int(i) => Ok(Value::Boolean(*i != 0)),
        Value::Float(f) => Ok(Value::Boolean(*f != 0.0)),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(Value::Boolean(true)),
            "false" | "0" | "" => Ok(Value::Boolean(false)),
            _ => Err(format!("`{}` is not a boolean", s)),
        },
        _ => Err(unsupported("boolean", raw)),
    }
}

fn coerce_date(raw: &Value) -> std::result::Result<Value, String> {
    match raw {
        Value::Date(_) => Ok(raw.clone()),
        Value::String(s) => {
            let trimmed = s.trim();
            DateTime::parse_from_rfc3339(trimmed)
                .or_else(|_| DateTime::parse_from_rfc2822(trimmed))
                .map(|parsed| Value::Date(parsed.with_timezone(&Utc)))
                .map_err(|e| format!("`{}` is not a date: {e}", s))
        }
        Value::Int(millis) => DateTime::<Utc>::from_timestamp_millis(*millis)
            .map(Value::Date)
            .ok_or_else(|| format!("timestamp {} is out of range", millis)),
        Value::Float(millis) if !millis.is_finite() => {
            Err(format!("timestamp {} is not finite", millis))
        }
        Value::Float(millis) => DateTime::<Utc>::from_timestamp_millis(*millis as i64)
            .map(Value::Date)
            .ok_or_else(|| format!("timestamp {} is out of range", millis)),
        _ => Err(unsupported("date", raw)),
    }
}

fn serialize_date(typed: &Value) -> Value {
    match typed {
        Value::Date(d) => Value::String(d.to_rfc3339()),
        other => other.clone(),
    }
}

fn coerce_decimal(raw: &Value) -> std::result::Result<Value, String> {
    match raw {
        Value::Decimal(_) => Ok(raw.clone()),
        Value::Int(i) => Ok(Value::Decimal(Decimal::from(*i))),
        Value::Float(f) => Decimal::try_from(*f)
            .map(Value::Decimal)
            .map_err(|e| format!("{} is not a decimal: {e}", f)),
        Value::String(s) => Decimal::from_str(s.trim())
            .map(Value::Decimal)
            .map_err(|e| format!("`{}` is not a decimal: {e}", s)),
        _ => Err(unsupported("decimal", raw)),
    }
}

fn serialize_decimal(typed: &Value) -> Value {
    match typed {
        Value::Decimal(d) => Value::String(d.to_string()),
        other => other.clone(),
    }
}

fn coerce_binary(raw: &Value) -> std::result::Result<Value, String> {
    match raw {
        Value::Binary(_) => Ok(raw.clone()),
        Value::String(s) => BASE64
            .decode(s.trim())
            .map(Value::Binary)
            .map_err(|e| format!("invalid base64: {e}")),
        _ => Err(unsupported("binary", raw)),
    }
}

fn serialize_binary(typed: &Value) -> Value {
    match typed {
        Value::Binary(bytes) => Value::String(BASE64.encode(bytes)),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn registry() -> AttributeTypeRegistry {
        AttributeTypeRegistry::default()
    }

    #[test]
    fn null_passes_through_every_type() {
        let registry = registry();
        for name in ["string", "number", "boolean", "date", "decimal", "binary"] {
            let attribute_type = registry.get(name).unwrap();
            assert_eq!(attribute_type.coerce(&Value::Null), Ok(Value::Null), "{name}");
            assert_eq!(attribute_type.serialize(&Value::Null), Value::Null, "{name}");
        }
    }

    #[test]
    fn string_stringifies_scalars() {
        let string = registry().get("string").unwrap();
        assert_eq!(string.coerce(&Value::Int(12)), Ok(Value::from("12")));
        assert_eq!(string.coerce(&Value::Boolean(true)), Ok(Value::from("true")));
        assert!(string.coerce(&Value::Binary(vec![1])).is_err());
    }

    #[test]
    fn number_parses_strings() {
        let number = registry().get("number").unwrap();
        assert_eq!(number.coerce(&Value::from("42")), Ok(Value::Int(42)));
        assert_eq!(number.coerce(&Value::from(" 1.5 ")), Ok(Value::Float(1.5)));
        assert_eq!(number.coerce(&Value::from("")), Ok(Value::Null));
        assert!(number.coerce(&Value::from("forty-two")).is_err());
    }

    #[test]
    fn boolean_accepts_common_spellings() {
        let boolean = registry().get("boolean").unwrap();
        assert_eq!(boolean.coerce(&Value::from("TRUE")), Ok(Value::Boolean(true)));
        assert_eq!(boolean.coerce(&Value::Int(0)), Ok(Value::Boolean(false)));
        assert!(boolean.coerce(&Value::from("maybe")).is_err());
    }

    #[test]
    fn date_parses_rfc2822_and_rfc3339() {
        let date = registry().get("date").unwrap();
        let expected = Value::Date(Utc.with_ymd_and_hms(2011, 12, 31, 0, 8, 16).unwrap());

        assert_eq!(
            date.coerce(&Value::from("Sat, 31 Dec 2011 00:08:16 GMT")),
            Ok(expected.clone())
        );
        assert_eq!(date.coerce(&Value::from("2011-12-31T00:08:16Z")), Ok(expected.clone()));
        assert_eq!(
            date.serialize(&expected),
            Value::from("2011-12-31T00:08:16+00:00")
        );
        assert!(date.coerce(&Value::from("yesterday")).is_err());
    }

    #[test]
    fn date_rejects_non_finite_timestamps() {
        let date = registry().get("date").unwrap();
        assert_eq!(
            date.coerce(&Value::Float(1_325_290_096_000.0)),
            Ok(Value::Date(Utc.with_ymd_and_hms(2011, 12, 31, 0, 8, 16).unwrap()))
        );
        for millis in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 1e300] {
            assert!(date.coerce(&Value::Float(millis)).is_err(), "{millis}");
        }
    }

    #[test]
    fn decimal_keeps_precision() {
        let decimal = registry().get("decimal").unwrap();
        let coerced = decimal.coerce(&Value::from("10.10")).unwrap();
        assert_eq!(coerced, Value::Decimal(Decimal::new(1010, 2)));
        assert_eq!(decimal.serialize(&coerced), Value::from("10.10"));
    }

    #[test]
    fn binary_round_trips_base64() {
        let binary = registry().get("binary").unwrap();
        let coerced = binary.coerce(&Value::from("aGVsbG8=")).unwrap();
        assert_eq!(coerced, Value::Binary(b"hello".to_vec()));
        assert_eq!(binary.serialize(&coerced), Value::from("aGVsbG8="));
        assert!(binary.coerce(&Value::from("***")).is_err());
    }

    #[test]
    fn unknown_type_is_reported() {
        assert_eq!(
            registry().get("money").unwrap_err(),
            StoreError::UnknownAttributeType("money".to_string())
        );
    }

    #[test]
    fn static_default_is_shared_and_computed_is_fresh() {
        let fixed = DefaultValue::value("unknown");
        assert!(Arc::ptr_eq(&fixed.resolve(), &fixed.resolve()));

        let computed = DefaultValue::computed(|| Value::Int(1));
        assert!(!Arc::ptr_eq(&computed.resolve(), &computed.resolve()));
        assert_eq!(*computed.resolve(), Value::Int(1));
    }

    #[test]
    fn custom_types_can_be_registered() {
        let mut registry = registry();
        registry.register(AttributeType::new("upper", |raw: &Value| {
            raw.as_str()
                .map(|s| Value::String(s.to_uppercase()))
                .ok_or_else(|| "expected text".to_string())
        }));

        let upper = registry.get("upper").unwrap();
        assert_eq!(upper.coerce(&Value::from("abc")), Ok(Value::from("ABC")));
    }
}
