use log::debug;
use serde_json::Value as JsonValue;

use crate::model::value::Value::{Boolean, Float, Int, Null, String};
use crate::model::value::{PrimaryKey, RawData};

/// Parse a wire attribute hash into raw data.
///
/// Nested arrays and objects are not attributes and are skipped.
pub(crate) fn parse_raw_data(json: &JsonValue) -> Result<RawData, std::string::String> {
    let record = json
        .as_object()
        .ok_or_else(|| format!("expected an attribute hash, got {}", json))?;

    let mut raw = RawData::with_capacity(record.len());
    for (key, value) in record {
        let implemented = add_attribute(&mut raw, key, value);
        if !implemented {
            debug!("Key: {}, skipped unsupported value", key);
        }
    }

    Ok(raw)
}

/// Resolve the primary key of a raw data hash.
pub(crate) fn extract_primary_key(raw: &RawData, primary_key_name: &str) -> Option<PrimaryKey> {
    raw.get(primary_key_name).and_then(PrimaryKey::from_value)
}

/// Unwrap a payload nested under its type name, e.g. `{"person": {...}}`.
pub(crate) fn unwrap_root(json: JsonValue, root: &str) -> JsonValue {
    match json {
        JsonValue::Object(mut object) if object.len() == 1 && object.contains_key(root) => {
            match object.remove(root) {
                Some(inner @ JsonValue::Object(_)) => inner,
                Some(other) => {
                    object.insert(root.to_string(), other);
                    JsonValue::Object(object)
                }
                None => JsonValue::Object(object),
            }
        }
        other => other,
    }
}

/// Convert a JSON value into a raw attribute value.
fn add_attribute(attributes: &mut RawData, key: &str, value: &JsonValue) -> bool {
    if value.is_null() {
        attributes.insert(key.to_string(), Null);
        return true;
    }

    if let Some(i) = value.as_i64() {
        attributes.insert(key.to_string(), Int(i));
        return true;
    }

    if let Some(u) = value.as_u64() {
        // Only reached above i64::MAX.
        attributes.insert(key.to_string(), Float(u as f64));
        return true;
    }

    if let Some(f) = value.as_f64() {
        attributes.insert(key.to_string(), Float(f));
        return true;
    }

    if let Some(s) = value.as_str() {
        attributes.insert(key.to_string(), String(s.to_string()));
        return true;
    }

    if let Some(b) = value.as_bool() {
        attributes.insert(key.to_string(), Boolean(b));
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::value::Value;
    use serde_json::json;

    #[test]
    fn parses_scalar_attributes() {
        let raw = parse_raw_data(&json!({
            "id": 1,
            "name": "Peter",
            "score": 1.5,
            "active": true,
            "nickname": null,
            "big": u64::MAX,
            "tags": ["a"],
        }))
        .unwrap();

        assert_eq!(raw.get("id"), Some(&Value::Int(1)));
        assert_eq!(raw.get("name"), Some(&Value::from("Peter")));
        assert_eq!(raw.get("score"), Some(&Value::Float(1.5)));
        assert_eq!(raw.get("active"), Some(&Value::Boolean(true)));
        assert_eq!(raw.get("nickname"), Some(&Value::Null));
        assert_eq!(raw.get("big"), Some(&Value::Float(u64::MAX as f64)));
        assert!(!raw.contains_key("tags"));
    }

    #[test]
    fn rejects_non_objects() {
        assert!(parse_raw_data(&json!([1, 2])).is_err());
        assert!(parse_raw_data(&json!("person")).is_err());
    }

    #[test]
    fn extracts_configured_primary_key() {
        let raw = parse_raw_data(&json!({ "id": 1, "foobar": 2 })).unwrap();
        assert_eq!(extract_primary_key(&raw, "foobar"), Some(PrimaryKey::Int(2)));
        assert_eq!(extract_primary_key(&raw, "missing"), None);

        let raw = parse_raw_data(&json!({ "id": null })).unwrap();
        assert_eq!(extract_primary_key(&raw, "id"), None);
    }

    #[test]
    fn unwraps_root_key_only_around_objects() {
        assert_eq!(
            unwrap_root(json!({ "person": { "id": 1 } }), "person"),
            json!({ "id": 1 })
        );
        assert_eq!(unwrap_root(json!({ "person": 1 }), "person"), json!({ "person": 1 }));
        assert_eq!(
            unwrap_root(json!({ "id": 1, "name": "x" }), "person"),
            json!({ "id": 1, "name": "x" })
        );
    }
}
