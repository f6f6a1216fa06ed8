//! Tagged payload values carried by result items and write requests

use std::fmt;

use serde::{Deserialize, Serialize};

/// A decoded attribute, event or command payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    String(String),
    Float(f64),
    /// Octet string, serialized as hex
    Bytes(#[serde(with = "hex_bytes")] Vec<u8>),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{}", v),
            Value::Unsigned(v) => write!(f, "{}", v),
            Value::Signed(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{:?}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "0x{}", hex::encode(v)),
            Value::Null => write!(f, "null"),
        }
    }
}

/// Convert an untyped JSON value into a payload.
///
/// Plain scalars map to the matching variant (non-negative integers become
/// `Unsigned`). `{"bytes": "<hex>"}` produces `Bytes`, and an object already
/// in the tagged form (`{"type": ..., "value": ...}`) is decoded as-is.
/// Arrays and other objects are rejected.
impl TryFrom<&serde_json::Value> for Value {
    type Error = String;

    fn try_from(json: &serde_json::Value) -> Result<Self, Self::Error> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(u) = n.as_u64() {
                    Ok(Value::Unsigned(u))
                } else if let Some(i) = n.as_i64() {
                    Ok(Value::Signed(i))
                } else {
                    n.as_f64()
                        .map(Value::Float)
                        .ok_or_else(|| format!("Unrepresentable number: {}", n))
                }
            }
            serde_json::Value::String(s) => Ok(Value::String(s.clone())),
            serde_json::Value::Object(map) => {
                if let Some(hex_str) = map.get("bytes").and_then(|b| b.as_str()) {
                    return hex::decode(hex_str)
                        .map(Value::Bytes)
                        .map_err(|e| format!("Invalid hex in bytes value: {}", e));
                }
                if map.contains_key("type") {
                    return serde_json::from_value(json.clone())
                        .map_err(|e| format!("Invalid tagged value: {}", e));
                }
                Err("Unsupported object value; use {\"bytes\": \"..\"} or a tagged value".to_string())
            }
            serde_json::Value::Array(_) => Err("Array values are not supported".to_string()),
        }
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_scalars_from_json() {
        assert_eq!(Value::try_from(&json!(true)).unwrap(), Value::Bool(true));
        assert_eq!(Value::try_from(&json!(254)).unwrap(), Value::Unsigned(254));
        assert_eq!(Value::try_from(&json!(-3)).unwrap(), Value::Signed(-3));
        assert_eq!(Value::try_from(&json!(1.5)).unwrap(), Value::Float(1.5));
        assert_eq!(
            Value::try_from(&json!("kitchen")).unwrap(),
            Value::String("kitchen".to_string())
        );
        assert_eq!(Value::try_from(&json!(null)).unwrap(), Value::Null);
    }

    #[test]
    fn test_bytes_from_json() {
        let value = Value::try_from(&json!({"bytes": "0aff"})).unwrap();
        assert_eq!(value, Value::Bytes(vec![0x0A, 0xFF]));
    }

    #[test]
    fn test_tagged_form_is_accepted() {
        let value = Value::try_from(&json!({"type": "signed", "value": 7})).unwrap();
        assert_eq!(value, Value::Signed(7));
    }

    #[test]
    fn test_arrays_rejected() {
        assert!(Value::try_from(&json!([1, 2])).is_err());
        assert!(Value::try_from(&json!({"other": 1})).is_err());
    }

    #[test]
    fn test_bytes_serialize_as_hex() {
        let json = serde_json::to_value(Value::Bytes(vec![0xDE, 0xAD])).unwrap();
        assert_eq!(json, json!({"type": "bytes", "value": "dead"}));
        let null = serde_json::to_value(Value::Null).unwrap();
        assert_eq!(null, json!({"type": "null"}));
    }
}
