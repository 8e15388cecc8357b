//! The dynamic value type carried by bindings.
//!
//! Trigger payloads, bound inputs and worker outputs are all represented as a
//! [`BindingValue`]. The type distinguishes already-structured data
//! (`Object`/`Array`) from an unconverted JSON token handed back by a binding
//! (`Token`), so the JSON converters can tell "already parsed" from "parse me".

use std::collections::BTreeMap;
use std::fmt;

use serde_json::{Map, Number, Value};

/// Normalized binding data: lower-camel-case keys, string or null values.
pub type BindingData = BTreeMap<String, BindingValue>;

/// A dynamically-typed binding value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum BindingValue {
    #[default]
    Null,
    Bool(bool),
    Number(Number),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<BindingValue>),
    Object(BTreeMap<String, BindingValue>),
    /// A raw JSON token that has not been converted into structured form.
    Token(Value),
}

impl BindingValue {
    pub fn is_null(&self) -> bool {
        matches!(self, BindingValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            BindingValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&BTreeMap<String, BindingValue>> {
        match self {
            BindingValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Field lookup on an `Object` value.
    pub fn get(&self, key: &str) -> Option<&BindingValue> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Render as a JSON value. Byte payloads become arrays of numbers.
    pub fn to_json(&self) -> Value {
        match self {
            BindingValue::Null => Value::Null,
            BindingValue::Bool(b) => Value::Bool(*b),
            BindingValue::Number(n) => Value::Number(n.clone()),
            BindingValue::String(s) => Value::String(s.clone()),
            BindingValue::Bytes(bytes) => {
                Value::Array(bytes.iter().map(|b| Value::from(*b)).collect())
            }
            BindingValue::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            BindingValue::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
            BindingValue::Token(token) => token.clone(),
        }
    }

    /// Encode for the invocation request payload map.
    ///
    /// Strings are sent as UTF-8, structured values and tokens as compact
    /// JSON, bytes verbatim. `Null` has no payload.
    pub fn to_wire_bytes(&self) -> Option<Vec<u8>> {
        match self {
            BindingValue::Null => None,
            BindingValue::String(s) => Some(s.as_bytes().to_vec()),
            BindingValue::Bytes(bytes) => Some(bytes.clone()),
            other => Some(other.to_json().to_string().into_bytes()),
        }
    }
}

/// Default string form: strings verbatim, bytes as lossy UTF-8, everything
/// else as compact JSON. `Null` renders empty.
impl fmt::Display for BindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingValue::Null => Ok(()),
            BindingValue::String(s) => f.write_str(s),
            BindingValue::Bytes(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            BindingValue::Token(Value::String(s)) => f.write_str(s),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<Value> for BindingValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => BindingValue::Null,
            Value::Bool(b) => BindingValue::Bool(b),
            Value::Number(n) => BindingValue::Number(n),
            Value::String(s) => BindingValue::String(s),
            Value::Array(items) => BindingValue::Array(items.into_iter().map(Into::into).collect()),
            Value::Object(map) => {
                BindingValue::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<&str> for BindingValue {
    fn from(s: &str) -> Self {
        BindingValue::String(s.to_string())
    }
}

impl From<String> for BindingValue {
    fn from(s: String) -> Self {
        BindingValue::String(s)
    }
}

impl From<bool> for BindingValue {
    fn from(b: bool) -> Self {
        BindingValue::Bool(b)
    }
}

impl From<Vec<u8>> for BindingValue {
    fn from(bytes: Vec<u8>) -> Self {
        BindingValue::Bytes(bytes)
    }
}

impl From<BTreeMap<String, BindingValue>> for BindingValue {
    fn from(map: BTreeMap<String, BindingValue>) -> Self {
        BindingValue::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_json_builds_structured_values() {
        let value = BindingValue::from(json!({ "a": 1, "b": ["x", true] }));
        assert_eq!(value.get("a"), Some(&BindingValue::Number(1.into())));
        assert_eq!(
            value.get("b"),
            Some(&BindingValue::Array(vec!["x".into(), BindingValue::Bool(true)]))
        );
    }

    #[test]
    fn wire_bytes_by_shape() {
        assert_eq!(BindingValue::from("hi").to_wire_bytes(), Some(b"hi".to_vec()));
        assert_eq!(
            BindingValue::Bytes(vec![0, 159]).to_wire_bytes(),
            Some(vec![0, 159])
        );
        assert_eq!(
            BindingValue::from(json!({ "a": 1 })).to_wire_bytes(),
            Some(br#"{"a":1}"#.to_vec())
        );
        assert_eq!(BindingValue::Bool(false).to_wire_bytes(), Some(b"false".to_vec()));
        assert_eq!(BindingValue::Null.to_wire_bytes(), None);
    }

    #[test]
    fn display_uses_default_string_forms() {
        assert_eq!(BindingValue::from("plain").to_string(), "plain");
        assert_eq!(BindingValue::Number(3.into()).to_string(), "3");
        assert_eq!(BindingValue::Bool(true).to_string(), "true");
        assert_eq!(BindingValue::Null.to_string(), "");
        assert_eq!(BindingValue::Token(json!("tok")).to_string(), "tok");
        assert_eq!(BindingValue::Token(json!([1, 2])).to_string(), "[1,2]");
    }
}
