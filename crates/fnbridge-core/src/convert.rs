//! Value converters shared by the context builder and the input resolver.
//!
//! All conversions here are optimistic: a failed parse never raises, the
//! caller simply keeps the original value.

use serde_json::{Map, Value};

use crate::value::{BindingData, BindingValue};

const APPLICATION_JSON: &str = "application/json";
const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

/// Cheap syntactic check: does the trimmed text look like a JSON object or
/// array?
pub fn is_json_like(text: &str) -> bool {
    let text = text.trim();
    (text.starts_with('{') && text.ends_with('}')) || (text.starts_with('[') && text.ends_with(']'))
}

/// Parse `text` as a JSON object, or failing that as an array of objects.
pub fn try_parse_json_object_or_array(text: &str) -> Option<BindingValue> {
    match serde_json::from_str::<Value>(text).ok()? {
        object @ Value::Object(_) => Some(object.into()),
        Value::Array(items) if items.iter().all(Value::is_object) => {
            Some(Value::Array(items).into())
        }
        _ => None,
    }
}

/// Convert a string, a raw JSON token, or a non-empty array of strings into
/// structured form when it holds JSON.
///
/// Returns `None` when the input is not a candidate or any part of it fails
/// to parse; an array converts all-or-nothing. Already-structured values are
/// never candidates.
pub fn try_convert_if_json(input: &BindingValue) -> Option<BindingValue> {
    match input {
        BindingValue::Token(Value::String(text)) => convert_single(text),
        BindingValue::Token(token) => convert_single(&token.to_string()),
        BindingValue::String(text) => convert_single(text),
        BindingValue::Array(items) if !items.is_empty() => {
            let texts = items
                .iter()
                .map(BindingValue::as_str)
                .collect::<Option<Vec<&str>>>()?;
            if !texts.iter().all(|t| is_json_like(t)) {
                return None;
            }
            texts
                .into_iter()
                .map(try_parse_json_object_or_array)
                .collect::<Option<Vec<_>>>()
                .map(BindingValue::Array)
        }
        _ => None,
    }
}

fn convert_single(text: &str) -> Option<BindingValue> {
    if is_json_like(text) {
        try_parse_json_object_or_array(text)
    } else {
        None
    }
}

/// Lower-case the first character of `name`, leaving the rest unchanged.
pub fn to_lower_first_char(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Stringify every value and lower-camel-case every key.
///
/// `Null` stays `Null`; strings are kept as-is; everything else is rendered
/// through its default string form.
pub fn normalize_binding_data(data: &BindingData) -> BindingData {
    data.iter()
        .map(|(key, value)| {
            let value = match value {
                BindingValue::Null => BindingValue::Null,
                BindingValue::String(s) => BindingValue::String(s.clone()),
                other => BindingValue::String(other.to_string()),
            };
            (to_lower_first_char(key), value)
        })
        .collect()
}

/// Copy the top-level, non-array, non-null properties of a JSON object
/// payload into `data`, overwriting existing keys.
///
/// Accepts JSON text, raw JSON tokens and structured objects; any other
/// shape (or unparseable text) leaves `data` untouched.
pub fn apply_binding_data(value: &BindingValue, data: &mut BindingData) {
    let properties = match value {
        BindingValue::String(text) | BindingValue::Token(Value::String(text)) => {
            if !is_json_like(text) {
                return;
            }
            match serde_json::from_str::<Map<String, Value>>(text) {
                Ok(map) => map.into_iter().map(|(k, v)| (k, v.into())).collect(),
                Err(_) => return,
            }
        }
        BindingValue::Token(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| (k.clone(), BindingValue::from(v.clone())))
            .collect(),
        BindingValue::Object(map) => map.clone(),
        _ => return,
    };

    for (key, value) in properties {
        if matches!(value, BindingValue::Null | BindingValue::Array(_)) {
            continue;
        }
        data.insert(key, value);
    }
}

/// A decoded HTTP request body.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedBody {
    /// The body as exposed to the function.
    pub body: BindingValue,
    /// The body text, when the body was read as text.
    pub raw_body: Option<String>,
}

/// Decode a request body according to its content type.
///
/// - `application/json`: structured value, raw text retained. Falls back to
///   text when the body does not parse as an object or array.
/// - `application/octet-stream`: raw bytes, no raw text.
/// - anything else, or no content type: text, which is also the raw text.
pub fn decode_request_body(content_type: Option<&str>, raw: &[u8]) -> DecodedBody {
    let media_type = content_type.map(media_type);
    match media_type.as_deref() {
        Some(APPLICATION_OCTET_STREAM) => DecodedBody {
            body: BindingValue::Bytes(raw.to_vec()),
            raw_body: None,
        },
        Some(APPLICATION_JSON) => {
            let text = String::from_utf8_lossy(raw).into_owned();
            match try_parse_json_object_or_array(&text) {
                Some(body) => DecodedBody {
                    body,
                    raw_body: Some(text),
                },
                None => text_body(text),
            }
        }
        _ => text_body(String::from_utf8_lossy(raw).into_owned()),
    }
}

fn text_body(text: String) -> DecodedBody {
    DecodedBody {
        body: BindingValue::String(text.clone()),
        raw_body: Some(text),
    }
}

/// The media type portion of a content-type header, lower-cased and without
/// parameters.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
