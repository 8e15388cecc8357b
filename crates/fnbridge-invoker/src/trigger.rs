//! Trigger input shapes and their conversion into binding values.
//!
//! The host hands the invoker one of four recognized shapes. HTTP requests
//! become a structured request object, timer ticks a small status object,
//! streams are decoded by data type, and anything else passes through.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::NaiveDateTime;
use fnbridge_core::BindingValue;
use fnbridge_core::convert::decode_request_body;
use http::Request;
use http::header::CONTENT_TYPE;

/// Timestamp format used for timer schedule status (`2024-01-01T00:00:00`).
const SCHEDULE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// The input that started an invocation.
#[derive(Debug)]
pub enum TriggerInput {
    /// An HTTP request. Route parameters, if any, are attached as a
    /// [`RouteParams`] extension by the routing layer.
    Http(Request<Bytes>),
    /// A timer tick.
    Timer(TimerInfo),
    /// A raw byte stream, decoded by the trigger's declared data type.
    Stream(Bytes),
    /// Any other value; passed through unchanged.
    Value(BindingValue),
}

/// Route parameters captured by the routing layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteParams(pub BTreeMap<String, String>);

/// Timer trigger payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimerInfo {
    pub is_past_due: bool,
    pub schedule_status: Option<ScheduleStatus>,
}

/// Last and next scheduled occurrences of a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleStatus {
    pub last: NaiveDateTime,
    pub next: NaiveDateTime,
}

impl TimerInfo {
    pub fn new(is_past_due: bool) -> Self {
        Self {
            is_past_due,
            schedule_status: None,
        }
    }

    /// Builder method: attach a schedule status.
    pub fn with_schedule(self, last: NaiveDateTime, next: NaiveDateTime) -> Self {
        Self {
            schedule_status: Some(ScheduleStatus { last, next }),
            ..self
        }
    }

    /// `{isPastDue}`, plus `last`/`next` when a schedule status is present.
    pub fn to_value(&self) -> BindingValue {
        let mut object = BTreeMap::new();
        object.insert("isPastDue".to_string(), BindingValue::Bool(self.is_past_due));
        if let Some(status) = &self.schedule_status {
            object.insert(
                "last".to_string(),
                status.last.format(SCHEDULE_TIMESTAMP_FORMAT).to_string().into(),
            );
            object.insert(
                "next".to_string(),
                status.next.format(SCHEDULE_TIMESTAMP_FORMAT).to_string().into(),
            );
        }
        BindingValue::Object(object)
    }
}

/// Parse a schedule timestamp in the `2024-01-01T00:00:00` form.
pub fn parse_schedule_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text.trim(), SCHEDULE_TIMESTAMP_FORMAT).ok()
}

/// Build the structured request object exposed to functions.
///
/// Keys: `originalUrl`, `method` (upper-cased), `query`, `headers` (names
/// lower-cased, repeated headers joined with `", "`), `body` and `rawBody`
/// when the request has a body, and `params` when route parameters were
/// attached.
pub fn request_object(request: &Request<Bytes>) -> BindingValue {
    let mut object = BTreeMap::new();
    object.insert(
        "originalUrl".to_string(),
        request.uri().to_string().into(),
    );
    object.insert(
        "method".to_string(),
        request.method().as_str().to_ascii_uppercase().into(),
    );
    object.insert("query".to_string(), BindingValue::Object(query_map(request)));
    object.insert(
        "headers".to_string(),
        BindingValue::Object(header_map(request)),
    );

    if !request.body().is_empty() {
        let content_type = request
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let decoded = decode_request_body(content_type, request.body());
        object.insert("body".to_string(), decoded.body);
        if let Some(raw_body) = decoded.raw_body {
            object.insert("rawBody".to_string(), raw_body.into());
        }
    }

    if let Some(RouteParams(params)) = request.extensions().get::<RouteParams>() {
        let params = params
            .iter()
            .map(|(k, v)| (k.clone(), BindingValue::from(v.as_str())))
            .collect();
        object.insert("params".to_string(), BindingValue::Object(params));
    }

    BindingValue::Object(object)
}

fn query_map(request: &Request<Bytes>) -> BTreeMap<String, BindingValue> {
    request
        .uri()
        .query()
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .map(|(k, v)| (k.into_owned(), BindingValue::String(v.into_owned())))
                .collect()
        })
        .unwrap_or_default()
}

fn header_map(request: &Request<Bytes>) -> BTreeMap<String, BindingValue> {
    let headers = request.headers();
    headers
        .keys()
        .map(|name| {
            let joined = headers
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect::<Vec<_>>()
                .join(", ");
            (name.as_str().to_ascii_lowercase(), BindingValue::String(joined))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn post(uri: &str, content_type: Option<&str>, body: &'static [u8]) -> Request<Bytes> {
        let mut builder = Request::builder().method("post").uri(uri);
        if let Some(content_type) = content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }
        builder.body(Bytes::from_static(body)).unwrap()
    }

    #[test]
    fn json_body_is_parsed_and_raw_text_kept() {
        let request = post("http://host/api/items", Some("application/json"), br#"{"a":1}"#);
        let object = request_object(&request);

        assert_eq!(object.get("body"), Some(&BindingValue::from(json!({ "a": 1 }))));
        assert_eq!(object.get("rawBody"), Some(&BindingValue::from(r#"{"a":1}"#)));
        assert_eq!(object.get("method"), Some(&BindingValue::from("POST")));
        assert_eq!(
            object.get("originalUrl"),
            Some(&BindingValue::from("http://host/api/items"))
        );
    }

    #[test]
    fn octet_stream_body_has_no_raw_text() {
        let request = post("/upload", Some("application/octet-stream"), &[1, 2, 3]);
        let object = request_object(&request);
        assert_eq!(object.get("body"), Some(&BindingValue::Bytes(vec![1, 2, 3])));
        assert_eq!(object.get("rawBody"), None);
    }

    #[test]
    fn untyped_body_is_text() {
        let request = post("/echo", None, b"plain words");
        let object = request_object(&request);
        assert_eq!(object.get("body"), Some(&BindingValue::from("plain words")));
        assert_eq!(object.get("rawBody"), Some(&BindingValue::from("plain words")));
    }

    #[test]
    fn empty_body_is_omitted() {
        let request = Request::get("/ping").body(Bytes::new()).unwrap();
        let object = request_object(&request);
        assert_eq!(object.get("body"), None);
        assert_eq!(object.get("rawBody"), None);
        assert_eq!(object.get("params"), None);
    }

    #[test]
    fn query_and_headers_are_mapped() {
        let request = Request::get("/search?q=rust+lang&page=2")
            .header("X-Trace-Id", "t-1")
            .header("Accept", "text/plain")
            .header("Accept", "application/json")
            .body(Bytes::new())
            .unwrap();
        let object = request_object(&request);

        let query = object.get("query").unwrap();
        assert_eq!(query.get("q"), Some(&BindingValue::from("rust lang")));
        assert_eq!(query.get("page"), Some(&BindingValue::from("2")));

        let headers = object.get("headers").unwrap();
        assert_eq!(headers.get("x-trace-id"), Some(&BindingValue::from("t-1")));
        assert_eq!(
            headers.get("accept"),
            Some(&BindingValue::from("text/plain, application/json"))
        );
    }

    #[test]
    fn route_params_become_params() {
        let mut request = Request::get("/products/42").body(Bytes::new()).unwrap();
        let mut params = BTreeMap::new();
        params.insert("id".to_string(), "42".to_string());
        request.extensions_mut().insert(RouteParams(params));

        let object = request_object(&request);
        assert_eq!(
            object.get("params").and_then(|p| p.get("id")),
            Some(&BindingValue::from("42"))
        );
    }

    #[test]
    fn timer_without_schedule_status() {
        let value = TimerInfo::new(true).to_value();
        assert_eq!(value, BindingValue::from(json!({ "isPastDue": true })));
    }

    #[test]
    fn timer_with_schedule_status() {
        let last = parse_schedule_timestamp("2024-01-01T00:00:00").unwrap();
        let next = parse_schedule_timestamp("2024-01-02T00:00:00").unwrap();
        let value = TimerInfo::new(false).with_schedule(last, next).to_value();
        assert_eq!(
            value,
            BindingValue::from(json!({
                "isPastDue": false,
                "last": "2024-01-01T00:00:00",
                "next": "2024-01-02T00:00:00",
            }))
        );
    }

    #[test]
    fn rejects_malformed_schedule_timestamp() {
        assert_eq!(parse_schedule_timestamp("yesterday"), None);
    }
}
