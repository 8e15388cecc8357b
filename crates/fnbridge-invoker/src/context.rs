//! Execution context construction.
//!
//! [`InvocationContext::build`] turns one trigger input into the per-call
//! state the rest of the pipeline works on: the binding map with the trigger
//! value registered, and the normalized binding data later bindings resolve
//! their resource names from.

use std::collections::HashMap;

use fnbridge_core::convert::{apply_binding_data, normalize_binding_data, try_convert_if_json};
use fnbridge_core::{BindingData, BindingMetadata, BindingValue};
use tracing::trace;
use uuid::Uuid;

use crate::binding::{Binder, convert_stream_to_value};
use crate::trigger::{TriggerInput, request_object};

/// Binding-data key carrying the invocation id.
pub const INVOCATION_ID_KEY: &str = "invocationId";

/// Binding name under which HTTP triggers also expose the full request object.
pub const REQUEST_KEY: &str = "req";

/// Request-object properties that contribute binding data.
const REQUEST_BINDING_DATA_KEYS: [&str; 3] = ["body", "query", "params"];

/// Per-invocation state. Created by [`InvocationContext::build`], filled in
/// by the input resolver and the output applier, discarded afterwards.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub invocation_id: Uuid,
    /// Binding name → current value.
    pub bindings: HashMap<String, BindingValue>,
    /// Positional inputs: trigger value first, then non-trigger inputs in
    /// declaration order.
    pub inputs: Vec<BindingValue>,
    /// Normalized binding data: lower-camel-case keys, string values.
    pub binding_data: BindingData,
    /// The shaped trigger value before JSON conversion, handed to output
    /// bindings.
    pub trigger_value: BindingValue,
    /// The full request object for HTTP triggers. Also bound under
    /// [`REQUEST_KEY`] unless the trigger itself has that name.
    pub request: Option<BindingValue>,
}

impl InvocationContext {
    pub fn build(
        trigger: &BindingMetadata,
        invocation_id: Uuid,
        input: TriggerInput,
        binder: &Binder,
    ) -> Self {
        let mut binding_data = binder.binding_data().clone();
        let mut request = None;

        let value = match input {
            TriggerInput::Http(http_request) => {
                let object = request_object(&http_request);
                for key in REQUEST_BINDING_DATA_KEYS {
                    if let Some(part) = object.get(key) {
                        apply_binding_data(part, &mut binding_data);
                    }
                }
                let value = if trigger.is_webhook() {
                    object.get("body").cloned().unwrap_or_default()
                } else {
                    object.clone()
                };
                request = Some(object);
                value
            }
            TriggerInput::Timer(timer) => {
                let value = timer.to_value();
                apply_binding_data(&value, &mut binding_data);
                value
            }
            TriggerInput::Stream(bytes) => {
                let value = convert_stream_to_value(&bytes, trigger.data_type_or_default());
                apply_binding_data(&value, &mut binding_data);
                value
            }
            TriggerInput::Value(value) => {
                apply_binding_data(&value, &mut binding_data);
                value
            }
        };

        let mut binding_data = normalize_binding_data(&binding_data);
        binding_data.insert(
            INVOCATION_ID_KEY.to_string(),
            BindingValue::String(invocation_id.to_string()),
        );

        let converted = try_convert_if_json(&value).unwrap_or_else(|| value.clone());
        trace!(%invocation_id, trigger = %trigger.name, keys = binding_data.len(), "execution context built");

        let mut bindings = HashMap::new();
        bindings.insert(trigger.name.clone(), converted);
        if let Some(object) = &request {
            bindings
                .entry(REQUEST_KEY.to_string())
                .or_insert_with(|| object.clone());
        }

        Self {
            invocation_id,
            bindings,
            inputs: Vec::new(),
            binding_data,
            trigger_value: value,
            request,
        }
    }

    /// The value currently bound under `name`.
    pub fn binding(&self, name: &str) -> Option<&BindingValue> {
        self.bindings.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use fnbridge_core::{DataType, Direction};
    use serde_json::json;

    use crate::trigger::TimerInfo;

    fn trigger(binding_type: &str) -> BindingMetadata {
        BindingMetadata::new("input", binding_type, Direction::In).trigger()
    }

    fn build(trigger: &BindingMetadata, input: TriggerInput, binder: &Binder) -> InvocationContext {
        InvocationContext::build(trigger, Uuid::new_v4(), input, binder)
    }

    #[test]
    fn json_text_trigger_is_converted_and_feeds_binding_data() {
        let binder = Binder::new();
        let context = build(
            &trigger("queueTrigger"),
            TriggerInput::Value(r#"{"OrderId":"o-7","items":[1,2],"Qty":3}"#.into()),
            &binder,
        );

        assert_eq!(
            context.binding("input"),
            Some(&BindingValue::from(json!({ "OrderId": "o-7", "items": [1, 2], "Qty": 3 })))
        );
        // Keys lower-camel-cased, values stringified, arrays skipped.
        assert_eq!(context.binding_data.get("orderId"), Some(&BindingValue::from("o-7")));
        assert_eq!(context.binding_data.get("qty"), Some(&BindingValue::from("3")));
        assert!(!context.binding_data.contains_key("items"));
        // The unconverted text is kept for output bindings.
        assert!(context.trigger_value.as_str().is_some());
    }

    #[test]
    fn invocation_id_is_added_to_binding_data() {
        let binder = Binder::new();
        let id = Uuid::new_v4();
        let context = InvocationContext::build(
            &trigger("manualTrigger"),
            id,
            TriggerInput::Value("hello".into()),
            &binder,
        );
        assert_eq!(
            context.binding_data.get(INVOCATION_ID_KEY),
            Some(&BindingValue::String(id.to_string()))
        );
        assert_eq!(context.binding("input"), Some(&BindingValue::from("hello")));
        assert!(context.inputs.is_empty());
    }

    #[test]
    fn binder_data_is_normalized() {
        let mut data = BindingData::new();
        data.insert("DequeueCount".to_string(), BindingValue::Number(4.into()));
        data.insert("MessageId".to_string(), "m-1".into());
        data.insert("PopReceipt".to_string(), BindingValue::Null);
        let binder = Binder::with_binding_data(data);

        let context = build(&trigger("queueTrigger"), TriggerInput::Value("x".into()), &binder);
        assert_eq!(context.binding_data.get("dequeueCount"), Some(&BindingValue::from("4")));
        assert_eq!(context.binding_data.get("messageId"), Some(&BindingValue::from("m-1")));
        assert_eq!(context.binding_data.get("popReceipt"), Some(&BindingValue::Null));
        // The binder itself is left untouched.
        assert!(binder.binding_data().contains_key("DequeueCount"));
    }

    #[test]
    fn http_trigger_gets_request_object() {
        let request = http::Request::post("/api/orders?region=eu")
            .header("content-type", "application/json")
            .body(Bytes::from_static(br#"{"Customer":"c-1"}"#))
            .unwrap();
        let context = build(&trigger("httpTrigger"), TriggerInput::Http(request), &Binder::new());

        let req = context.binding("input").unwrap();
        assert_eq!(req.get("method"), Some(&BindingValue::from("POST")));
        assert_eq!(
            req.get("body"),
            Some(&BindingValue::from(json!({ "Customer": "c-1" })))
        );
        assert_eq!(context.request.as_ref(), Some(req));
        assert_eq!(context.binding_data.get("customer"), Some(&BindingValue::from("c-1")));
        assert_eq!(context.binding_data.get("region"), Some(&BindingValue::from("eu")));
    }

    #[test]
    fn webhook_trigger_value_is_the_body() {
        let request = http::Request::post("/hook")
            .header("content-type", "application/json")
            .body(Bytes::from_static(br#"{"action":"opened"}"#))
            .unwrap();
        let webhook = trigger("httpTrigger").with_webhook_type("github");
        let context = build(&webhook, TriggerInput::Http(request), &Binder::new());

        assert_eq!(
            context.binding("input"),
            Some(&BindingValue::from(json!({ "action": "opened" })))
        );
        let req = context.request.as_ref().unwrap();
        assert_eq!(req.get("method"), Some(&BindingValue::from("POST")));
        assert_eq!(context.binding(REQUEST_KEY), Some(req));
    }

    #[test]
    fn trigger_named_req_is_not_replaced_by_request_object() {
        let request = http::Request::post("/hook")
            .header("content-type", "application/json")
            .body(Bytes::from_static(br#"{"action":"closed"}"#))
            .unwrap();
        let webhook = BindingMetadata::new(REQUEST_KEY, "httpTrigger", Direction::In)
            .trigger()
            .with_webhook_type("generic");
        let context = build(&webhook, TriggerInput::Http(request), &Binder::new());

        assert_eq!(
            context.binding(REQUEST_KEY),
            Some(&BindingValue::from(json!({ "action": "closed" })))
        );
        assert_eq!(context.bindings.len(), 1);
    }

    #[test]
    fn non_http_triggers_bind_no_request_object() {
        let context = build(
            &trigger("queueTrigger"),
            TriggerInput::Value("plain".into()),
            &Binder::new(),
        );
        assert!(context.request.is_none());
        assert_eq!(context.binding(REQUEST_KEY), None);
    }

    #[test]
    fn timer_trigger_shape() {
        let context = build(
            &trigger("timerTrigger"),
            TriggerInput::Timer(TimerInfo::new(true)),
            &Binder::new(),
        );
        assert_eq!(
            context.binding("input"),
            Some(&BindingValue::from(json!({ "isPastDue": true })))
        );
        assert_eq!(context.binding_data.get("isPastDue"), Some(&BindingValue::from("true")));
    }

    #[test]
    fn stream_trigger_decodes_by_data_type() {
        let text = build(
            &trigger("blobTrigger"),
            TriggerInput::Stream(Bytes::from_static(b"[{\"n\":1}]")),
            &Binder::new(),
        );
        assert_eq!(
            text.binding("input"),
            Some(&BindingValue::from(json!([{ "n": 1 }])))
        );

        let binary = build(
            &trigger("blobTrigger").with_data_type(DataType::Binary),
            TriggerInput::Stream(Bytes::from_static(b"{}")),
            &Binder::new(),
        );
        assert_eq!(binary.binding("input"), Some(&BindingValue::Bytes(b"{}".to_vec())));
    }

    #[test]
    fn opaque_structured_value_passes_through() {
        let value = BindingValue::Array(vec![BindingValue::Bool(true)]);
        let context = build(
            &trigger("customTrigger"),
            TriggerInput::Value(value.clone()),
            &Binder::new(),
        );
        assert_eq!(context.binding("input"), Some(&value));
    }
}
