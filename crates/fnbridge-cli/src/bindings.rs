//! Bindings available to `fnbridge invoke`.
//!
//! Inputs of type `literal` yield the JSON value of their `value` property.
//! Every output binding, whatever its type, is captured into an
//! [`OutputLog`] so the command can print it.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fnbridge_core::{BindingMetadata, BindingValue};
use fnbridge_invoker::{Binding, BindingContext, BindingFactory, InvokerError, InvokerResult};

/// Binding type whose input value is given inline in function.json.
pub const LITERAL_BINDING_TYPE: &str = "literal";

/// Output values in the order the bindings were applied.
#[derive(Debug, Default)]
pub struct OutputLog {
    entries: Mutex<Vec<(String, BindingValue)>>,
}

impl OutputLog {
    fn record(&self, name: &str, value: BindingValue) {
        self.entries
            .lock()
            .expect("output log lock")
            .push((name.to_string(), value));
    }

    pub fn take(&self) -> Vec<(String, BindingValue)> {
        std::mem::take(&mut *self.entries.lock().expect("output log lock"))
    }
}

pub struct CliBinding {
    name: String,
    literal: Option<serde_json::Value>,
    outputs: Arc<OutputLog>,
}

#[async_trait]
impl Binding for CliBinding {
    async fn bind_input(&self, _context: &BindingContext<'_>) -> anyhow::Result<BindingValue> {
        match &self.literal {
            Some(value) => Ok(BindingValue::from(value.clone())),
            None => anyhow::bail!("binding '{}' has no literal `value` property", self.name),
        }
    }

    async fn bind_output(&self, context: &BindingContext<'_>) -> anyhow::Result<()> {
        let value = context.value.cloned().unwrap_or_default();
        self.outputs.record(&self.name, value);
        Ok(())
    }
}

pub struct CliBindingFactory {
    outputs: Arc<OutputLog>,
}

impl CliBindingFactory {
    pub fn new(outputs: Arc<OutputLog>) -> Self {
        Self { outputs }
    }
}

impl BindingFactory for CliBindingFactory {
    fn create(&self, metadata: &BindingMetadata) -> InvokerResult<Arc<dyn Binding>> {
        if metadata.direction.is_input() && metadata.binding_type != LITERAL_BINDING_TYPE {
            return Err(InvokerError::UnknownBindingType(metadata.binding_type.clone()));
        }
        Ok(Arc::new(CliBinding {
            name: metadata.name.clone(),
            literal: metadata.properties.get("value").cloned(),
            outputs: Arc::clone(&self.outputs),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fnbridge_core::{BindingData, Cardinality, DataType, Direction};
    use fnbridge_invoker::Binder;
    use serde_json::json;

    fn factory() -> (CliBindingFactory, Arc<OutputLog>) {
        let outputs = Arc::new(OutputLog::default());
        (CliBindingFactory::new(outputs.clone()), outputs)
    }

    #[tokio::test]
    async fn literal_input_yields_its_value() {
        let (factory, _) = factory();
        let metadata = BindingMetadata::new("settings", "literal", Direction::In)
            .with_property("value", json!({ "size": 3 }));
        let binding = factory.create(&metadata).unwrap();

        let binder = Binder::new();
        let data = BindingData::new();
        let context = BindingContext::input(&binder, &data, DataType::String, Cardinality::One);
        let value = binding.bind_input(&context).await.unwrap();
        assert_eq!(value.get("size"), Some(&BindingValue::Number(3.into())));
    }

    #[tokio::test]
    async fn literal_without_value_fails_to_bind() {
        let (factory, _) = factory();
        let binding = factory
            .create(&BindingMetadata::new("empty", "literal", Direction::In))
            .unwrap();
        let binder = Binder::new();
        let data = BindingData::new();
        let context = BindingContext::input(&binder, &data, DataType::String, Cardinality::One);
        let err = binding.bind_input(&context).await.unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn other_input_types_are_unknown() {
        let (factory, _) = factory();
        let err = factory
            .create(&BindingMetadata::new("db", "table", Direction::In))
            .err()
            .expect("unknown type");
        assert!(matches!(err, InvokerError::UnknownBindingType(t) if t == "table"));
    }

    #[tokio::test]
    async fn outputs_are_recorded_in_order() {
        let (factory, outputs) = factory();
        let first = factory
            .create(&BindingMetadata::new("res", "http", Direction::Out))
            .unwrap();
        let second = factory
            .create(&BindingMetadata::new("queue", "queue", Direction::Out))
            .unwrap();

        let binder = Binder::new();
        let data = BindingData::new();
        let trigger = BindingValue::from("t");
        let a = BindingValue::from("a");
        let b = BindingValue::from("b");
        first
            .bind_output(&BindingContext::output(&binder, &data, &trigger, &a))
            .await
            .unwrap();
        second
            .bind_output(&BindingContext::output(&binder, &data, &trigger, &b))
            .await
            .unwrap();

        assert_eq!(
            outputs.take(),
            vec![("res".to_string(), a), ("queue".to_string(), b)]
        );
        assert!(outputs.take().is_empty());
    }
}
