//! The binding contract.
//!
//! A binding moves data between the host and a function: input bindings
//! produce a value before the worker runs, output bindings consume one after
//! it returns. Implementations are supplied by the host (queues, blobs, HTTP
//! responses, ...); the invoker only drives them.

use async_trait::async_trait;
use fnbridge_core::{BindingData, BindingValue, Cardinality, DataType};

/// Host services shared by all bindings of one invocation.
#[derive(Debug, Clone, Default)]
pub struct Binder {
    binding_data: BindingData,
}

impl Binder {
    pub fn new() -> Self {
        Self::default()
    }

    /// A binder seeded with trigger-supplied binding data (message ids,
    /// dequeue counts, blob names, ...).
    pub fn with_binding_data(binding_data: BindingData) -> Self {
        Self { binding_data }
    }

    pub fn binding_data(&self) -> &BindingData {
        &self.binding_data
    }
}

/// Everything a binding may consult while binding.
#[derive(Debug, Clone, Copy)]
pub struct BindingContext<'a> {
    pub binder: &'a Binder,
    /// Normalized binding data of the invocation, including `invocationId`.
    /// Bindings with parameterized resource names resolve them from here.
    pub binding_data: &'a BindingData,
    /// The trigger value (output direction only).
    pub trigger_value: Option<&'a BindingValue>,
    /// The value to write (output direction only).
    pub value: Option<&'a BindingValue>,
    pub data_type: DataType,
    pub cardinality: Cardinality,
}

impl<'a> BindingContext<'a> {
    pub fn input(
        binder: &'a Binder,
        binding_data: &'a BindingData,
        data_type: DataType,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            binder,
            binding_data,
            trigger_value: None,
            value: None,
            data_type,
            cardinality,
        }
    }

    pub fn output(
        binder: &'a Binder,
        binding_data: &'a BindingData,
        trigger_value: &'a BindingValue,
        value: &'a BindingValue,
    ) -> Self {
        Self {
            binder,
            binding_data,
            trigger_value: Some(trigger_value),
            value: Some(value),
            data_type: DataType::default(),
            cardinality: Cardinality::default(),
        }
    }
}

/// A host-side binding implementation.
#[async_trait]
pub trait Binding: Send + Sync {
    /// Produce the value of an input binding.
    async fn bind_input(&self, context: &BindingContext<'_>) -> anyhow::Result<BindingValue> {
        let _ = context;
        anyhow::bail!("binding does not support the input direction")
    }

    /// Write `context.value` for an output binding.
    async fn bind_output(&self, context: &BindingContext<'_>) -> anyhow::Result<()> {
        let _ = context;
        anyhow::bail!("binding does not support the output direction")
    }

    /// Whether the binding's resource name depends on binding data.
    fn has_parameters(&self) -> bool {
        false
    }
}

/// Decode a byte stream according to the declared data type: text for
/// `string` (lossy UTF-8), raw bytes for `binary` and `stream`.
pub fn convert_stream_to_value(bytes: &[u8], data_type: DataType) -> BindingValue {
    match data_type {
        DataType::String => BindingValue::String(String::from_utf8_lossy(bytes).into_owned()),
        DataType::Binary | DataType::Stream => BindingValue::Bytes(bytes.to_vec()),
    }
}
