//! Binding metadata and function descriptors.
//!
//! Functions are declared with a `function.json`-style document: a list of
//! bindings, each with a name, a type and a direction. [`FunctionDescriptor`]
//! is the validated, immutable form used by the invoker: inputs and outputs
//! split into declaration-ordered lists, exactly one trigger, at most one
//! return binding.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Binding name that denotes the whole function return value.
pub const RETURN_BINDING_NAME: &str = "$return";

/// Declared data type of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    String,
    Binary,
    Stream,
}

/// Declared cardinality of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    #[default]
    One,
    Many,
}

/// Data-movement direction of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    In,
    Out,
    InOut,
}

impl Direction {
    pub fn is_input(self) -> bool {
        matches!(self, Direction::In | Direction::InOut)
    }

    pub fn is_output(self) -> bool {
        matches!(self, Direction::Out | Direction::InOut)
    }
}

/// Script type of a function. Only `rpc` functions are executed by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptType {
    Rpc,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Metadata for a single binding, as declared in `function.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BindingMetadata {
    pub name: String,
    #[serde(rename = "type")]
    pub binding_type: String,
    #[serde(default)]
    pub direction: Direction,
    #[serde(default)]
    pub is_trigger: bool,
    #[serde(default)]
    pub is_return: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<Cardinality>,
    /// Set on HTTP triggers that receive webhooks; the request body then
    /// becomes the positional trigger value.
    #[serde(default, rename = "webHookType", skip_serializing_if = "Option::is_none")]
    pub webhook_type: Option<String>,
    /// Binding-specific properties (`queueName`, `path`, `connection`, ...).
    #[serde(flatten)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl BindingMetadata {
    pub fn new(name: &str, binding_type: &str, direction: Direction) -> Self {
        Self {
            name: name.to_string(),
            binding_type: binding_type.to_string(),
            direction,
            is_trigger: false,
            is_return: false,
            data_type: None,
            cardinality: None,
            webhook_type: None,
            properties: BTreeMap::new(),
        }
    }

    /// Builder method: mark this binding as the function trigger.
    pub fn trigger(self) -> Self {
        Self {
            is_trigger: true,
            ..self
        }
    }

    /// Builder method: mark this binding as receiving the whole return value.
    pub fn returning(self) -> Self {
        Self {
            is_return: true,
            ..self
        }
    }

    /// Builder method: set the declared data type.
    pub fn with_data_type(self, data_type: DataType) -> Self {
        Self {
            data_type: Some(data_type),
            ..self
        }
    }

    /// Builder method: set the declared cardinality.
    pub fn with_cardinality(self, cardinality: Cardinality) -> Self {
        Self {
            cardinality: Some(cardinality),
            ..self
        }
    }

    /// Builder method: set the webhook type (HTTP triggers only).
    pub fn with_webhook_type(self, webhook_type: &str) -> Self {
        Self {
            webhook_type: Some(webhook_type.to_string()),
            ..self
        }
    }

    /// Builder method: attach a binding-specific property.
    pub fn with_property(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.to_string(), value.into());
        self
    }

    /// Declared data type, defaulting to `string`.
    pub fn data_type_or_default(&self) -> DataType {
        self.data_type.unwrap_or_default()
    }

    /// Declared cardinality, defaulting to `one`.
    pub fn cardinality_or_default(&self) -> Cardinality {
        self.cardinality.unwrap_or_default()
    }

    /// Whether this is a webhook-style HTTP trigger.
    pub fn is_webhook(&self) -> bool {
        self.webhook_type.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Look up a string-valued binding property.
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(|v| v.as_str())
    }

    /// Fill in the flags implied by the binding's type and name.
    fn normalized(mut self) -> Self {
        if self.binding_type.to_ascii_lowercase().ends_with("trigger") {
            self.is_trigger = true;
        }
        if self.name == RETURN_BINDING_NAME {
            self.is_return = true;
        }
        self
    }
}

/// Raw function metadata as read from a `function.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionMetadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub script_type: ScriptType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_file: Option<String>,
    #[serde(default)]
    pub bindings: Vec<BindingMetadata>,
}

impl FunctionMetadata {
    /// Parse function metadata from JSON text.
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read function metadata from a file. When the document carries no
    /// name, the parent directory name is used.
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut metadata = Self::from_json_str(&content)?;
        if metadata.name.is_empty() {
            metadata.name = path
                .parent()
                .and_then(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
        }
        debug!(path = %path.display(), function = %metadata.name, bindings = metadata.bindings.len(), "loaded function metadata");
        Ok(metadata)
    }
}

/// Validated description of a function's bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDescriptor {
    name: String,
    inputs: Vec<BindingMetadata>,
    outputs: Vec<BindingMetadata>,
    trigger_index: usize,
}

impl FunctionDescriptor {
    /// Build a descriptor from explicit input and output lists.
    ///
    /// Fails unless binding names are unique, exactly one input is the
    /// trigger, and at most one output is the return binding.
    pub fn new(
        name: &str,
        inputs: Vec<BindingMetadata>,
        outputs: Vec<BindingMetadata>,
    ) -> CoreResult<Self> {
        let mut seen = HashSet::new();
        for binding in &inputs {
            if !seen.insert(binding.name.as_str()) {
                return Err(CoreError::descriptor(
                    name,
                    format!("duplicate input binding '{}'", binding.name),
                ));
            }
        }
        let input_names = seen;
        let mut seen = HashSet::new();
        for binding in &outputs {
            if !seen.insert(binding.name.as_str()) {
                return Err(CoreError::descriptor(
                    name,
                    format!("duplicate output binding '{}'", binding.name),
                ));
            }
            if input_names.contains(binding.name.as_str()) && binding.direction != Direction::InOut {
                return Err(CoreError::descriptor(
                    name,
                    format!("binding '{}' declared as both input and output", binding.name),
                ));
            }
        }

        let triggers: Vec<usize> = inputs
            .iter()
            .enumerate()
            .filter(|(_, b)| b.is_trigger)
            .map(|(i, _)| i)
            .collect();
        let trigger_index = match triggers.as_slice() {
            [index] => *index,
            [] => return Err(CoreError::descriptor(name, "no trigger binding")),
            many => {
                return Err(CoreError::descriptor(
                    name,
                    format!("{} trigger bindings", many.len()),
                ));
            }
        };
        if outputs.iter().any(|b| b.is_trigger) {
            return Err(CoreError::descriptor(name, "trigger declared as output"));
        }
        let returns = outputs.iter().filter(|b| b.is_return).count();
        if returns > 1 {
            return Err(CoreError::descriptor(
                name,
                format!("{returns} return bindings"),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            inputs,
            outputs,
            trigger_index,
        })
    }

    /// Build a descriptor from `function.json` metadata, splitting bindings
    /// by direction while preserving declaration order.
    pub fn from_metadata(metadata: &FunctionMetadata) -> CoreResult<Self> {
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for binding in &metadata.bindings {
            let binding = binding.clone().normalized();
            if binding.direction.is_input() {
                inputs.push(binding.clone());
            }
            if binding.direction.is_output() {
                outputs.push(binding);
            }
        }
        Self::new(&metadata.name, inputs, outputs)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// All input bindings in declaration order, trigger included.
    pub fn inputs(&self) -> &[BindingMetadata] {
        &self.inputs
    }

    /// All output bindings in declaration order.
    pub fn outputs(&self) -> &[BindingMetadata] {
        &self.outputs
    }

    /// The trigger binding.
    pub fn trigger(&self) -> &BindingMetadata {
        &self.inputs[self.trigger_index]
    }

    /// Non-trigger input bindings in declaration order.
    pub fn non_trigger_inputs(&self) -> impl Iterator<Item = &BindingMetadata> {
        self.inputs.iter().filter(|b| !b.is_trigger)
    }

    /// The output binding that receives the whole return value, if any.
    pub fn return_binding(&self) -> Option<&BindingMetadata> {
        self.outputs.iter().find(|b| b.is_return)
    }
}
