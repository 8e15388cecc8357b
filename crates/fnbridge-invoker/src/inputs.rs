//! Input binding resolution.

use std::collections::HashMap;
use std::sync::Arc;

use fnbridge_core::FunctionDescriptor;
use fnbridge_core::convert::try_convert_if_json;
use tracing::debug;

use crate::binding::{Binder, Binding, BindingContext};
use crate::context::InvocationContext;
use crate::error::{InvokerError, InvokerResult};

/// Run every non-trigger input binding in declaration order.
///
/// The positional inputs become `[trigger value, input 1, input 2, ...]`.
/// Each bound value is passed through JSON conversion before it is
/// registered. The first failing binding fails the whole invocation.
pub async fn resolve_inputs(
    descriptor: &FunctionDescriptor,
    bindings: &HashMap<String, Arc<dyn Binding>>,
    binder: &Binder,
    context: &mut InvocationContext,
) -> InvokerResult<()> {
    let trigger = descriptor.trigger();
    let trigger_value = context
        .bindings
        .get(&trigger.name)
        .cloned()
        .unwrap_or_default();
    context.inputs.clear();
    context.inputs.push(trigger_value);

    for metadata in descriptor.non_trigger_inputs() {
        let binding = bindings
            .get(&metadata.name)
            .ok_or_else(|| InvokerError::MissingBinding {
                function: descriptor.name().to_string(),
                binding: metadata.name.clone(),
            })?;

        let binding_context = BindingContext::input(
            binder,
            &context.binding_data,
            metadata.data_type_or_default(),
            metadata.cardinality_or_default(),
        );
        let value = binding
            .bind_input(&binding_context)
            .await
            .map_err(|e| InvokerError::binding(&metadata.name, e))?;
        let value = try_convert_if_json(&value).unwrap_or(value);

        debug!(invocation_id = %context.invocation_id, binding = %metadata.name, "input bound");
        context.bindings.insert(metadata.name.clone(), value.clone());
        context.inputs.push(value);
    }
    Ok(())
}
