//! Output binding application.
//!
//! The worker's result is merged into the context's binding map, then every
//! declared output binding with a value is written.

use std::collections::HashMap;
use std::sync::Arc;

use fnbridge_core::{BindingMetadata, BindingValue, FunctionDescriptor};
use fnbridge_rpc::InvocationResult;
use tracing::debug;

use crate::binding::{Binder, Binding, BindingContext};
use crate::context::InvocationContext;
use crate::error::{InvokerError, InvokerResult};

/// Merge a worker result into `bindings`.
///
/// When the result carries `return_key` and one output is the return
/// binding, only the return value is applied, to that binding's slot. Other
/// keys in the result are ignored. Otherwise every output in the result is
/// copied over, replacing existing values. Payloads are decoded as UTF-8
/// text.
pub fn merge_result(
    outputs: &[BindingMetadata],
    bindings: &mut HashMap<String, BindingValue>,
    result: &InvocationResult,
    return_key: &str,
) {
    let return_binding = outputs.iter().find(|b| b.is_return);
    if let (Some(return_binding), Some(payload)) = (return_binding, result.output.get(return_key)) {
        bindings.insert(return_binding.name.clone(), utf8_value(payload));
        return;
    }

    for (name, payload) in &result.output {
        bindings.insert(name.clone(), utf8_value(payload));
    }
}

fn utf8_value(payload: &[u8]) -> BindingValue {
    BindingValue::String(String::from_utf8_lossy(payload).into_owned())
}

/// Apply `result` to the declared outputs of `descriptor`.
///
/// Outputs without a value (absent or null) are skipped. A failing output
/// binding fails the invocation; bindings after it are not run.
pub async fn apply_outputs(
    descriptor: &FunctionDescriptor,
    bindings: &HashMap<String, Arc<dyn Binding>>,
    binder: &Binder,
    context: &mut InvocationContext,
    result: &InvocationResult,
    return_key: &str,
) -> InvokerResult<()> {
    merge_result(descriptor.outputs(), &mut context.bindings, result, return_key);

    for metadata in descriptor.outputs() {
        let Some(value) = context.bindings.get(&metadata.name) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let binding = bindings
            .get(&metadata.name)
            .ok_or_else(|| InvokerError::MissingBinding {
                function: descriptor.name().to_string(),
                binding: metadata.name.clone(),
            })?;

        let binding_context = BindingContext::output(
            binder,
            &context.binding_data,
            &context.trigger_value,
            value,
        );
        binding
            .bind_output(&binding_context)
            .await
            .map_err(|e| InvokerError::binding(&metadata.name, e))?;
        debug!(invocation_id = %context.invocation_id, binding = %metadata.name, "output bound");
    }
    Ok(())
}
