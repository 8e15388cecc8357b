//! Function descriptor provider for RPC functions.
//!
//! Turns `function.json` metadata into a ready [`RpcFunctionInvoker`]:
//! validates the bindings, asks a [`BindingFactory`] for each non-trigger
//! binding, and attaches the shared transport.

use std::collections::HashMap;
use std::sync::Arc;

use fnbridge_core::{
    BindingMetadata, FunctionDescriptor, FunctionMetadata, RETURN_BINDING_NAME, ScriptType,
};
use fnbridge_rpc::InvocationTransport;
use tracing::{debug, info};

use crate::binding::Binding;
use crate::error::InvokerResult;
use crate::invoker::RpcFunctionInvoker;

/// Creates binding implementations from metadata.
///
/// Return [`crate::InvokerError::UnknownBindingType`] for binding types the
/// host does not support.
pub trait BindingFactory: Send + Sync {
    fn create(&self, metadata: &BindingMetadata) -> InvokerResult<Arc<dyn Binding>>;
}

/// Builds invokers for functions whose script type is `rpc`.
pub struct RpcFunctionDescriptorProvider {
    factory: Arc<dyn BindingFactory>,
    transport: Arc<dyn InvocationTransport>,
    return_key: String,
}

impl RpcFunctionDescriptorProvider {
    pub fn new(factory: Arc<dyn BindingFactory>, transport: Arc<dyn InvocationTransport>) -> Self {
        Self {
            factory,
            transport,
            return_key: RETURN_BINDING_NAME.to_string(),
        }
    }

    /// Builder method: set the result key that carries the return value.
    pub fn with_return_key(self, return_key: &str) -> Self {
        Self {
            return_key: return_key.to_string(),
            ..self
        }
    }

    /// Create an invoker for `metadata`.
    ///
    /// Returns `Ok(None)` for functions that are not `rpc` functions, so
    /// another provider can claim them.
    pub fn try_create(&self, metadata: &FunctionMetadata) -> InvokerResult<Option<RpcFunctionInvoker>> {
        if metadata.script_type != ScriptType::Rpc {
            debug!(function = %metadata.name, "not an rpc function, skipping");
            return Ok(None);
        }

        let descriptor = FunctionDescriptor::from_metadata(metadata)?;
        let mut bindings: HashMap<String, Arc<dyn Binding>> = HashMap::new();
        for binding in descriptor.inputs().iter().chain(descriptor.outputs()) {
            if binding.is_trigger || bindings.contains_key(&binding.name) {
                continue;
            }
            bindings.insert(binding.name.clone(), self.factory.create(binding)?);
        }

        info!(
            function = %descriptor.name(),
            trigger = %descriptor.trigger().binding_type,
            inputs = descriptor.inputs().len(),
            outputs = descriptor.outputs().len(),
            "rpc function loaded"
        );
        let invoker = RpcFunctionInvoker::new(descriptor, bindings, Arc::clone(&self.transport))?
            .with_return_key(&self.return_key);
        Ok(Some(invoker))
    }
}
