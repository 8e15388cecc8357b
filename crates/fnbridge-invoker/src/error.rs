//! Invoker error types.

use fnbridge_core::CoreError;
use fnbridge_rpc::RpcError;
use thiserror::Error;

/// Result type alias for invoker operations.
pub type InvokerResult<T> = Result<T, InvokerError>;

/// Errors that fail an invocation or the creation of an invoker.
#[derive(Debug, Error)]
pub enum InvokerError {
    #[error(transparent)]
    Descriptor(#[from] CoreError),

    #[error("binding '{binding}' failed: {source}")]
    Binding {
        binding: String,
        source: anyhow::Error,
    },

    #[error("worker transport: {0}")]
    Transport(#[from] RpcError),

    #[error("function '{function}' has no implementation for binding '{binding}'")]
    MissingBinding { function: String, binding: String },

    #[error("unsupported binding type '{0}'")]
    UnknownBindingType(String),
}

impl InvokerError {
    pub(crate) fn binding(binding: &str, source: anyhow::Error) -> Self {
        Self::Binding {
            binding: binding.to_string(),
            source,
        }
    }
}
