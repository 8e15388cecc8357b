//! Transport error types.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for transport operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Errors raised by the worker transport.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),

    #[error("unsupported endpoint scheme in '{0}'")]
    UnsupportedScheme(String),

    #[error("invalid transport config: {0}")]
    Config(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("receive failed: {0}")]
    Receive(String),

    #[error("failed to decode frame: {0}")]
    Decode(String),

    #[error("no reply within {0:?}")]
    ReplyTimeout(Duration),

    #[error("request channel closed")]
    Closed,

    #[error("transport shut down")]
    ShutDown,

    #[error("invocation {0} already has a registered trace sink")]
    DuplicateInvocation(String),

    #[error("reply for invocation {actual} does not match request {expected}")]
    CorrelationMismatch { expected: String, actual: String },
}

impl From<fnbridge_core::CoreError> for RpcError {
    fn from(e: fnbridge_core::CoreError) -> Self {
        RpcError::Config(e.to_string())
    }
}
