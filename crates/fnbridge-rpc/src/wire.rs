//! Wire messages exchanged with the worker.
//!
//! [`InvocationRequest`] and [`InvocationResult`] share field numbers with a
//! single protobuf `FunctionExecution` message:
//!
//! ```text
//! message FunctionExecution {
//!   string invocation_id = 1;
//!   string function_name = 2;
//!   map<string, bytes> input = 3;
//!   map<string, bytes> output = 4;
//! }
//! ```
//!
//! Log records travel as JSON objects on the log channel.

use std::collections::HashMap;

use bytes::Bytes;
use prost::Message;
use serde::{Deserialize, Serialize};

use crate::error::{RpcError, RpcResult};

/// Log message marking the end of an invocation's log stream.
pub const LOG_TERMINATION_TOKEN: &str = "$DIEDIEDIE$";

/// One invocation, sent exactly once to the worker.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InvocationRequest {
    #[prost(string, tag = "1")]
    pub invocation_id: String,
    #[prost(string, tag = "2")]
    pub function_name: String,
    /// Binding name → encoded binding value.
    #[prost(map = "string, bytes", tag = "3")]
    pub input: HashMap<String, Vec<u8>>,
}

impl InvocationRequest {
    pub fn new(invocation_id: &str, function_name: &str) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            function_name: function_name.to_string(),
            input: HashMap::new(),
        }
    }

    pub fn to_frame(&self) -> Bytes {
        Bytes::from(self.encode_to_vec())
    }

    pub fn decode_frame(frame: &[u8]) -> RpcResult<Self> {
        Self::decode(frame).map_err(|e| RpcError::Decode(e.to_string()))
    }
}

/// The worker's reply to an [`InvocationRequest`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InvocationResult {
    /// Echo of the request's id. Workers may leave it empty.
    #[prost(string, tag = "1")]
    pub invocation_id: String,
    #[prost(string, tag = "2")]
    pub function_name: String,
    /// Output name → payload. The return key carries the whole return value.
    #[prost(map = "string, bytes", tag = "4")]
    pub output: HashMap<String, Vec<u8>>,
}

impl InvocationResult {
    pub fn new(invocation_id: &str) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            function_name: String::new(),
            output: HashMap::new(),
        }
    }

    /// Builder method: add an output payload.
    pub fn with_output(mut self, name: &str, payload: impl Into<Vec<u8>>) -> Self {
        self.output.insert(name.to_string(), payload.into());
        self
    }

    pub fn to_frame(&self) -> Bytes {
        Bytes::from(self.encode_to_vec())
    }

    pub fn decode_frame(frame: &[u8]) -> RpcResult<Self> {
        Self::decode(frame).map_err(|e| RpcError::Decode(e.to_string()))
    }
}

/// Severity attached to a worker log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lenient parse of a worker-supplied level; unknown levels are `Info`.
    pub fn parse_lenient(level: &str) -> Self {
        match level.trim().to_ascii_lowercase().as_str() {
            "trace" | "verbose" => LogLevel::Trace,
            "debug" => LogLevel::Debug,
            "warn" | "warning" => LogLevel::Warn,
            "error" | "critical" | "fatal" => LogLevel::Error,
            _ => LogLevel::Info,
        }
    }
}

/// A log line emitted by the worker on behalf of an invocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogRecord {
    #[serde(default)]
    pub invocation_id: Option<String>,
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
}

impl LogRecord {
    pub fn new(invocation_id: &str, message: &str) -> Self {
        Self {
            invocation_id: Some(invocation_id.to_string()),
            function: None,
            message: Some(message.to_string()),
            level: None,
        }
    }

    /// The end-of-stream marker for `invocation_id`.
    pub fn termination(invocation_id: &str) -> Self {
        Self::new(invocation_id, LOG_TERMINATION_TOKEN)
    }

    /// Builder method: set the level.
    pub fn with_level(self, level: &str) -> Self {
        Self {
            level: Some(level.to_string()),
            ..self
        }
    }

    pub fn is_termination(&self) -> bool {
        self.message.as_deref() == Some(LOG_TERMINATION_TOKEN)
    }

    pub fn level(&self) -> LogLevel {
        self.level
            .as_deref()
            .map(LogLevel::parse_lenient)
            .unwrap_or_default()
    }

    pub fn from_frame(frame: &[u8]) -> RpcResult<Self> {
        serde_json::from_slice(frame).map_err(|e| RpcError::Decode(e.to_string()))
    }

    pub fn to_frame(&self) -> Bytes {
        // Serializing a struct of optional strings cannot fail.
        Bytes::from(serde_json::to_vec(self).unwrap_or_default())
    }
}
