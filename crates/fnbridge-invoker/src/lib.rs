//! fnbridge-invoker — runs one function invocation across the worker bridge.
//!
//! # Architecture
//!
//! ```text
//! TriggerInput (http / timer / stream / value)
//!   │
//!   ▼
//! InvocationContext::build     shape trigger, binding data, JSON conversion
//!   │
//!   ▼
//! resolve_inputs               non-trigger input bindings, declaration order
//!   │
//!   ▼
//! InvocationTransport          InvocationRequest ──► worker ──► InvocationResult
//!   │
//!   ▼
//! apply_outputs                return value / named outputs → output bindings
//! ```
//!
//! Binding implementations plug in through the [`Binding`] trait;
//! [`RpcFunctionDescriptorProvider`] wires them up from `function.json`
//! metadata via a [`BindingFactory`].

pub mod binding;
pub mod context;
pub mod error;
pub mod inputs;
pub mod invoker;
pub mod outputs;
pub mod provider;
pub mod trigger;

pub use binding::{Binder, Binding, BindingContext, convert_stream_to_value};
pub use context::InvocationContext;
pub use error::{InvokerError, InvokerResult};
pub use invoker::RpcFunctionInvoker;
pub use provider::{BindingFactory, RpcFunctionDescriptorProvider};
pub use trigger::{RouteParams, ScheduleStatus, TimerInfo, TriggerInput};
