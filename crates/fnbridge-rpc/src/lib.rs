//! fnbridge-rpc — transport between the host and an out-of-process worker.
//!
//! Two independent channels connect the host to a language worker:
//!
//! ```text
//! send_invocation(request, sink)
//!   ├── TraceSinkRegistry.register(invocation_id, sink)
//!   ├── dispatch queue (FIFO) ──► dispatcher task ──► request/reply channel
//!   │                                 one exchange in flight at a time
//!   └── reply ◄────────────────────────┘
//!
//! worker log stream ──► log pump task ──► TraceSinkRegistry.route(record)
//!                                           ├── sentinel → unregister
//!                                           ├── known id → sink.write()
//!                                           └── unknown id → drop
//! ```
//!
//! Both channels carry length-delimited frames. Invocation messages are
//! protobuf (`prost`), log records are JSON.

pub mod channel;
pub mod endpoint;
pub mod error;
pub mod registry;
pub mod tcp;
pub mod transport;
pub mod wire;

pub use channel::{ChannelConnector, LogSource, RequestChannel};
pub use endpoint::{Endpoint, EndpointMode};
pub use error::{RpcError, RpcResult};
pub use registry::{RouteOutcome, SinkRegistration, TraceSink, TraceSinkRegistry, TracingSink};
pub use transport::{InvocationTransport, RpcTransport, TransportConfig};
pub use wire::{InvocationRequest, InvocationResult, LogLevel, LogRecord, LOG_TERMINATION_TOKEN};
