//! Channel abstractions used by the transport.
//!
//! The transport never touches sockets directly: it drives a
//! [`RequestChannel`] obtained from a [`ChannelConnector`] and pulls frames
//! from a [`LogSource`]. The TCP implementations live in [`crate::tcp`];
//! tests inject in-memory ones.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::RpcResult;

/// A strictly alternating request/reply channel to the worker.
///
/// Callers must not `send` again until the previous `recv` has returned.
#[async_trait]
pub trait RequestChannel: Send {
    async fn send(&mut self, frame: Bytes) -> RpcResult<()>;
    async fn recv(&mut self) -> RpcResult<Bytes>;
}

/// Factory for request channels. Invoked lazily, and again after a channel
/// has been discarded.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    async fn connect(&self) -> RpcResult<Box<dyn RequestChannel>>;
}

/// Source of inbound log frames.
#[async_trait]
pub trait LogSource: Send {
    /// The next frame, or `None` once the source is exhausted.
    async fn next_frame(&mut self) -> Option<RpcResult<Bytes>>;
}

#[async_trait]
impl LogSource for mpsc::Receiver<Bytes> {
    async fn next_frame(&mut self) -> Option<RpcResult<Bytes>> {
        self.recv().await.map(Ok)
    }
}
