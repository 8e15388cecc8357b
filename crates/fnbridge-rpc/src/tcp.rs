//! TCP implementations of the channel traits.
//!
//! Both channels use 4-byte big-endian length-prefixed frames
//! ([`LengthDelimitedCodec`]). Frames above the configured maximum are
//! rejected by the codec and terminate the connection.
//!
//! # Architecture
//!
//! ```text
//! TcpConnector::connect()
//!   ├── connect mode → dial worker
//!   └── bind mode    → accept one worker connection
//!     → FramedChannel (send / recv one frame at a time)
//!
//! TcpLogSource::open()
//!   ├── bind mode    → accept loop, one reader task per worker connection
//!   └── connect mode → connect loop, redial after the stream ends
//!     → mpsc buffer → next_frame()
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_util::codec::{Framed, FramedRead, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel::{ChannelConnector, LogSource, RequestChannel};
use crate::endpoint::{Endpoint, EndpointMode};
use crate::error::{RpcError, RpcResult};

/// Frames buffered between the socket readers and the log pump.
const LOG_BUFFER: usize = 1024;

/// Delay between redial attempts on a connect-mode log endpoint.
const RECONNECT_DELAY: Duration = Duration::from_millis(250);

/// Length-delimited codec capped at `max_frame_bytes`.
pub fn frame_codec(max_frame_bytes: usize) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(max_frame_bytes)
        .new_codec()
}

// ── FramedChannel ────────────────────────────────────────────────────

/// A request channel over one TCP connection.
pub struct FramedChannel {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
}

impl FramedChannel {
    pub fn new(stream: TcpStream, max_frame_bytes: usize) -> Self {
        Self {
            framed: Framed::new(stream, frame_codec(max_frame_bytes)),
        }
    }
}

#[async_trait]
impl RequestChannel for FramedChannel {
    async fn send(&mut self, frame: Bytes) -> RpcResult<()> {
        self.framed
            .send(frame)
            .await
            .map_err(|e| RpcError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> RpcResult<Bytes> {
        match self.framed.next().await {
            Some(Ok(frame)) => Ok(frame.freeze()),
            Some(Err(e)) => Err(RpcError::Receive(e.to_string())),
            None => Err(RpcError::Closed),
        }
    }
}

// ── TcpConnector ─────────────────────────────────────────────────────

/// Opens request channels to the worker.
///
/// In bind mode the listener is bound by [`TcpConnector::open`] and each
/// `connect` waits for the worker to dial in.
pub struct TcpConnector {
    endpoint: Endpoint,
    max_frame_bytes: usize,
    listener: Mutex<Option<TcpListener>>,
    local_addr: Option<SocketAddr>,
}

impl TcpConnector {
    pub async fn open(endpoint: Endpoint, max_frame_bytes: usize) -> RpcResult<Self> {
        let (listener, local_addr) = match endpoint.mode {
            EndpointMode::Bind => {
                let listener = TcpListener::bind(&endpoint.address)
                    .await
                    .map_err(|e| RpcError::Connect(format!("bind {endpoint}: {e}")))?;
                let addr = listener.local_addr().ok();
                (Some(listener), addr)
            }
            EndpointMode::Connect => (None, None),
        };
        Ok(Self {
            endpoint,
            max_frame_bytes,
            listener: Mutex::new(listener),
            local_addr,
        })
    }

    /// Bound address in bind mode.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

#[async_trait]
impl ChannelConnector for TcpConnector {
    async fn connect(&self) -> RpcResult<Box<dyn RequestChannel>> {
        let stream = match self.endpoint.mode {
            EndpointMode::Connect => TcpStream::connect(&self.endpoint.address)
                .await
                .map_err(|e| RpcError::Connect(format!("{}: {e}", self.endpoint)))?,
            EndpointMode::Bind => {
                let guard = self.listener.lock().await;
                let listener = guard
                    .as_ref()
                    .ok_or_else(|| RpcError::Connect(format!("{}: not bound", self.endpoint)))?;
                let (stream, peer) = listener
                    .accept()
                    .await
                    .map_err(|e| RpcError::Connect(format!("accept on {}: {e}", self.endpoint)))?;
                debug!(%peer, "worker connected to request endpoint");
                stream
            }
        };
        let _ = stream.set_nodelay(true);
        debug!(endpoint = %self.endpoint, "request channel open");
        Ok(Box::new(FramedChannel::new(stream, self.max_frame_bytes)))
    }
}

// ── TcpLogSource ─────────────────────────────────────────────────────

/// Inbound log frames from one or more worker connections.
pub struct TcpLogSource {
    frames: mpsc::Receiver<RpcResult<Bytes>>,
    local_addr: Option<SocketAddr>,
    cancel: CancellationToken,
}

impl TcpLogSource {
    pub async fn open(endpoint: &Endpoint, max_frame_bytes: usize) -> RpcResult<Self> {
        let (tx, frames) = mpsc::channel(LOG_BUFFER);
        let cancel = CancellationToken::new();

        let local_addr = match endpoint.mode {
            EndpointMode::Bind => {
                let listener = TcpListener::bind(&endpoint.address)
                    .await
                    .map_err(|e| RpcError::Connect(format!("bind {endpoint}: {e}")))?;
                let addr = listener.local_addr().ok();
                tokio::spawn(accept_loop(listener, max_frame_bytes, tx, cancel.clone()));
                addr
            }
            EndpointMode::Connect => {
                tokio::spawn(connect_loop(
                    endpoint.address.clone(),
                    max_frame_bytes,
                    tx,
                    cancel.clone(),
                ));
                None
            }
        };

        debug!(%endpoint, "log source open");
        Ok(Self {
            frames,
            local_addr,
            cancel,
        })
    }

    /// Bound address in bind mode.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }
}

#[async_trait]
impl LogSource for TcpLogSource {
    async fn next_frame(&mut self) -> Option<RpcResult<Bytes>> {
        self.frames.recv().await
    }
}

impl Drop for TcpLogSource {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn accept_loop(
    listener: TcpListener,
    max_frame_bytes: usize,
    tx: mpsc::Sender<RpcResult<Bytes>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "worker log stream connected");
                    tokio::spawn(read_frames(stream, max_frame_bytes, tx.clone(), cancel.clone()));
                }
                Err(e) => warn!(error = %e, "log listener accept failed"),
            },
        }
    }
}

async fn connect_loop(
    address: String,
    max_frame_bytes: usize,
    tx: mpsc::Sender<RpcResult<Bytes>>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            connected = TcpStream::connect(&address) => match connected {
                Ok(stream) => {
                    debug!(%address, "connected to worker log stream");
                    read_frames(stream, max_frame_bytes, tx.clone(), cancel.clone()).await;
                }
                Err(e) => debug!(%address, error = %e, "log stream connect failed"),
            },
        }
        if tx.is_closed() {
            return;
        }
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

async fn read_frames(
    stream: TcpStream,
    max_frame_bytes: usize,
    tx: mpsc::Sender<RpcResult<Bytes>>,
    cancel: CancellationToken,
) {
    let mut reader = FramedRead::new(stream, frame_codec(max_frame_bytes));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = reader.next() => match next {
                Some(Ok(frame)) => {
                    if tx.send(Ok(frame.freeze())).await.is_err() {
                        break;
                    }
                }
                Some(Err(e)) => {
                    let _ = tx.send(Err(RpcError::Receive(e.to_string()))).await;
                    break;
                }
                None => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connector_and_channel_exchange_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, frame_codec(1024));
            while let Some(Ok(frame)) = framed.next().await {
                let mut reply = b"re:".to_vec();
                reply.extend_from_slice(&frame);
                framed.send(Bytes::from(reply)).await.unwrap();
            }
        });

        let connector = TcpConnector::open(Endpoint::connect(&addr.to_string()), 1024)
            .await
            .unwrap();
        let mut channel = connector.connect().await.unwrap();
        channel.send(Bytes::from_static(b"ping")).await.unwrap();
        assert_eq!(&channel.recv().await.unwrap()[..], b"re:ping");
    }

    #[tokio::test]
    async fn closed_peer_reports_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            drop(stream);
        });

        let connector = TcpConnector::open(Endpoint::connect(&addr.to_string()), 1024)
            .await
            .unwrap();
        let mut channel = connector.connect().await.unwrap();
        assert!(matches!(channel.recv().await, Err(RpcError::Closed)));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut framed = Framed::new(stream, frame_codec(1 << 20));
            framed.send(Bytes::from(vec![7u8; 4096])).await.unwrap();
            let _ = framed.next().await;
        });

        let connector = TcpConnector::open(Endpoint::connect(&addr.to_string()), 1024)
            .await
            .unwrap();
        let mut channel = connector.connect().await.unwrap();
        assert!(matches!(channel.recv().await, Err(RpcError::Receive(_))));
    }

    #[tokio::test]
    async fn bind_mode_log_source_reads_frames() {
        let mut source = TcpLogSource::open(&Endpoint::bind("127.0.0.1:0"), 1024)
            .await
            .unwrap();
        let addr = source.local_addr().unwrap();

        let stream = TcpStream::connect(addr).await.unwrap();
        let mut framed = Framed::new(stream, frame_codec(1024));
        framed.send(Bytes::from_static(b"one")).await.unwrap();
        framed.send(Bytes::from_static(b"two")).await.unwrap();

        assert_eq!(&source.next_frame().await.unwrap().unwrap()[..], b"one");
        assert_eq!(&source.next_frame().await.unwrap().unwrap()[..], b"two");
    }

    #[tokio::test]
    async fn connect_mode_log_source_redials() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            for payload in [&b"first"[..], &b"second"[..]] {
                let (stream, _) = listener.accept().await.unwrap();
                let mut framed = Framed::new(stream, frame_codec(1024));
                framed.send(Bytes::from_static(payload)).await.unwrap();
            }
        });

        let mut source = TcpLogSource::open(&Endpoint::connect(&addr.to_string()), 1024)
            .await
            .unwrap();
        assert_eq!(&source.next_frame().await.unwrap().unwrap()[..], b"first");
        assert_eq!(&source.next_frame().await.unwrap().unwrap()[..], b"second");
    }
}
