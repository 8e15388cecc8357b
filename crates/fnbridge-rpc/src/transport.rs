//! The invocation transport.
//!
//! [`RpcTransport`] owns two background tasks:
//!
//! - the **dispatcher** drains a FIFO queue of invocations and performs one
//!   send/receive exchange at a time on the request channel, so the channel
//!   strictly alternates even when many callers invoke concurrently;
//! - the **log pump** reads log records and routes them through the
//!   [`TraceSinkRegistry`].
//!
//! A failed exchange (send or receive error, reply timeout, undecodable or
//! mismatched reply) discards the request channel, since a stray reply left
//! on it would be read as the answer to the next request. The next
//! invocation reconnects.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use fnbridge_core::config::RpcSettings;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::channel::{ChannelConnector, LogSource, RequestChannel};
use crate::endpoint::{Endpoint, EndpointMode};
use crate::error::{RpcError, RpcResult};
use crate::registry::{SinkRegistration, TraceSink, TraceSinkRegistry};
use crate::tcp::{TcpConnector, TcpLogSource};
use crate::wire::{InvocationRequest, InvocationResult, LogRecord};

/// Runtime transport settings, resolved from [`RpcSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub reply_timeout: Duration,
    pub sink_linger: Duration,
    pub queue_depth: usize,
    pub max_frame_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reply_timeout: Duration::from_secs(30),
            sink_linger: Duration::from_secs(5),
            queue_depth: 64,
            max_frame_bytes: 16 * 1024 * 1024,
        }
    }
}

impl TransportConfig {
    pub fn from_settings(settings: &RpcSettings) -> RpcResult<Self> {
        if settings.queue_depth == 0 {
            return Err(RpcError::Config("rpc.queue_depth must be positive".to_string()));
        }
        Ok(Self {
            reply_timeout: settings.reply_timeout()?,
            sink_linger: settings.sink_linger()?,
            queue_depth: settings.queue_depth,
            max_frame_bytes: settings.max_frame_bytes,
        })
    }
}

/// Sends one invocation to the worker and waits for its reply.
///
/// `sink` receives the worker's log lines for the invocation. It is
/// registered before the request leaves the host.
#[async_trait]
pub trait InvocationTransport: Send + Sync {
    async fn send_invocation(
        &self,
        request: InvocationRequest,
        sink: Arc<dyn TraceSink>,
    ) -> RpcResult<InvocationResult>;
}

/// A queued request/reply exchange.
struct Exchange {
    invocation_id: String,
    frame: Bytes,
    reply: oneshot::Sender<RpcResult<InvocationResult>>,
}

/// Queue-backed transport to an out-of-process worker.
pub struct RpcTransport {
    queue: mpsc::Sender<Exchange>,
    registry: Arc<TraceSinkRegistry>,
    config: TransportConfig,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    request_addr: Option<SocketAddr>,
    log_addr: Option<SocketAddr>,
}

impl RpcTransport {
    /// Start the dispatcher and log pump over the given channels.
    pub fn start(
        config: TransportConfig,
        connector: Arc<dyn ChannelConnector>,
        logs: Box<dyn LogSource>,
    ) -> Self {
        let (queue, queue_rx) = mpsc::channel(config.queue_depth.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let registry = Arc::new(TraceSinkRegistry::new());

        let dispatcher = tokio::spawn(run_dispatcher(
            queue_rx,
            connector,
            config.reply_timeout,
            shutdown_rx.clone(),
        ));
        let pump = tokio::spawn(run_log_pump(logs, Arc::clone(&registry), shutdown_rx));

        Self {
            queue,
            registry,
            config,
            shutdown_tx,
            tasks: Mutex::new(vec![dispatcher, pump]),
            request_addr: None,
            log_addr: None,
        }
    }

    /// Open TCP channels per `settings` and start the transport.
    ///
    /// The request endpoint connects and the log endpoint binds unless the
    /// address carries an explicit `@`/`>` prefix.
    pub async fn connect(settings: &RpcSettings) -> RpcResult<Self> {
        let config = TransportConfig::from_settings(settings)?;
        let request_endpoint = Endpoint::parse(&settings.request_address, EndpointMode::Connect)?;
        let log_endpoint = Endpoint::parse(&settings.log_address, EndpointMode::Bind)?;

        let connector = TcpConnector::open(request_endpoint.clone(), config.max_frame_bytes).await?;
        let logs = TcpLogSource::open(&log_endpoint, config.max_frame_bytes).await?;
        let request_addr = connector.local_addr();
        let log_addr = logs.local_addr();

        let mut transport = Self::start(config, Arc::new(connector), Box::new(logs));
        transport.request_addr = request_addr;
        transport.log_addr = log_addr;

        info!(request = %request_endpoint, log = %log_endpoint, "worker transport started");
        Ok(transport)
    }

    pub fn registry(&self) -> &Arc<TraceSinkRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Bound request address when the request endpoint is in bind mode.
    pub fn request_local_addr(&self) -> Option<SocketAddr> {
        self.request_addr
    }

    /// Bound log address when the log endpoint is in bind mode.
    pub fn log_local_addr(&self) -> Option<SocketAddr> {
        self.log_addr
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Stop both background tasks. Queued invocations fail with
    /// [`RpcError::ShutDown`].
    pub async fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
        let tasks = std::mem::take(&mut *self.tasks.lock().expect("transport task lock"));
        for task in tasks {
            let _ = task.await;
        }
        info!("worker transport stopped");
    }
}

impl Drop for RpcTransport {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

#[async_trait]
impl InvocationTransport for RpcTransport {
    async fn send_invocation(
        &self,
        request: InvocationRequest,
        sink: Arc<dyn TraceSink>,
    ) -> RpcResult<InvocationResult> {
        if self.is_shut_down() {
            return Err(RpcError::ShutDown);
        }

        let invocation_id = request.invocation_id.clone();
        // Registered before the request is sent so early log lines find it.
        let registration = SinkRegistration::register(Arc::clone(&self.registry), &invocation_id, sink)?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.queue
            .send(Exchange {
                invocation_id: invocation_id.clone(),
                frame: request.to_frame(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| RpcError::ShutDown)?;
        debug!(%invocation_id, function = %request.function_name, "invocation queued");

        let result = reply_rx.await.map_err(|_| RpcError::ShutDown)??;
        registration.release(self.config.sink_linger);
        debug!(%invocation_id, outputs = result.output.len(), "invocation reply received");
        Ok(result)
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────

async fn run_dispatcher(
    mut queue: mpsc::Receiver<Exchange>,
    connector: Arc<dyn ChannelConnector>,
    reply_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut channel: Option<Box<dyn RequestChannel>> = None;

    loop {
        let exchange = tokio::select! {
            next = queue.recv() => match next {
                Some(exchange) => exchange,
                None => break,
            },
            _ = shutdown.changed() => break,
        };

        if exchange.reply.is_closed() {
            debug!(invocation_id = %exchange.invocation_id, "caller gone, skipping invocation");
            continue;
        }

        let result = tokio::select! {
            result = exchange_once(
                &mut channel,
                connector.as_ref(),
                &exchange.invocation_id,
                exchange.frame,
                reply_timeout,
            ) => result,
            _ = shutdown.changed() => Err(RpcError::ShutDown),
        };
        if let Err(e) = &result {
            warn!(invocation_id = %exchange.invocation_id, error = %e, "exchange failed, discarding request channel");
            channel = None;
        }
        let _ = exchange.reply.send(result);

        if *shutdown.borrow() {
            break;
        }
    }

    queue.close();
    while let Ok(exchange) = queue.try_recv() {
        let _ = exchange.reply.send(Err(RpcError::ShutDown));
    }
    debug!("dispatcher stopped");
}

/// Send one request and read its reply. The reply must carry the request's
/// invocation id, or no id at all.
async fn exchange_once(
    channel: &mut Option<Box<dyn RequestChannel>>,
    connector: &dyn ChannelConnector,
    invocation_id: &str,
    frame: Bytes,
    reply_timeout: Duration,
) -> RpcResult<InvocationResult> {
    if channel.is_none() {
        let connected = tokio::time::timeout(reply_timeout, connector.connect())
            .await
            .map_err(|_| RpcError::Connect(format!("no worker connection within {reply_timeout:?}")))??;
        *channel = Some(connected);
    }
    let active = channel.as_mut().ok_or(RpcError::Closed)?;

    active.send(frame).await?;
    let reply = tokio::time::timeout(reply_timeout, active.recv())
        .await
        .map_err(|_| RpcError::ReplyTimeout(reply_timeout))??;

    let result = InvocationResult::decode_frame(&reply)?;
    if !result.invocation_id.is_empty() && result.invocation_id != invocation_id {
        return Err(RpcError::CorrelationMismatch {
            expected: invocation_id.to_string(),
            actual: result.invocation_id,
        });
    }
    Ok(result)
}

// ── Log pump ─────────────────────────────────────────────────────────

async fn run_log_pump(
    mut logs: Box<dyn LogSource>,
    registry: Arc<TraceSinkRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let next = tokio::select! {
            next = logs.next_frame() => next,
            _ = shutdown.changed() => break,
        };
        match next {
            Some(Ok(frame)) => match LogRecord::from_frame(&frame) {
                Ok(record) => {
                    let outcome = registry.route(&record);
                    trace!(
                        invocation_id = record.invocation_id.as_deref().unwrap_or(""),
                        ?outcome,
                        "log record routed"
                    );
                }
                Err(e) => warn!(error = %e, "malformed log record"),
            },
            Some(Err(e)) => warn!(error = %e, "log stream error"),
            None => {
                debug!("log source exhausted");
                break;
            }
        }
    }
    debug!("log pump stopped");
}
