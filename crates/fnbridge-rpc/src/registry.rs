//! Trace sink registry and log routing.
//!
//! A sink is registered under its invocation id before the request is sent
//! and stays registered until the worker's termination record arrives (or
//! the registration lingers out). Records for unknown ids are dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, info, trace, warn};

use crate::error::{RpcError, RpcResult};
use crate::wire::{LogLevel, LogRecord};

/// Per-invocation destination for worker log lines.
pub trait TraceSink: Send + Sync {
    fn write(&self, level: LogLevel, message: &str);
}

/// A [`TraceSink`] that re-emits worker log lines as `tracing` events
/// tagged with the invocation.
#[derive(Debug, Clone)]
pub struct TracingSink {
    invocation_id: String,
    function: String,
}

impl TracingSink {
    pub fn new(invocation_id: &str, function: &str) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            function: function.to_string(),
        }
    }
}

impl TraceSink for TracingSink {
    fn write(&self, level: LogLevel, message: &str) {
        let invocation_id = self.invocation_id.as_str();
        let function = self.function.as_str();
        match level {
            LogLevel::Trace => trace!(invocation_id, function, "{message}"),
            LogLevel::Debug => debug!(invocation_id, function, "{message}"),
            LogLevel::Info => info!(invocation_id, function, "{message}"),
            LogLevel::Warn => warn!(invocation_id, function, "{message}"),
            LogLevel::Error => error!(invocation_id, function, "{message}"),
        }
    }
}

/// What [`TraceSinkRegistry::route`] did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Written to the invocation's sink.
    Forwarded,
    /// Termination record; the sink was unregistered.
    Terminated,
    /// No id, unknown id, or nothing to write.
    Dropped,
}

/// Invocation id → trace sink, shared by callers and the log pump.
#[derive(Default)]
pub struct TraceSinkRegistry {
    sinks: Mutex<HashMap<String, Arc<dyn TraceSink>>>,
}

impl TraceSinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `sink` for `invocation_id`. Fails if the id is already taken.
    pub fn register(&self, invocation_id: &str, sink: Arc<dyn TraceSink>) -> RpcResult<()> {
        let mut sinks = self.sinks.lock().expect("sink registry lock");
        if sinks.contains_key(invocation_id) {
            return Err(RpcError::DuplicateInvocation(invocation_id.to_string()));
        }
        sinks.insert(invocation_id.to_string(), sink);
        Ok(())
    }

    /// Remove a registration. Returns whether one existed.
    pub fn remove(&self, invocation_id: &str) -> bool {
        self.sinks
            .lock()
            .expect("sink registry lock")
            .remove(invocation_id)
            .is_some()
    }

    pub fn contains(&self, invocation_id: &str) -> bool {
        self.sinks
            .lock()
            .expect("sink registry lock")
            .contains_key(invocation_id)
    }

    pub fn len(&self) -> usize {
        self.sinks.lock().expect("sink registry lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver one record to its sink.
    pub fn route(&self, record: &LogRecord) -> RouteOutcome {
        let Some(invocation_id) = record.invocation_id.as_deref() else {
            return RouteOutcome::Dropped;
        };

        if record.is_termination() {
            let existed = self.remove(invocation_id);
            debug!(%invocation_id, existed, "log stream terminated");
            return if existed {
                RouteOutcome::Terminated
            } else {
                RouteOutcome::Dropped
            };
        }

        let sink = self
            .sinks
            .lock()
            .expect("sink registry lock")
            .get(invocation_id)
            .cloned();
        match (sink, record.message.as_deref()) {
            (Some(sink), Some(message)) => {
                // Written outside the lock; sinks may be slow.
                sink.write(record.level(), message);
                RouteOutcome::Forwarded
            }
            _ => RouteOutcome::Dropped,
        }
    }
}

/// Scoped registration: removes the sink when dropped, unless handed off
/// with [`SinkRegistration::release`].
pub struct SinkRegistration {
    registry: Arc<TraceSinkRegistry>,
    invocation_id: String,
    armed: bool,
}

impl SinkRegistration {
    pub fn register(
        registry: Arc<TraceSinkRegistry>,
        invocation_id: &str,
        sink: Arc<dyn TraceSink>,
    ) -> RpcResult<Self> {
        registry.register(invocation_id, sink)?;
        Ok(Self {
            registry,
            invocation_id: invocation_id.to_string(),
            armed: true,
        })
    }

    /// Leave the sink registered for up to `linger` so trailing log records
    /// can still arrive. The termination record removes it earlier.
    ///
    /// Must be called from within a Tokio runtime when `linger` is non-zero.
    pub fn release(mut self, linger: Duration) {
        self.armed = false;
        if linger.is_zero() {
            self.registry.remove(&self.invocation_id);
            return;
        }
        let registry = Arc::clone(&self.registry);
        let invocation_id = std::mem::take(&mut self.invocation_id);
        tokio::spawn(async move {
            tokio::time::sleep(linger).await;
            if registry.remove(&invocation_id) {
                debug!(%invocation_id, "trace sink lingered out without termination record");
            }
        });
    }
}

impl Drop for SinkRegistration {
    fn drop(&mut self) {
        if self.armed {
            self.registry.remove(&self.invocation_id);
        }
    }
}
