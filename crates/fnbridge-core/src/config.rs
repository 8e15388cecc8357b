//! fnbridge.toml configuration parser.
//!
//! Every field is optional; a missing file section falls back to the
//! defaults below.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::types::RETURN_BINDING_NAME;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub rpc: RpcSettings,
    pub logging: LoggingConfig,
}

/// Worker transport settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    /// Request/reply endpoint. Connects unless prefixed with `@`.
    pub request_address: String,
    /// Log stream endpoint. Binds unless prefixed with `>`.
    pub log_address: String,
    /// Maximum time to wait for a worker reply (`500ms`, `30s`, `2m`).
    pub reply_timeout: String,
    /// How long a trace sink stays registered after its reply arrives,
    /// waiting for the worker's end-of-log marker.
    pub sink_linger: String,
    /// Capacity of the invocation dispatch queue.
    pub queue_depth: usize,
    /// Largest frame accepted on either channel.
    pub max_frame_bytes: usize,
    /// Output key that carries the whole function return value.
    pub return_key: String,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            request_address: "tcp://127.0.0.1:5559".to_string(),
            log_address: ">tcp://127.0.0.1:5557".to_string(),
            reply_timeout: "30s".to_string(),
            sink_linger: "5s".to_string(),
            queue_depth: 64,
            max_frame_bytes: 16 * 1024 * 1024,
            return_key: RETURN_BINDING_NAME.to_string(),
        }
    }
}

impl RpcSettings {
    pub fn reply_timeout(&self) -> CoreResult<Duration> {
        parse_setting("rpc.reply_timeout", &self.reply_timeout)
    }

    pub fn sink_linger(&self) -> CoreResult<Duration> {
        parse_setting("rpc.sink_linger", &self.sink_linger)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directives used when `RUST_LOG` is not set.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

impl BridgeConfig {
    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "loaded bridge config");
        Ok(config)
    }

    /// Parse and validate a config document.
    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: BridgeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> CoreResult<()> {
        self.rpc.reply_timeout()?;
        self.rpc.sink_linger()?;
        if self.rpc.queue_depth == 0 {
            return Err(CoreError::ConfigValue {
                key: "rpc.queue_depth".to_string(),
                value: "0".to_string(),
            });
        }
        if self.rpc.return_key.is_empty() {
            return Err(CoreError::ConfigValue {
                key: "rpc.return_key".to_string(),
                value: String::new(),
            });
        }
        Ok(())
    }
}

fn parse_setting(key: &str, value: &str) -> CoreResult<Duration> {
    parse_duration(value).ok_or_else(|| CoreError::ConfigValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Parse `500ms`, `30s`, `2m`, or a plain number of seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
