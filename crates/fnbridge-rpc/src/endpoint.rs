//! Endpoint address strings.
//!
//! An endpoint is `tcp://host:port`, optionally prefixed with `@` (bind and
//! accept) or `>` (connect). Without a prefix the caller's default mode
//! applies. A `*` host binds every interface.

use std::fmt;

use crate::error::{RpcError, RpcResult};

const TCP_SCHEME: &str = "tcp://";

/// Whether the host listens on or dials an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointMode {
    Bind,
    Connect,
}

/// A parsed transport endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub mode: EndpointMode,
    /// Socket address in `host:port` form.
    pub address: String,
}

impl Endpoint {
    pub fn parse(text: &str, default_mode: EndpointMode) -> RpcResult<Self> {
        let text = text.trim();
        let (mode, rest) = if let Some(rest) = text.strip_prefix('@') {
            (EndpointMode::Bind, rest)
        } else if let Some(rest) = text.strip_prefix('>') {
            (EndpointMode::Connect, rest)
        } else {
            (default_mode, text)
        };

        let Some(address) = rest.strip_prefix(TCP_SCHEME) else {
            if rest.contains("://") {
                return Err(RpcError::UnsupportedScheme(text.to_string()));
            }
            return Err(RpcError::InvalidEndpoint(text.to_string()));
        };

        let (host, port) = address
            .rsplit_once(':')
            .ok_or_else(|| RpcError::InvalidEndpoint(text.to_string()))?;
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(RpcError::InvalidEndpoint(text.to_string()));
        }
        let host = if host == "*" { "0.0.0.0" } else { host };

        Ok(Self {
            mode,
            address: format!("{host}:{port}"),
        })
    }

    pub fn bind(address: &str) -> Self {
        Self {
            mode: EndpointMode::Bind,
            address: address.to_string(),
        }
    }

    pub fn connect(address: &str) -> Self {
        Self {
            mode: EndpointMode::Connect,
            address: address.to_string(),
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.mode {
            EndpointMode::Bind => '@',
            EndpointMode::Connect => '>',
        };
        write!(f, "{prefix}{TCP_SCHEME}{}", self.address)
    }
}
