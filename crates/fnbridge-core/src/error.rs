//! Error types for fnbridge core.

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors raised while loading configuration or validating function metadata.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid function descriptor for {function}: {reason}")]
    InvalidDescriptor { function: String, reason: String },

    #[error("failed to read config: {0}")]
    ConfigRead(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("invalid config value for {key}: {value}")]
    ConfigValue { key: String, value: String },

    #[error("failed to parse function metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl CoreError {
    pub(crate) fn descriptor(function: &str, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            function: function.to_string(),
            reason: reason.into(),
        }
    }
}
