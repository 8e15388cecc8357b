//! fnbridge-core — shared types for the fnbridge invocation bridge.
//!
//! - **types**: binding metadata and function descriptors (`function.json`)
//! - **value**: the dynamic [`BindingValue`] that flows through bindings
//! - **convert**: opportunistic JSON detection, binding-data normalization,
//!   content-type based body decoding
//! - **config**: `fnbridge.toml` parsing

pub mod config;
pub mod convert;
pub mod error;
pub mod types;
pub mod value;

pub use config::BridgeConfig;
pub use error::{CoreError, CoreResult};
pub use types::*;
pub use value::{BindingData, BindingValue};
