//! Configuration module for the rendering gateway (§4.8, §6.1).
//!
//! Provides `GatewayConfig` and its type-safe builder for configuring the
//! gateway with validation and sensible defaults.

mod builder;
mod env;
mod types;

pub use builder::{GatewayConfigBuilder, WithCdpEndpoint, WithListenAddr};
pub use types::{CacheBackendKind, GatewayConfig};
