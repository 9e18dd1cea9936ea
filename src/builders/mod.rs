//! Builders
//!
//! Fluent builder for HMRC connection configuration.

pub mod config;

pub use config::{connection_config, ConnectionConfigBuilder};
