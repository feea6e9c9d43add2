//! # Configuration Modules
//!
//! Settings shared by the real-time client, the loaders and the relay,
//! resolved from layered sources (defaults, JSON file, environment/CLI).

/// Client configuration: endpoints, page sizes, buffer capacity, logging.
pub mod config_client;

pub use config_client::{ConfigError, ConfigLayer, RealtimeConfig};
