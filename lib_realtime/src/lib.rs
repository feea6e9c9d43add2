//! # lib_realtime
//!
//! Client-side real-time layer for the expert marketplace: a single
//! authenticated event-stream connection per session, a closed-set event
//! dispatcher, a bounded notification buffer, and a cursor-based incremental
//! loader used by every infinite-scroll list.
//!
//! Modules are gated by cargo features so binaries can pull in only what
//! they need (`configs`, `loggers`, `realtime`, `loaders`, `retrieve`,
//! `relay`).

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

/// JSON-file configuration with layered overrides.
#[cfg(feature = "configs")]
pub mod configs;

/// fern-based console/file logging.
#[cfg(feature = "loggers")]
pub mod loggers;

/// Connection manager, event dispatcher and notification buffer.
#[cfg(feature = "realtime")]
pub mod core;

/// Cursor-based incremental loading.
#[cfg(feature = "loaders")]
pub mod loaders;

/// HTTP client and REST page source.
#[cfg(feature = "retrieve")]
pub mod retrieve;

/// Development relay server for the event-stream protocol.
#[cfg(feature = "relay")]
pub mod relay;

// Re-export the types most callers reach for.
#[cfg(feature = "configs")]
pub use crate::configs::RealtimeConfig;
#[cfg(feature = "realtime")]
pub use crate::core::{ConnectionManager, ConnectionState, Notification, NotificationKind, UserRole};
#[cfg(feature = "loaders")]
pub use crate::loaders::{IncrementalLoader, LoadOutcome, PageSource, SentinelObserver};
