//! # Real-time Core
//!
//! The client half of the notification system. One [`ConnectionManager`]
//! owns at most one live event-stream connection per session; inbound frames
//! are classified by the [`dispatcher`] into a closed set of notification
//! kinds and stored newest-first in a bounded [`buffer`].
//!
//! ## Components:
//!
//! - **`protocol`**: the JSON envelope spoken on the wire and the handshake payload.
//! - **`notification`**: the uniform notification record and its kinds.
//! - **`dispatcher`**: maps raw inbound frames to notifications, failing soft.
//! - **`buffer`**: newest-first storage capped at a fixed number of entries.
//! - **`transport`**: the `Connector` seam and its WebSocket implementation.
//! - **`connection`**: session lifecycle (connect, authenticate, disconnect, send).

/// Error type shared by the real-time components.
pub mod error;
/// Wire envelope and handshake payloads.
pub mod protocol;
/// Notification record and the closed set of kinds.
pub mod notification;
/// Inbound frame classification.
pub mod dispatcher;
/// Bounded newest-first notification store.
pub mod buffer;
/// Transport seam and the tokio-tungstenite connector.
pub mod transport;
/// Connection lifecycle manager.
pub mod connection;

pub use buffer::NotificationBuffer;
pub use connection::{ConnectOutcome, ConnectionManager, ConnectionState, RuntimeSurface, SessionUser};
pub use dispatcher::{EventDispatcher, Inbound};
pub use error::RealtimeError;
pub use notification::{Notification, NotificationKind};
pub use protocol::{UserRole, WireFrame};
pub use transport::{Connector, Link, WsConnector};
