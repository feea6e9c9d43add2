//! # Relay
//!
//! A small axum server speaking the event-stream protocol: clients
//! authenticate over `/ws`, operators and tests push notifications through
//! `/emit`. Used for local development and for the loopback tests of the
//! connection manager.

pub mod hub;
pub mod server;

pub use hub::{EmitRequest, RelayError, RelayHub};
pub use server::{router, serve};
