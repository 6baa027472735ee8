//! Domain layer: connection identity, connection handles, and the registry.
//!
//! This module contains the server-side model of a relay room: who is
//! connected, how to reach them, and the serialized membership set that
//! every broadcast reads from.

pub mod connection;
pub mod connection_id;
pub mod registry;

pub use connection::{CloseSignal, Connection, Outbox};
pub use connection_id::ConnectionId;
pub use registry::ConnectionRegistry;
