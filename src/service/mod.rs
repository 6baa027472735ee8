//! Service layer: message fan-out over the connection registry.
//!
//! [`BroadcastEngine`] is the only component that delivers payloads to
//! peers. It reads the registry and evicts members whose delivery fails.

pub mod broadcast;

pub use broadcast::{BroadcastEngine, BroadcastOptions, BroadcastReport};
