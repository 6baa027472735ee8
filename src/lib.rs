//! # chat-relay
//!
//! Minimal real-time broadcast relay over WebSocket.
//!
//! Clients open a persistent WebSocket on the registration path, optionally
//! presenting a shared room secret. Every text message one client sends is
//! rebroadcast to all currently registered connections.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket, GET /health)
//!     │
//!     ├── WS Handler + Admission (ws/)
//!     ├── Session loop (ws/session)
//!     │
//!     ├── BroadcastEngine (service/)
//!     │
//!     └── ConnectionRegistry (domain/)
//! ```
//!
//! The [`client`] module provides the matching client with keepalive.

pub mod api;
pub mod app_state;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod server;
pub mod service;
pub mod ws;
