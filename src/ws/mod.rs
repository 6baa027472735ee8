//! WebSocket layer: admission, upgrade handling, and session lifecycle.
//!
//! The registration path (default `/register`) is the only WebSocket
//! endpoint. Each admitted client gets one session task plus one writer
//! task.

pub mod admission;
pub mod handler;
pub mod session;
