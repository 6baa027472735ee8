//! Client side: register/send/receive wrapper and keepalive.

pub mod chat_client;
pub mod heartbeat;

pub use chat_client::ChatClient;
