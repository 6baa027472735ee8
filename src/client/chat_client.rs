//! Chat relay client.
//!
//! [`ChatClient`] wraps one WebSocket connection to a relay server. It is
//! created disconnected; [`ChatClient::register`] dials the server with the
//! room secret and starts the keepalive task.

use std::fmt;
use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{ORIGIN, SEC_WEBSOCKET_PROTOCOL};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::heartbeat::{self, HEARTBEAT_PAYLOAD};
use crate::config::ClientConfig;
use crate::error::RelayError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

struct ClientConnection {
    writer: Arc<Mutex<WsSink>>,
    reader: SplitStream<WsStream>,
    heartbeat: JoinHandle<()>,
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        self.heartbeat.abort();
    }
}

/// A client of one relay room.
pub struct ChatClient {
    client_id: String,
    config: ClientConfig,
    conn: Option<ClientConnection>,
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("client_id", &self.client_id)
            .field("url", &self.config.url().as_str())
            .field("connected", &self.conn.is_some())
            .finish_non_exhaustive()
    }
}

impl ChatClient {
    /// Creates a disconnected client.
    #[must_use]
    pub fn new(client_id: impl Into<String>, config: ClientConfig) -> Self {
        Self {
            client_id: client_id.into(),
            config,
            conn: None,
        }
    }

    /// Returns the caller-chosen client label.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Returns `true` after a successful [`ChatClient::register`].
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Connects to the server with `secret` and starts the keepalive task.
    ///
    /// Pass an empty secret for a public room. Registering again replaces
    /// the current connection.
    ///
    /// # Errors
    ///
    /// - [`RelayError::InvalidUrl`] if the handshake request cannot be built.
    /// - [`RelayError::AdmissionDenied`] if the server rejects the secret.
    /// - [`RelayError::Transport`] if the connection cannot be established.
    pub async fn register(&mut self, secret: &str) -> Result<(), RelayError> {
        self.close().await;

        let url = self.config.url_with_secret(secret);
        let mut request = url
            .as_str()
            .into_client_request()
            .map_err(|e| RelayError::InvalidUrl(e.to_string()))?;
        let headers = request.headers_mut();
        if !self.config.origin().is_empty() {
            let origin = HeaderValue::from_str(self.config.origin())
                .map_err(|e| RelayError::InvalidUrl(format!("origin: {e}")))?;
            headers.insert(ORIGIN, origin);
        }
        if !self.config.protocol().is_empty() {
            let protocol = HeaderValue::from_str(self.config.protocol())
                .map_err(|e| RelayError::InvalidUrl(format!("protocol: {e}")))?;
            headers.insert(SEC_WEBSOCKET_PROTOCOL, protocol);
        }

        let (stream, _response) = connect_async(request).await.map_err(|e| match e {
            WsError::Http(response) if response.status().as_u16() == 401 => {
                RelayError::AdmissionDenied
            }
            other => RelayError::Transport(format!("can not connect to server: {other}")),
        })?;

        let (writer, reader) = stream.split();
        let writer = Arc::new(Mutex::new(writer));
        let heartbeat = heartbeat::spawn(Arc::clone(&writer), self.config.heartbeat_interval());
        self.conn = Some(ClientConnection {
            writer,
            reader,
            heartbeat,
        });

        tracing::info!(client_id = %self.client_id, url = %self.config.url(), "registered with chat server");
        Ok(())
    }

    /// Sends one text message to the room.
    ///
    /// # Errors
    ///
    /// - [`RelayError::NotConnected`] before [`ChatClient::register`].
    /// - [`RelayError::DeliveryFailed`] on a transport error.
    pub async fn send(&self, message: &str) -> Result<(), RelayError> {
        let Some(conn) = &self.conn else {
            tracing::warn!(client_id = %self.client_id, "send before register");
            return Err(RelayError::NotConnected);
        };
        conn.writer
            .lock()
            .await
            .send(Message::text(message.to_string()))
            .await
            .map_err(|e| {
                tracing::warn!(client_id = %self.client_id, error = %e, "can not send message to server");
                RelayError::DeliveryFailed(format!("can not send message to server: {e}"))
            })
    }

    /// Waits for the next message relayed by the server.
    ///
    /// Keepalive payloads, control frames and binary frames are skipped.
    /// A room message whose text is exactly [`HEARTBEAT_PAYLOAD`] cannot be
    /// told apart from a keepalive and is skipped too.
    ///
    /// # Errors
    ///
    /// - [`RelayError::NotConnected`] before [`ChatClient::register`].
    /// - [`RelayError::DeliveryFailed`] on a transport error or when the
    ///   server closes the connection.
    pub async fn receive(&mut self) -> Result<String, RelayError> {
        let Some(conn) = self.conn.as_mut() else {
            tracing::warn!(client_id = %self.client_id, "receive before register");
            return Err(RelayError::NotConnected);
        };
        loop {
            match conn.reader.next().await {
                Some(Ok(Message::Text(text))) => {
                    if text.as_str() == HEARTBEAT_PAYLOAD {
                        continue;
                    }
                    return Ok(text.as_str().to_owned());
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(RelayError::DeliveryFailed(
                        "server closed the connection".to_string(),
                    ));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!(client_id = %self.client_id, error = %e, "can not receive message from server");
                    return Err(RelayError::DeliveryFailed(format!(
                        "can not receive message from server: {e}"
                    )));
                }
            }
        }
    }

    /// Stops the keepalive task and closes the connection, if any.
    pub async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            conn.heartbeat.abort();
            let _ = conn.writer.lock().await.close().await;
            tracing::debug!(client_id = %self.client_id, "connection closed");
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    fn client() -> ChatClient {
        let Ok(config) = ClientConfig::new("http://localhost/", "chat", "ws://127.0.0.1:9/register")
        else {
            panic!("valid url rejected");
        };
        ChatClient::new("alice", config)
    }

    #[tokio::test]
    async fn send_before_register_is_not_connected() {
        let client = client();
        assert!(!client.is_connected());
        assert!(matches!(client.send("hi").await, Err(RelayError::NotConnected)));
    }

    #[tokio::test]
    async fn receive_before_register_is_not_connected() {
        let mut client = client();
        assert!(matches!(client.receive().await, Err(RelayError::NotConnected)));
    }

    #[tokio::test]
    async fn close_without_connection_is_noop() {
        let mut client = client();
        client.close().await;
        assert!(!client.is_connected());
        assert_eq!(client.client_id(), "alice");
    }

    #[tokio::test]
    async fn register_without_server_is_transport_error() {
        let mut client = client();
        let result = client.register("").await;
        assert!(matches!(result, Err(RelayError::Transport(_))));
        assert!(!client.is_connected());
    }
}
