//! Server and client configuration.
//!
//! The server follows 12-factor style: all settings come from environment
//! variables (or a `.env` file via `dotenvy`). The client is configured in
//! code through [`ClientConfig::new`].

use std::net::SocketAddr;
use std::time::Duration;

use url::Url;

use crate::error::RelayError;
use crate::service::BroadcastOptions;

/// Default registration path, the only WebSocket route the server exposes.
pub const DEFAULT_PATH: &str = "/register";

/// Default sub-protocol negotiated during the handshake.
pub const DEFAULT_SUBPROTOCOL: &str = "chat";

/// Default interval between client keepalive payloads.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Top-level relay server configuration.
///
/// Loaded once at startup via [`ServerConfig::from_env`] and immutable
/// afterwards.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Room secret. Empty means a public room.
    pub password: String,

    /// Path that accepts WebSocket upgrades.
    pub path: String,

    /// Sub-protocols the server is willing to negotiate.
    pub subprotocols: Vec<String>,

    /// Whether a sender receives its own broadcast.
    pub echo_to_sender: bool,

    /// Per-member delivery timeout in milliseconds.
    pub write_timeout_ms: u64,

    /// Capacity of each connection's outbound queue.
    pub outbound_capacity: usize,

    /// Tracing output format.
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Creates a configuration with defaults for everything but the
    /// listen address and room secret.
    #[must_use]
    pub fn new(listen_addr: SocketAddr, password: impl Into<String>) -> Self {
        Self {
            listen_addr,
            password: password.into(),
            path: DEFAULT_PATH.to_string(),
            subprotocols: vec![DEFAULT_SUBPROTOCOL.to_string()],
            echo_to_sender: true,
            write_timeout_ms: 5_000,
            outbound_capacity: 64,
            log_format: LogFormat::Text,
        }
    }

    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConfig`] if `LISTEN_ADDR` cannot be
    /// parsed as a [`SocketAddr`] or `RELAY_PATH` does not start with `/`.
    pub fn from_env() -> Result<Self, RelayError> {
        dotenvy::dotenv().ok();

        let raw_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let listen_addr: SocketAddr = raw_addr
            .parse()
            .map_err(|e| RelayError::InvalidConfig(format!("LISTEN_ADDR {raw_addr:?}: {e}")))?;

        let password = std::env::var("RELAY_PASSWORD").unwrap_or_default();

        let path = std::env::var("RELAY_PATH").unwrap_or_else(|_| DEFAULT_PATH.to_string());
        if !path.starts_with('/') {
            return Err(RelayError::InvalidConfig(format!(
                "RELAY_PATH must start with '/', got {path:?}"
            )));
        }

        let subprotocols = std::env::var("RELAY_SUBPROTOCOLS")
            .map(|raw| parse_list(&raw))
            .unwrap_or_else(|_| vec![DEFAULT_SUBPROTOCOL.to_string()]);

        let defaults = Self::new(listen_addr, password);
        Ok(Self {
            path,
            subprotocols,
            echo_to_sender: parse_env_bool("RELAY_ECHO_TO_SENDER", defaults.echo_to_sender),
            write_timeout_ms: parse_env("RELAY_WRITE_TIMEOUT_MS", defaults.write_timeout_ms),
            outbound_capacity: parse_env("RELAY_OUTBOUND_CAPACITY", defaults.outbound_capacity),
            log_format: parse_log_format(std::env::var("LOG_FORMAT").ok().as_deref()),
            ..defaults
        })
    }

    /// Returns `true` when no secret is required to join.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.password.is_empty()
    }

    /// Returns the delivery policy derived from this configuration.
    #[must_use]
    pub const fn broadcast_options(&self) -> BroadcastOptions {
        BroadcastOptions {
            write_timeout: Duration::from_millis(self.write_timeout_ms),
            echo_to_sender: self.echo_to_sender,
        }
    }
}

/// Connection settings for [`crate::client::ChatClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    origin: String,
    protocol: String,
    url: Url,
    heartbeat_interval: Duration,
}

impl ClientConfig {
    /// Parses `url` and builds a client configuration.
    ///
    /// `protocol` may be empty, in which case no sub-protocol is requested.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidUrl`] if `url` does not parse or its
    /// scheme is not `ws` or `wss`.
    pub fn new(
        origin: impl Into<String>,
        protocol: impl Into<String>,
        url: &str,
    ) -> Result<Self, RelayError> {
        let url = Url::parse(url).map_err(|e| RelayError::InvalidUrl(format!("{url}: {e}")))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(RelayError::InvalidUrl(format!(
                "unsupported scheme {:?}, expected ws or wss",
                url.scheme()
            )));
        }
        Ok(Self {
            origin: origin.into(),
            protocol: protocol.into(),
            url,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        })
    }

    /// Overrides the keepalive interval (default 60 s).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConfig`] if `interval` is zero.
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Result<Self, RelayError> {
        if interval.is_zero() {
            return Err(RelayError::InvalidConfig(
                "heartbeat interval must be non-zero".to_string(),
            ));
        }
        self.heartbeat_interval = interval;
        Ok(self)
    }

    /// Returns the declared `Origin`.
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Returns the requested sub-protocol.
    #[must_use]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// Returns the server URL without credentials.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }

    /// Returns the keepalive interval.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Returns the server URL with its query replaced by `pwd=<secret>`.
    #[must_use]
    pub fn url_with_secret(&self, secret: &str) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().clear().append_pair("pwd", secret);
        url
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable as a boolean. See [`parse_bool`].
fn parse_env_bool(key: &str, default: bool) -> bool {
    parse_bool(std::env::var(key).ok().as_deref(), default)
}

/// Accepts `"true"`, `"1"`, `"false"`, `"0"` (case-insensitive).
/// Returns `default` otherwise.
fn parse_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(str::to_ascii_lowercase).as_deref() {
        Some("true" | "1") => true,
        Some("false" | "0") => false,
        _ => default,
    }
}

fn parse_log_format(value: Option<&str>) -> LogFormat {
    match value {
        Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
        _ => LogFormat::Text,
    }
}

/// Splits a comma-separated list, dropping blanks.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_defaults() {
        let cfg = ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)), "");
        assert!(cfg.is_public());
        assert_eq!(cfg.path, "/register");
        assert_eq!(cfg.subprotocols, vec!["chat"]);
        let opts = cfg.broadcast_options();
        assert!(opts.echo_to_sender);
        assert_eq!(opts.write_timeout, Duration::from_secs(5));
    }

    #[test]
    fn secret_makes_room_private() {
        let cfg = ServerConfig::new(SocketAddr::from(([127, 0, 0, 1], 0)), "s3cr3t");
        assert!(!cfg.is_public());
    }

    #[test]
    fn parse_bool_variants() {
        assert!(parse_bool(Some("TRUE"), false));
        assert!(parse_bool(Some("1"), false));
        assert!(!parse_bool(Some("False"), true));
        assert!(!parse_bool(Some("0"), true));
        assert!(parse_bool(Some("maybe"), true));
        assert!(!parse_bool(None, false));
    }

    #[test]
    fn parse_list_trims_and_drops_blanks() {
        assert_eq!(parse_list(" chat, , echo "), vec!["chat", "echo"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn log_format_is_case_insensitive() {
        assert_eq!(parse_log_format(Some("JSON")), LogFormat::Json);
        assert_eq!(parse_log_format(Some("pretty")), LogFormat::Text);
        assert_eq!(parse_log_format(None), LogFormat::Text);
    }

    #[test]
    fn client_config_parses_url() {
        let Ok(cfg) = ClientConfig::new("http://localhost/", "chat", "ws://localhost:3000/register")
        else {
            panic!("valid url rejected");
        };
        assert_eq!(cfg.url().path(), "/register");
        assert_eq!(cfg.heartbeat_interval(), DEFAULT_HEARTBEAT_INTERVAL);
    }

    #[test]
    fn client_config_rejects_bad_urls() {
        assert!(matches!(
            ClientConfig::new("", "chat", "not a url"),
            Err(RelayError::InvalidUrl(_))
        ));
        assert!(matches!(
            ClientConfig::new("", "chat", "http://localhost/register"),
            Err(RelayError::InvalidUrl(_))
        ));
    }

    #[test]
    fn url_with_secret_replaces_query() {
        let Ok(cfg) = ClientConfig::new("", "chat", "ws://localhost:3000/register?pwd=old&x=1")
        else {
            panic!("valid url rejected");
        };
        let url = cfg.url_with_secret("a b&c");
        assert_eq!(url.query(), Some("pwd=a+b%26c"));
        assert_eq!(cfg.url().query(), Some("pwd=old&x=1"));
    }

    #[test]
    fn heartbeat_interval_override() {
        let Ok(cfg) = ClientConfig::new("", "chat", "wss://relay.example/register") else {
            panic!("valid url rejected");
        };
        let Ok(cfg) = cfg.with_heartbeat_interval(Duration::from_secs(5)) else {
            panic!("non-zero interval rejected");
        };
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(5));
    }

    #[test]
    fn zero_heartbeat_interval_is_rejected() {
        let Ok(cfg) = ClientConfig::new("", "chat", "ws://localhost:3000/register") else {
            panic!("valid url rejected");
        };
        assert!(matches!(
            cfg.with_heartbeat_interval(Duration::ZERO),
            Err(RelayError::InvalidConfig(_))
        ));
    }
}
