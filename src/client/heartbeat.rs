//! Client keepalive.
//!
//! Sends the sentinel text payload [`HEARTBEAT_PAYLOAD`] on a fixed
//! interval over the client's shared write half. The first beat goes out
//! one full interval after the task starts.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;

/// Payload of a keepalive frame.
///
/// Receivers drop every text frame equal to this value, including room
/// messages that happen to carry the same text.
pub const HEARTBEAT_PAYLOAD: &str = "heartbeat";

/// Shortest interval the keepalive task will tick at.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

/// Spawns the keepalive task for one client connection.
///
/// The task runs until a send fails; it then closes the sink and exits.
/// Abort the returned handle to stop it earlier. Intervals below
/// [`MIN_HEARTBEAT_INTERVAL`] are raised to it.
pub fn spawn<S>(sink: Arc<Mutex<S>>, interval: Duration) -> JoinHandle<()>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: fmt::Display + Send,
{
    let interval = interval.max(MIN_HEARTBEAT_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let mut sink = sink.lock().await;
            if let Err(e) = sink.send(Message::text(HEARTBEAT_PAYLOAD.to_string())).await {
                tracing::warn!(error = %e, "can not send heartbeat to server");
                let _ = sink.close().await;
                return;
            }
            tracing::trace!("heartbeat sent");
        }
    })
}
