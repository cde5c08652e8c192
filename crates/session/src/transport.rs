// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction for the duplex connection.
//!
//! A transport is fire-and-forget: `connect` starts connecting and `emit`
//! hands a frame over without waiting. Everything the transport observes
//! (lifecycle changes, responses, notifications) flows back through the
//! [`EventSink`] given to `connect`.
//!
//! Provides:
//! - [`WebSocketTransport`] for production, with automatic reconnection
//! - a mock transport for unit tests

use std::fmt;
use std::sync::Weak;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tether_core::{InboundMessage, Notification, RequestEnvelope, Response};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SessionOptions;
use crate::session::Shared;

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection could not be started.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// No connection to send on.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// Serialization failed.
    #[error("serialization error: {0}")]
    SerializationError(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Something the transport observed.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// First connection established.
    Connected,
    /// First connection failed.
    ConnectError(String),
    /// An established connection was lost.
    Disconnected,
    /// The connection was re-established after a loss.
    Reconnected,
    /// A response frame arrived.
    Response(Response),
    /// A notification frame arrived on a subscription channel.
    Notification(Notification),
}

impl From<InboundMessage> for TransportEvent {
    fn from(msg: InboundMessage) -> Self {
        match msg {
            InboundMessage::Response(r) => TransportEvent::Response(r),
            InboundMessage::Notification(n) => TransportEvent::Notification(n),
        }
    }
}

/// Handle a transport uses to report events to its session.
///
/// Holds the session weakly: a transport never keeps a session alive.
#[derive(Clone)]
pub struct EventSink {
    session: Weak<Shared>,
}

impl EventSink {
    pub(crate) fn new(session: Weak<Shared>) -> Self {
        EventSink { session }
    }

    /// Delivers an event to the session, on the calling thread.
    ///
    /// Returns false if the session is gone.
    pub fn send(&self, event: TransportEvent) -> bool {
        match self.session.upgrade() {
            Some(shared) => {
                shared.handle_transport_event(event);
                true
            }
            None => false,
        }
    }

    /// Returns true if the session has been dropped.
    pub fn is_closed(&self) -> bool {
        self.session.strong_count() == 0
    }
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").field("closed", &self.is_closed()).finish()
    }
}

/// Duplex channel to the backend.
pub trait Transport: Send + Sync {
    /// Starts connecting. The outcome is reported through `sink`.
    fn connect(&self, sink: EventSink) -> TransportResult<()>;

    /// Closes the connection and stops any reconnection.
    fn disconnect(&self);

    /// Hands a request over for sending.
    fn emit(&self, request: &RequestEnvelope) -> TransportResult<()>;
}

/// Configuration for the WebSocket transport.
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// URL to connect to.
    pub url: String,
    /// Reconnect after an established connection is lost.
    pub auto_reconnect: bool,
    /// Maximum reconnection attempts (0 = unlimited).
    pub max_retries: u32,
    /// Maximum delay between reconnection attempts (seconds).
    pub max_delay_secs: u64,
    /// Initial delay for exponential backoff (milliseconds).
    pub initial_delay_ms: u64,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:7512".to_string(),
            auto_reconnect: true,
            max_retries: 0,
            max_delay_secs: 30,
            initial_delay_ms: 1000,
        }
    }
}

impl WebSocketConfig {
    /// Builds a config for `url` with the session's reconnection settings.
    pub fn from_options(url: impl Into<String>, options: &SessionOptions) -> Self {
        Self {
            url: url.into(),
            auto_reconnect: options.auto_reconnect,
            max_retries: options.max_reconnect_attempts,
            max_delay_secs: options.max_reconnect_delay_secs,
            initial_delay_ms: options.reconnection_delay_ms,
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport using tokio-tungstenite.
///
/// Each `connect` spawns one background task that owns the socket: it writes
/// frames fed through an unbounded channel, decodes inbound frames, and
/// reconnects with exponential backoff after a loss.
pub struct WebSocketTransport {
    config: WebSocketConfig,
    connection: Mutex<Option<Connection>>,
}

struct Connection {
    outgoing: mpsc::UnboundedSender<String>,
    cancel_token: CancellationToken,
}

impl WebSocketTransport {
    pub fn new(config: WebSocketConfig) -> Self {
        WebSocketTransport { config, connection: Mutex::new(None) }
    }

    pub fn config(&self) -> &WebSocketConfig {
        &self.config
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self, sink: EventSink) -> TransportResult<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        let (outgoing, rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let previous = self
            .connection
            .lock()
            .replace(Connection { outgoing, cancel_token: cancel_token.clone() });
        if let Some(previous) = previous {
            previous.cancel_token.cancel();
        }

        runtime.spawn(run_connection(self.config.clone(), rx, sink, cancel_token));
        Ok(())
    }

    fn disconnect(&self) {
        if let Some(connection) = self.connection.lock().take() {
            connection.cancel_token.cancel();
        }
    }

    fn emit(&self, request: &RequestEnvelope) -> TransportResult<()> {
        let json = request
            .to_json()
            .map_err(|e| TransportError::SerializationError(e.to_string()))?;

        let guard = self.connection.lock();
        let connection = guard.as_ref().ok_or(TransportError::ConnectionClosed)?;
        connection
            .outgoing
            .send(json)
            .map_err(|_| TransportError::SendFailed("connection task stopped".to_string()))
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// How a connection's pump loop ended.
enum PumpExit {
    /// Disconnect requested, or the session is gone.
    Closed,
    /// The socket failed or the server closed it.
    Lost,
}

/// Background task owning one logical connection across reconnects.
async fn run_connection(
    config: WebSocketConfig,
    mut outgoing: mpsc::UnboundedReceiver<String>,
    sink: EventSink,
    cancel_token: CancellationToken,
) {
    let mut reconnecting = false;

    loop {
        let ws = if reconnecting {
            match connect_with_retry(&config, &cancel_token).await {
                Ok(Some(ws)) => ws,
                Ok(None) => return,
                Err(error) => {
                    sink.send(TransportEvent::ConnectError(error));
                    return;
                }
            }
        } else {
            let result = tokio::select! {
                _ = cancel_token.cancelled() => return,
                result = tokio_tungstenite::connect_async(config.url.as_str()) => result,
            };
            match result {
                Ok((ws, _)) => ws,
                Err(e) => {
                    sink.send(TransportEvent::ConnectError(e.to_string()));
                    return;
                }
            }
        };

        info!(url = %config.url, reconnect = reconnecting, "websocket connected");
        let event =
            if reconnecting { TransportEvent::Reconnected } else { TransportEvent::Connected };
        if !sink.send(event) {
            return;
        }

        match pump(ws, &mut outgoing, &sink, &cancel_token).await {
            PumpExit::Closed => return,
            PumpExit::Lost => {}
        }

        if !report_loss(&sink, &mut outgoing) || !config.auto_reconnect {
            return;
        }
        reconnecting = true;
    }
}

/// Tells the session the connection is lost, then drops the frames written
/// for it. Returns false if the session is gone.
///
/// Frames are dropped only after the session saw the loss: a request emitted
/// until then was abandoned with the connection and must not reach the next
/// socket.
fn report_loss(sink: &EventSink, outgoing: &mut mpsc::UnboundedReceiver<String>) -> bool {
    let alive = sink.send(TransportEvent::Disconnected);
    while outgoing.try_recv().is_ok() {}
    alive
}

/// Moves frames in both directions until the socket ends.
async fn pump(
    ws: WsStream,
    outgoing: &mut mpsc::UnboundedReceiver<String>,
    sink: &EventSink,
    cancel_token: &CancellationToken,
) -> PumpExit {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                let _ = write.close().await;
                return PumpExit::Closed;
            }
            frame = outgoing.recv() => match frame {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        warn!(error = %e, "websocket send failed");
                        return PumpExit::Lost;
                    }
                }
                None => {
                    let _ = write.close().await;
                    return PumpExit::Closed;
                }
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => match InboundMessage::from_json(&text) {
                    Ok(msg) => {
                        if !sink.send(msg.into()) {
                            return PumpExit::Closed;
                        }
                    }
                    Err(e) => warn!(error = %e, "dropping undecodable frame"),
                },
                Some(Ok(Message::Close(_))) | None => return PumpExit::Lost,
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(error = %e, "websocket receive failed");
                    return PumpExit::Lost;
                }
            },
        }
    }
}

/// Reconnects with exponential backoff.
///
/// Returns `Ok(None)` when cancelled and `Err` once the attempts are
/// exhausted.
async fn connect_with_retry(
    config: &WebSocketConfig,
    cancel_token: &CancellationToken,
) -> Result<Option<WsStream>, String> {
    let mut attempt = 0u32;
    let mut delay_ms = config.initial_delay_ms;

    loop {
        let delay = Duration::from_millis(delay_ms);
        tokio::select! {
            _ = cancel_token.cancelled() => return Ok(None),
            _ = tokio::time::sleep(delay) => {}
        }

        attempt = attempt.saturating_add(1);
        debug!(attempt, url = %config.url, "reconnecting");

        let result = tokio::select! {
            _ = cancel_token.cancelled() => return Ok(None),
            result = tokio_tungstenite::connect_async(config.url.as_str()) => result,
        };

        match result {
            Ok((ws, _)) => return Ok(Some(ws)),
            Err(e) => {
                if config.max_retries > 0 && attempt >= config.max_retries {
                    return Err(format!("gave up after {} attempts: {}", attempt, e));
                }
                delay_ms = std::cmp::min(delay_ms.saturating_mul(2), config.max_delay_secs * 1000);
            }
        }
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
