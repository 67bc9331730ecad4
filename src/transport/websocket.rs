//! WebSocket client transport.
//!
//! Each [`WebSocketTransport::open`] spawns one tokio task that dials the
//! endpoint and then runs the connection's event loop:
//!
//! - Incoming frames are forwarded to the [`TransportSink`]
//! - Outgoing frames arrive over an unbounded channel from the handle
//! - A local close sends a close frame and ends the loop silently
//!
//! The credential travels as an `Authorization: Bearer` header and the
//! identity as an `identity` query parameter.

// ============================================================================
// Imports
// ============================================================================

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

use super::{CloseCode, OpenTarget, Transport, TransportHandle, TransportSink};

// ============================================================================
// SocketCommand
// ============================================================================

/// Internal commands for the event loop.
enum SocketCommand {
    /// Write a text frame.
    Frame(String),
    /// Close the connection locally.
    Close { code: CloseCode, reason: String },
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// [`Transport`] backed by tokio-tungstenite.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    /// Runtime that owns the connection tasks.
    handle: Handle,
}

impl WebSocketTransport {
    /// Creates a transport spawning onto `handle`.
    #[inline]
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates a transport on the runtime of the calling context.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when called outside a tokio runtime.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|e| Error::config(format!("No tokio runtime available: {e}")))
    }
}

impl Transport for WebSocketTransport {
    fn open(&self, target: &OpenTarget, sink: TransportSink) -> Result<Box<dyn TransportHandle>> {
        let request = build_request(target)?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        debug!(endpoint = %target.endpoint, "Opening WebSocket");
        self.handle.spawn(run_socket(request, command_rx, sink));

        Ok(Box::new(WebSocketHandle { command_tx }))
    }
}

// ============================================================================
// WebSocketHandle
// ============================================================================

/// Write side of one WebSocket connection.
///
/// Dropping the handle ends the event loop.
struct WebSocketHandle {
    command_tx: mpsc::UnboundedSender<SocketCommand>,
}

impl TransportHandle for WebSocketHandle {
    fn send(&self, frame: &str) -> Result<()> {
        self.command_tx
            .send(SocketCommand::Frame(frame.to_string()))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&self, code: CloseCode, reason: &str) {
        let _ = self.command_tx.send(SocketCommand::Close {
            code,
            reason: reason.to_string(),
        });
    }
}

// ============================================================================
// Request Building
// ============================================================================

/// Builds the handshake request carrying credential and identity.
fn build_request(target: &OpenTarget) -> Result<Request> {
    let mut url = target.endpoint.clone();
    if !target.identity.is_empty() {
        url.query_pairs_mut()
            .append_pair("identity", &target.identity);
    }

    let mut request = url.as_str().into_client_request()?;

    if !target.credential.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {}", target.credential.expose()))
            .map_err(|_| Error::invalid_argument("Credential contains invalid header characters"))?;
        request.headers_mut().insert(AUTHORIZATION, value);
    }

    Ok(request)
}

// ============================================================================
// Event Loop
// ============================================================================

/// Dials the endpoint and pumps frames until either side closes.
async fn run_socket(
    request: Request,
    mut command_rx: mpsc::UnboundedReceiver<SocketCommand>,
    sink: TransportSink,
) {
    let ws_stream = match connect_async(request).await {
        Ok((stream, _response)) => stream,
        Err(e) => {
            warn!(error = %e, "WebSocket connect failed");
            sink.error(format!("Connect failed: {e}"));
            return;
        }
    };

    sink.opened();
    let (mut ws_write, mut ws_read) = ws_stream.split();

    loop {
        tokio::select! {
            // Incoming frames from the service
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        sink.message(text.as_str());
                    }

                    Some(Ok(Message::Binary(data))) => {
                        sink.message(&String::from_utf8_lossy(&data));
                    }

                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (CloseCode(u16::from(f.code)), f.reason.as_str().to_string()))
                            .unwrap_or((CloseCode::NO_STATUS, String::new()));
                        debug!(%code, reason = %reason, "WebSocket closed by remote");
                        sink.closed(code, reason);
                        break;
                    }

                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        sink.error(e.to_string());
                        sink.closed(CloseCode::ABNORMAL, e.to_string());
                        break;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        sink.closed(CloseCode::ABNORMAL, "Stream ended");
                        break;
                    }

                    // Ping/Pong are answered by tungstenite
                    Some(Ok(_)) => {}
                }
            }

            // Commands from the handle
            command = command_rx.recv() => {
                match command {
                    Some(SocketCommand::Frame(text)) => {
                        if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                            warn!(error = %e, "Failed to write frame");
                            sink.send_failed(format!("Write failed: {e}"));
                        } else {
                            trace!("Frame written");
                        }
                    }

                    Some(SocketCommand::Close { code, reason }) => {
                        let frame = CloseFrame {
                            code: code.0.into(),
                            reason: reason.into(),
                        };
                        let _ = ws_write.send(Message::Close(Some(frame))).await;
                        let _ = ws_write.close().await;
                        debug!(%code, "WebSocket closed locally");
                        break;
                    }

                    None => {
                        debug!("Handle dropped, closing WebSocket");
                        let _ = ws_write.close().await;
                        break;
                    }
                }
            }
        }
    }

    trace!("Socket loop terminated");
}

// ============================================================================
// Tests
// ============================================================================
