//! WebSocket duplex channel and event loop.
//!
//! The channel spawns a tokio task that owns the socket and handles:
//!
//! - Incoming text, binary and close frames, forwarded in order
//! - Outgoing text messages from the session
//! - Graceful close on request or when the handle is dropped

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Time allowed for the event loop to finish after a close request.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// ChannelEvent
// ============================================================================

/// Inbound event delivered by a [`Channel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Text message.
    Text(String),
    /// Binary message.
    Binary(Bytes),
    /// The remote end closed the channel.
    Closed,
    /// The socket failed.
    Error(String),
}

// ============================================================================
// ChannelCommand
// ============================================================================

/// Internal commands for the event loop.
enum ChannelCommand {
    /// Send a text message.
    SendText {
        text: String,
        done_tx: oneshot::Sender<Result<()>>,
    },
    /// Close the socket and stop.
    Close,
}

// ============================================================================
// Channel
// ============================================================================

/// Client side of the audio WebSocket.
///
/// Owned by a single session. Dropping the handle closes the socket.
pub struct Channel {
    /// Endpoint this channel is connected to.
    url: Url,
    /// Commands for the event loop.
    command_tx: mpsc::UnboundedSender<ChannelCommand>,
    /// Inbound events from the event loop.
    event_rx: mpsc::UnboundedReceiver<ChannelEvent>,
    /// Event loop task.
    task: JoinHandle<()>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

impl Channel {
    /// Opens a channel to `url`.
    ///
    /// `connect_timeout` bounds the TCP connect and the WebSocket upgrade.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the upgrade does not finish in time
    /// - [`Error::Connection`] if the connection or upgrade fails
    pub async fn connect(url: &Url, connect_timeout: Duration) -> Result<Self> {
        debug!(url = %url, "Opening audio channel");

        let (ws_stream, _response) = timeout(connect_timeout, tokio_tungstenite::connect_async(url.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(connect_timeout.as_millis() as u64))?
            .map_err(|e| Error::connection(format!("WebSocket connect failed: {e}")))?;

        debug!(url = %url, "Audio channel open");

        Ok(Self::from_stream(url.clone(), ws_stream))
    }

    /// Wraps an established WebSocket stream.
    ///
    /// Spawns the event loop task internally.
    pub(crate) fn from_stream<S>(url: Url, ws_stream: WebSocketStream<S>) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(Self::run_event_loop(ws_stream, command_rx, event_tx));

        Self {
            url,
            command_tx,
            event_rx,
            task,
        }
    }

    /// Returns the endpoint URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Sends one text message.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the event loop has stopped
    /// - [`Error::WebSocket`] if the write fails
    pub async fn send_text(&self, text: impl Into<String>) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();

        self.command_tx
            .send(ChannelCommand::SendText {
                text: text.into(),
                done_tx,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        done_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Waits for the next inbound event.
    ///
    /// Returns [`ChannelEvent::Closed`] once the event loop has stopped.
    pub async fn next_event(&mut self) -> ChannelEvent {
        self.event_rx.recv().await.unwrap_or(ChannelEvent::Closed)
    }

    /// Closes the socket and waits for the event loop to finish.
    pub async fn close(self) {
        let Self {
            url,
            command_tx,
            event_rx,
            mut task,
        } = self;

        let _ = command_tx.send(ChannelCommand::Close);
        drop(event_rx);

        if timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
            warn!(url = %url, "Channel event loop did not stop, aborting");
            task.abort();
        }

        debug!(url = %url, "Audio channel closed");
    }

    /// Event loop that handles WebSocket I/O.
    async fn run_event_loop<S>(
        ws_stream: WebSocketStream<S>,
        mut command_rx: mpsc::UnboundedReceiver<ChannelCommand>,
        event_tx: mpsc::UnboundedSender<ChannelEvent>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (mut ws_write, mut ws_read) = ws_stream.split();

        loop {
            tokio::select! {
                // Incoming messages from upstream
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            let _ = event_tx.send(ChannelEvent::Text(text.as_str().to_owned()));
                        }

                        Some(Ok(Message::Binary(data))) => {
                            trace!(len = data.len(), "Binary message received");
                            let _ = event_tx.send(ChannelEvent::Binary(data));
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "WebSocket closed by remote");
                            let _ = event_tx.send(ChannelEvent::Closed);
                            break;
                        }

                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            let _ = event_tx.send(ChannelEvent::Error(e.to_string()));
                            break;
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            let _ = event_tx.send(ChannelEvent::Closed);
                            break;
                        }

                        // Ping, Pong, Frame
                        Some(Ok(_)) => {}
                    }
                }

                // Commands from the session
                command = command_rx.recv() => {
                    match command {
                        Some(ChannelCommand::SendText { text, done_tx }) => {
                            let result = ws_write
                                .send(Message::Text(text.into()))
                                .await
                                .map_err(Error::from);
                            let _ = done_tx.send(result);
                        }

                        Some(ChannelCommand::Close) | None => {
                            debug!("Closing WebSocket");
                            let _ = ws_write.close().await;
                            break;
                        }
                    }
                }
            }
        }

        debug!("Channel event loop terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================
