//! Loopback upstream for transport, session and lifecycle tests.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tracing_subscriber::EnvFilter;

use crate::config::AudioSettings;
use crate::lifecycle::Status;

// ============================================================================
// Logging
// ============================================================================

/// Routes crate logs to the test output when `RUST_LOG` is set.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Upstream
// ============================================================================

/// WebSocket server standing in for the audio proxy.
pub(crate) struct Upstream {
    listener: TcpListener,
    port: u16,
}

impl Upstream {
    /// Binds to a random localhost port.
    pub(crate) async fn bind() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        Self { listener, port }
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Enabled settings pointing at this upstream.
    pub(crate) fn settings(&self) -> AudioSettings {
        AudioSettings::builder()
            .enabled(true)
            .host("127.0.0.1")
            .port(self.port)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .expect("settings")
    }

    /// Accepts one client and completes the WebSocket upgrade.
    pub(crate) async fn accept(&self) -> Peer {
        self.try_accept(Duration::from_secs(5))
            .await
            .expect("client should connect")
    }

    /// Like [`Upstream::accept`], returning `None` if nobody connects within `wait`.
    pub(crate) async fn try_accept(&self, wait: Duration) -> Option<Peer> {
        let (stream, _) = tokio::time::timeout(wait, self.listener.accept())
            .await
            .ok()?
            .expect("accept");
        let ws = tokio_tungstenite::accept_async(stream).await.expect("upgrade");
        Some(Peer { ws })
    }
}

// ============================================================================
// Peer
// ============================================================================

/// Server side of one accepted client.
pub(crate) struct Peer {
    ws: WebSocketStream<TcpStream>,
}

impl Peer {
    /// Waits for the next text message.
    pub(crate) async fn recv_text(&mut self) -> String {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_owned(),
                Some(Ok(Message::Close(_))) | None => panic!("client closed before sending text"),
                Some(Ok(_)) => {}
                Some(Err(e)) => panic!("upstream read failed: {e}"),
            }
        }
    }

    /// Reads the handshake request and answers `READY`.
    pub(crate) async fn accept_handshake(&mut self) -> String {
        let request = self.recv_text().await;
        self.send_text("READY").await;
        request
    }

    pub(crate) async fn send_text(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_owned().into()))
            .await
            .expect("send text");
    }

    pub(crate) async fn send_binary(&mut self, data: Bytes) {
        self.ws.send(Message::Binary(data)).await.expect("send binary");
    }

    /// Sends a close frame.
    pub(crate) async fn close(&mut self) {
        let _ = self.ws.close(None).await;
    }

    /// Reads until the client closes the socket.
    pub(crate) async fn wait_closed(&mut self) {
        while let Some(message) = self.ws.next().await {
            match message {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    }
}

// ============================================================================
// Recording sink
// ============================================================================

/// Collects status reports.
#[derive(Clone, Default)]
pub(crate) struct Recorded {
    statuses: Arc<Mutex<Vec<Status>>>,
}

impl Recorded {
    pub(crate) fn sink(&self) -> impl Fn(Status) + Send + Sync + 'static {
        let statuses = Arc::clone(&self.statuses);
        move |status| statuses.lock().push(status)
    }

    pub(crate) fn statuses(&self) -> Vec<Status> {
        self.statuses.lock().clone()
    }

    pub(crate) fn faults(&self) -> Vec<String> {
        self.statuses()
            .into_iter()
            .filter_map(|status| match status {
                Status::Fault { message } => Some(message),
                _ => None,
            })
            .collect()
    }
}

/// Polls `condition` until it holds or five seconds pass.
pub(crate) async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
