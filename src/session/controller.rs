//! Session controller.
//!
//! One controller drives one playback attempt: it opens the channel,
//! attaches a [`StreamBuffer`] to the playback surface, negotiates
//! parameters and then relays binary segments into the buffer until the
//! session is stopped or faults.
//!
//! # Flow
//!
//! ```text
//! connect ──► attach ──► handshake ──► stream ─┐
//!    │           │           │                 │  fault, close or stop
//!    └───────────┴───────────┴─────────────────┴──► teardown ──► stopped
//! ```
//!
//! While streaming, every input (channel message, primitive event, user
//! gesture) goes through a single `dispatch`. Teardown detaches the buffer
//! and closes the channel on every exit path, including a stop request.

// ============================================================================
// Imports
// ============================================================================

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use crate::buffer::{PlaybackSurface, SourceEvent, StreamBuffer};
use crate::config::AudioSettings;
use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::protocol::Reply;
use crate::transport::{Channel, ChannelEvent};

use super::state::ConnectionState;

// ============================================================================
// Input
// ============================================================================

/// Everything the streaming loop reacts to.
#[derive(Debug)]
enum Input {
    Channel(ChannelEvent),
    Source(Option<SourceEvent>),
    /// `false` when the gesture sender is gone.
    Gesture(bool),
}

// ============================================================================
// SessionController
// ============================================================================

/// Drives one audio session.
///
/// # Example
///
/// ```ignore
/// use remote_audio::{AudioSettings, MemorySurface, SessionController};
/// use tokio::sync::{mpsc, oneshot};
///
/// let (stop_tx, stop_rx) = oneshot::channel();
/// let (gesture_tx, gesture_rx) = mpsc::unbounded_channel();
///
/// let controller = SessionController::new(settings, MemorySurface::default())?;
/// let task = tokio::spawn(controller.run(stop_rx, gesture_rx));
///
/// gesture_tx.send(())?;
/// // ...
/// let _ = stop_tx.send(());
/// task.await??;
/// ```
pub struct SessionController<S: PlaybackSurface> {
    /// Log correlation id.
    id: SessionId,
    /// Settings snapshot taken at start.
    settings: AudioSettings,
    /// Surface waiting to be attached.
    surface: Option<S>,
    /// Current state.
    state: ConnectionState,
    /// State reports for the lifecycle.
    reports: Option<mpsc::UnboundedSender<ConnectionState>>,
    /// Open channel.
    channel: Option<Channel>,
    /// Buffer, present from attach until teardown.
    buffer: Option<StreamBuffer<S>>,
    /// Whether the next gesture starts playback.
    gesture_armed: bool,
}

impl<S: PlaybackSurface> std::fmt::Debug for SessionController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionController")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("channel", &self.channel)
            .field("buffer", &self.buffer)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// SessionController - Public API
// ============================================================================

impl<S: PlaybackSurface> SessionController<S> {
    /// Creates a controller for `settings` playing through `surface`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `settings` are invalid.
    pub fn new(settings: AudioSettings, surface: S) -> Result<Self> {
        settings.validate()?;

        Ok(Self {
            id: SessionId::generate(),
            settings,
            surface: Some(surface),
            state: ConnectionState::Idle,
            reports: None,
            channel: None,
            buffer: None,
            gesture_armed: true,
        })
    }

    /// Reports every state transition to `reports`.
    #[must_use]
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<ConnectionState>) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Returns the session id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs the session to completion.
    ///
    /// Returns `Ok(())` when stopped through `stop` (or when its sender is
    /// dropped). The first value on `gestures` starts playback.
    ///
    /// # Errors
    ///
    /// Returns the fault that ended the session. A session only ends on its
    /// own because of a fault, so an upstream close is
    /// [`Error::ConnectionClosed`].
    pub async fn run(
        mut self,
        stop: oneshot::Receiver<()>,
        mut gestures: mpsc::UnboundedReceiver<()>,
    ) -> Result<()> {
        debug!(
            session = %self.id,
            host = %self.settings.host,
            port = self.settings.port,
            "Session starting"
        );

        let result = tokio::select! {
            result = self.drive(&mut gestures) => result,
            _ = stop => {
                debug!(session = %self.id, state = %self.state, "Stop requested");
                Ok(())
            }
        };

        self.teardown().await;
        self.set_state(ConnectionState::Stopped);

        match &result {
            Ok(()) => info!(session = %self.id, "Session stopped"),
            Err(e) => warn!(session = %self.id, error = %e, "Session ended with fault"),
        }

        result
    }
}

// ============================================================================
// SessionController - Phases
// ============================================================================

impl<S: PlaybackSurface> SessionController<S> {
    async fn drive(&mut self, gestures: &mut mpsc::UnboundedReceiver<()>) -> Result<()> {
        self.connect().await?;
        self.attach().await?;
        self.handshake().await?;
        self.stream(gestures).await
    }

    async fn connect(&mut self) -> Result<()> {
        let url = self.settings.endpoint()?;
        self.set_state(ConnectionState::Connecting);

        let channel = Channel::connect(&url, self.settings.connect_timeout()).await?;
        self.channel = Some(channel);
        Ok(())
    }

    async fn attach(&mut self) -> Result<()> {
        let surface = self
            .surface
            .take()
            .ok_or_else(|| Error::invalid_state("surface already attached"))?;
        let buffer = StreamBuffer::for_codec(self.settings.codec, self.settings.buffer);

        let buffer = self.buffer.insert(buffer);
        let channel = self.channel.as_mut().ok_or(Error::ConnectionClosed)?;

        tokio::select! {
            result = buffer.attach(surface) => result?,
            event = channel.next_event() => return Err(Self::premature(event)),
        }

        self.set_state(ConnectionState::Attached);
        Ok(())
    }

    async fn handshake(&mut self) -> Result<()> {
        let negotiation = self.settings.negotiation()?;
        self.set_state(ConnectionState::Handshaking);

        let channel = self.channel.as_mut().ok_or(Error::ConnectionClosed)?;
        channel.send_text(negotiation.encode()).await?;
        trace!(session = %self.id, ?negotiation, "Negotiation sent");

        let reply = match channel.next_event().await {
            ChannelEvent::Text(text) => Reply::parse(&text)?,
            event => return Err(Self::premature(event)),
        };
        reply.into_result()?;

        self.set_state(ConnectionState::Streaming);
        info!(
            session = %self.id,
            codec = %negotiation.codec(),
            bitrate = negotiation.bitrate(),
            sample_rate = negotiation.sample_rate(),
            "Audio streaming"
        );
        Ok(())
    }

    async fn stream(&mut self, gestures: &mut mpsc::UnboundedReceiver<()>) -> Result<()> {
        loop {
            let armed = self.gesture_armed;
            let (Some(channel), Some(buffer)) = (self.channel.as_mut(), self.buffer.as_mut()) else {
                return Err(Error::invalid_state("session is not streaming"));
            };

            let input = tokio::select! {
                event = channel.next_event() => Input::Channel(event),
                event = buffer.next_event() => Input::Source(event),
                gesture = gestures.recv(), if armed => Input::Gesture(gesture.is_some()),
            };

            match self.dispatch(input).await {
                Err(e) if e.is_session_fatal() => return Err(e),
                Err(e) => debug!(session = %self.id, error = %e, "Recovered from fault"),
                Ok(()) => {}
            }
        }
    }

    async fn teardown(&mut self) {
        if let Some(mut buffer) = self.buffer.take() {
            buffer.detach().await;
        }
        if let Some(channel) = self.channel.take() {
            channel.close().await;
        }
    }
}

// ============================================================================
// SessionController - Dispatch
// ============================================================================

impl<S: PlaybackSurface> SessionController<S> {
    async fn dispatch(&mut self, input: Input) -> Result<()> {
        match input {
            Input::Channel(ChannelEvent::Binary(segment)) => {
                trace!(session = %self.id, len = segment.len(), "Segment received");
                self.buffer_mut()?.feed(segment)
            }
            Input::Channel(ChannelEvent::Text(text)) => {
                debug!(session = %self.id, %text, "Ignoring text message while streaming");
                Ok(())
            }
            Input::Channel(ChannelEvent::Closed) => Err(Error::ConnectionClosed),
            Input::Channel(ChannelEvent::Error(message)) => Err(Error::connection(message)),
            Input::Source(Some(event)) => self.buffer_mut()?.handle_event(event),
            Input::Source(None) => Err(Error::playback("media source went away")),
            Input::Gesture(received) => {
                self.gesture_armed = false;
                if received { self.play().await } else { Ok(()) }
            }
        }
    }

    async fn play(&mut self) -> Result<()> {
        match self.buffer_mut()?.play().await {
            Ok(()) => {
                debug!(session = %self.id, "Playback started");
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                debug!(session = %self.id, error = %e, "Playback start interrupted");
                Ok(())
            }
            Err(e @ Error::Playback { .. }) => Err(e),
            Err(e) => Err(Error::playback(e.to_string())),
        }
    }
}

// ============================================================================
// SessionController - Helpers
// ============================================================================

impl<S: PlaybackSurface> SessionController<S> {
    fn set_state(&mut self, state: ConnectionState) {
        if self.state == state {
            return;
        }

        debug!(session = %self.id, from = %self.state, to = %state, "Connection state");
        self.state = state;

        if let Some(reports) = &self.reports {
            let _ = reports.send(state);
        }
    }

    fn buffer_mut(&mut self) -> Result<&mut StreamBuffer<S>> {
        self.buffer.as_mut().ok_or(Error::NotAttached)
    }

    /// Maps a channel event that arrived before the handshake reply.
    fn premature(event: ChannelEvent) -> Error {
        match event {
            ChannelEvent::Closed => Error::ConnectionClosed,
            ChannelEvent::Error(message) => Error::connection(message),
            ChannelEvent::Binary(_) => Error::protocol("binary data before handshake reply"),
            ChannelEvent::Text(text) => {
                Error::protocol(format!("unexpected message before handshake: {text:?}"))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use bytes::Bytes;
    use tokio::task::JoinHandle;

    use crate::buffer::{MemoryProbe, MemorySurface, MemorySurfaceOptions, PlayOutcome};
    use crate::testing::{Upstream, eventually};

    struct Running {
        task: JoinHandle<Result<()>>,
        stop: oneshot::Sender<()>,
        gestures: mpsc::UnboundedSender<()>,
        reports: mpsc::UnboundedReceiver<ConnectionState>,
    }

    impl Running {
        fn start(settings: AudioSettings, surface: MemorySurface) -> Self {
            let (stop, stop_rx) = oneshot::channel();
            let (gestures, gesture_rx) = mpsc::unbounded_channel();
            let (report_tx, reports) = mpsc::unbounded_channel();

            let controller = SessionController::new(settings, surface)
                .unwrap()
                .with_reports(report_tx);
            let task = tokio::spawn(controller.run(stop_rx, gesture_rx));

            Self {
                task,
                stop,
                gestures,
                reports,
            }
        }

        async fn finish(self) -> (Result<()>, Vec<ConnectionState>) {
            let Self {
                task,
                stop,
                mut reports,
                ..
            } = self;
            let _ = stop.send(());
            let result = tokio::time::timeout(Duration::from_secs(5), task)
                .await
                .expect("session should stop")
                .expect("session task");

            let mut states = Vec::new();
            while let Ok(state) = reports.try_recv() {
                states.push(state);
            }
            (result, states)
        }
    }

    fn surface() -> (MemorySurface, MemoryProbe) {
        let surface = MemorySurface::default();
        let probe = surface.probe();
        (surface, probe)
    }

    #[test]
    fn test_new_rejects_invalid_settings() {
        let mut settings = AudioSettings::builder().enabled(true).build().unwrap();
        settings.buffer = settings.buffer.with_max_pending(0);

        let result = SessionController::new(settings, MemorySurface::default());
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_streams_segments_in_order_after_ready() {
        let upstream = Upstream::bind().await;
        let (surface, probe) = surface();
        let running = Running::start(upstream.settings(), surface);

        let mut peer = upstream.accept().await;
        let request = peer.accept_handshake().await;
        assert_eq!(request, "CD:opus\nBR:96000\nSR:48000\n\n\n");

        peer.send_binary(Bytes::from_static(b"seg-1")).await;
        peer.send_binary(Bytes::from_static(b"seg-2")).await;

        eventually(|| probe.appended().len() == 2).await;
        assert_eq!(
            probe.appended(),
            vec![Bytes::from_static(b"seg-1"), Bytes::from_static(b"seg-2")]
        );
        assert_eq!(probe.mime().as_deref(), Some("audio/webm; codecs=\"opus\""));

        let (result, states) = running.finish().await;
        assert!(result.is_ok());
        assert_eq!(
            states,
            vec![
                ConnectionState::Connecting,
                ConnectionState::Attached,
                ConnectionState::Handshaking,
                ConnectionState::Streaming,
                ConnectionState::Stopped,
            ]
        );
        assert_eq!(probe.releases(), 1);
        assert!(!probe.is_open());

        tokio::time::timeout(Duration::from_secs(5), peer.wait_closed())
            .await
            .expect("upstream should see close");
    }

    #[tokio::test]
    async fn test_secret_is_sent() {
        let upstream = Upstream::bind().await;
        let settings = AudioSettings::builder()
            .enabled(true)
            .port(upstream.port())
            .secret("s3")
            .build()
            .unwrap();
        let (surface, _probe) = surface();
        let running = Running::start(settings, surface);

        let mut peer = upstream.accept().await;
        let request = peer.accept_handshake().await;
        assert!(request.ends_with("\n\nsec:s3\n"));

        let (result, _) = running.finish().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_handshake_tears_down() {
        let upstream = Upstream::bind().await;
        let (surface, probe) = surface();
        let running = Running::start(upstream.settings(), surface);

        let mut peer = upstream.accept().await;
        peer.recv_text().await;
        peer.send_text("ERR:bad secret").await;

        let result = tokio::time::timeout(Duration::from_secs(5), running.task)
            .await
            .unwrap()
            .unwrap();
        match result {
            Err(Error::Handshake { reason }) => assert_eq!(reason, "bad secret"),
            other => panic!("expected handshake error, got {other:?}"),
        }

        tokio::time::timeout(Duration::from_secs(5), peer.wait_closed())
            .await
            .expect("channel should be closed");
        assert_eq!(probe.releases(), 1);
        assert!(probe.appended().is_empty());
    }

    #[tokio::test]
    async fn test_binary_before_reply_is_protocol_error() {
        let upstream = Upstream::bind().await;
        let (surface, _probe) = surface();
        let running = Running::start(upstream.settings(), surface);

        let mut peer = upstream.accept().await;
        peer.recv_text().await;
        peer.send_binary(Bytes::from_static(b"early")).await;

        let result = running.task.await.unwrap();
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_garbled_reply_is_protocol_error() {
        let upstream = Upstream::bind().await;
        let (surface, _probe) = surface();
        let running = Running::start(upstream.settings(), surface);

        let mut peer = upstream.accept().await;
        peer.recv_text().await;
        peer.send_text("HELLO").await;

        let result = running.task.await.unwrap();
        assert!(matches!(result, Err(Error::Protocol { .. })));
    }

    #[tokio::test]
    async fn test_upstream_close_ends_session() {
        let upstream = Upstream::bind().await;
        let (surface, probe) = surface();
        let running = Running::start(upstream.settings(), surface);

        let mut peer = upstream.accept().await;
        peer.accept_handshake().await;
        peer.send_binary(Bytes::from_static(b"seg")).await;
        peer.close().await;

        let (result, states) = running.finish().await;
        assert!(matches!(result, Err(Error::ConnectionClosed)));
        assert_eq!(states.last(), Some(&ConnectionState::Stopped));
        assert_eq!(probe.releases(), 1);
    }

    #[tokio::test]
    async fn test_connect_failure_reports_and_stops() {
        let port = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let settings = AudioSettings::builder().enabled(true).port(port).build().unwrap();
        let (surface, probe) = surface();

        let (result, states) = Running::start(settings, surface).finish().await;

        // Stop may win the race against the refused connect
        if let Err(e) = result {
            assert!(e.is_connection_error());
        }
        assert_eq!(states.last(), Some(&ConnectionState::Stopped));
        assert_eq!(probe.releases(), 0);
    }

    #[tokio::test]
    async fn test_text_while_streaming_is_ignored() {
        let upstream = Upstream::bind().await;
        let (surface, probe) = surface();
        let running = Running::start(upstream.settings(), surface);

        let mut peer = upstream.accept().await;
        peer.accept_handshake().await;
        peer.send_text("status: ok").await;
        peer.send_binary(Bytes::from_static(b"seg")).await;

        eventually(|| probe.appended().len() == 1).await;

        let (result, _) = running.finish().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_first_gesture_starts_playback_once() {
        let upstream = Upstream::bind().await;
        let (surface, probe) = surface();
        let running = Running::start(upstream.settings(), surface);

        let mut peer = upstream.accept().await;
        peer.accept_handshake().await;

        running.gestures.send(()).unwrap();
        running.gestures.send(()).unwrap();
        peer.send_binary(Bytes::from_static(b"seg")).await;

        eventually(|| probe.play_calls() == 1 && probe.appended().len() == 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(probe.play_calls(), 1);

        let (result, _) = running.finish().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_aborted_play_is_suppressed() {
        let upstream = Upstream::bind().await;
        let (surface, probe) = surface();
        probe.set_play_outcome(PlayOutcome::Abort);
        let running = Running::start(upstream.settings(), surface);

        let mut peer = upstream.accept().await;
        peer.accept_handshake().await;
        running.gestures.send(()).unwrap();

        eventually(|| probe.play_calls() == 1).await;
        peer.send_binary(Bytes::from_static(b"seg")).await;
        eventually(|| probe.appended().len() == 1).await;

        let (result, _) = running.finish().await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_play_is_playback_fault() {
        let upstream = Upstream::bind().await;
        let (surface, probe) = surface();
        probe.set_play_outcome(PlayOutcome::Reject("not allowed".into()));
        let running = Running::start(upstream.settings(), surface);

        let mut peer = upstream.accept().await;
        peer.accept_handshake().await;
        running.gestures.send(()).unwrap();

        let result = running.task.await.unwrap();
        assert!(matches!(result, Err(Error::Playback { .. })));
    }

    #[tokio::test]
    async fn test_feed_fault_tears_down() {
        let upstream = Upstream::bind().await;
        let surface = MemorySurface::new(MemorySurfaceOptions::default().with_capacity(4));
        let probe = surface.probe();
        let running = Running::start(upstream.settings(), surface);

        let mut peer = upstream.accept().await;
        peer.accept_handshake().await;
        peer.send_binary(Bytes::from_static(b"far too large")).await;

        let result = running.task.await.unwrap();
        assert!(matches!(result, Err(Error::Playback { .. })));
        assert_eq!(probe.releases(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_mime_fails_before_handshake() {
        let upstream = Upstream::bind().await;
        let surface = MemorySurface::new(
            MemorySurfaceOptions::default().with_supported_mime("audio/mp4; codecs=\"mp4a.40.2\""),
        );
        let running = Running::start(upstream.settings(), surface);

        let mut peer = upstream.accept().await;
        let result = running.task.await.unwrap();
        assert!(matches!(result, Err(Error::Playback { .. })));

        tokio::time::timeout(Duration::from_secs(5), peer.wait_closed())
            .await
            .expect("channel should be closed");
    }
}
