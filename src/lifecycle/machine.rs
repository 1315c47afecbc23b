//! Lifecycle state machine.
//!
//! Runs as an actor task that owns at most one live session. The host drives
//! it through a cloneable [`LifecycleHandle`].
//!
//! ```text
//!            connected + enabled            session reports streaming
//!   ┌──────┐ ────────────────────► ┌──────────┐ ──────────────────► ┌────────┐
//!   │ Idle │                       │ Starting │                     │ Active │
//!   └──────┘ ◄──────────────────── └──────────┘                     └────────┘
//!      ▲      disconnected, fault,                                       │
//!      │      disabled or shutdown                                       │
//!      └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no reconnection. After a fault the lifecycle waits in `Idle`
//! for the next `connected` signal.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, trace, warn};

use crate::buffer::PlaybackSurface;
use crate::config::AudioSettings;
use crate::error::{Error, Result};
use crate::identifiers::SessionId;
use crate::session::{ConnectionState, SessionController};

use super::status::{Status, StatusSink};

// ============================================================================
// LifecycleState
// ============================================================================

/// State of the audio lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// No live session.
    #[default]
    Idle,
    /// A session is connecting or negotiating.
    Starting,
    /// A session is streaming.
    Active,
}

impl LifecycleState {
    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Active => "active",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Requests from handles to the actor.
enum Command {
    Connected,
    Disconnected { done_tx: oneshot::Sender<()> },
    UpdateSettings(Box<AudioSettings>),
    UserGesture,
    Shutdown { done_tx: oneshot::Sender<()> },
}

/// Everything the actor reacts to.
enum Input {
    Command(Option<Command>),
    Report(ConnectionState),
    Ended(std::result::Result<Result<()>, JoinError>),
}

// ============================================================================
// LifecycleHandle
// ============================================================================

/// Handle to a running lifecycle.
///
/// Cloning is cheap. The lifecycle shuts down when the last handle is
/// dropped or [`LifecycleHandle::shutdown`] is called.
///
/// # Example
///
/// ```ignore
/// use remote_audio::{AudioSettings, LifecycleHandle, LifecycleState, MemorySurface, TracingStatusSink};
///
/// let surface = MemorySurface::default();
/// let lifecycle = LifecycleHandle::spawn(settings, move || surface.clone(), TracingStatusSink)?;
///
/// lifecycle.connected()?;
/// lifecycle.wait_for(LifecycleState::Active).await?;
/// lifecycle.user_gesture()?;
///
/// lifecycle.disconnected().await?;
/// ```
#[derive(Clone)]
pub struct LifecycleHandle {
    command_tx: mpsc::UnboundedSender<Command>,
    state_rx: watch::Receiver<LifecycleState>,
}

impl fmt::Debug for LifecycleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleHandle")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl LifecycleHandle {
    /// Spawns the lifecycle actor.
    ///
    /// `factory` creates a fresh playback surface for every session. `sink`
    /// receives every [`Status`] update.
    ///
    /// Must be called within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `settings` are invalid.
    pub fn spawn<S, F, K>(settings: AudioSettings, factory: F, sink: K) -> Result<Self>
    where
        S: PlaybackSurface,
        F: FnMut() -> S + Send + 'static,
        K: StatusSink,
    {
        settings.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(LifecycleState::Idle);

        let actor = Actor {
            settings,
            factory,
            sink,
            state_tx,
            command_rx,
            session: None,
        };
        tokio::spawn(actor.run());

        Ok(Self {
            command_tx,
            state_rx,
        })
    }

    /// Signals that the viewer connected.
    ///
    /// Starts a session if audio is enabled and none is live.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the lifecycle has shut down.
    pub fn connected(&self) -> Result<()> {
        self.send(Command::Connected)
    }

    /// Signals that the viewer disconnected.
    ///
    /// Resolves once the live session, if any, is torn down.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the lifecycle has shut down.
    pub async fn disconnected(&self) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(Command::Disconnected { done_tx })?;
        done_rx.await.map_err(|_| Self::gone())
    }

    /// Replaces the settings used by the next session.
    ///
    /// Disabling audio stops the live session. Enabling it does not start
    /// one until the next `connected` signal.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `settings` are invalid
    /// - [`Error::InvalidState`] if the lifecycle has shut down
    pub fn update_settings(&self, settings: AudioSettings) -> Result<()> {
        settings.validate()?;
        self.send(Command::UpdateSettings(Box::new(settings)))
    }

    /// Forwards a user gesture to the live session.
    ///
    /// The first gesture of a session starts playback.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the lifecycle has shut down.
    pub fn user_gesture(&self) -> Result<()> {
        self.send(Command::UserGesture)
    }

    /// Stops the live session and ends the actor.
    ///
    /// Does nothing if the lifecycle has already shut down.
    pub async fn shutdown(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.send(Command::Shutdown { done_tx }).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> LifecycleState {
        *self.state_rx.borrow()
    }

    /// Returns a receiver of state changes.
    #[inline]
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state_rx.clone()
    }

    /// Waits until the lifecycle reaches `state`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the lifecycle shuts down first.
    pub async fn wait_for(&self, state: LifecycleState) -> Result<()> {
        let mut state_rx = self.state_rx.clone();
        state_rx
            .wait_for(|current| *current == state)
            .await
            .map(|_| ())
            .map_err(|_| Self::gone())
    }

    fn send(&self, command: Command) -> Result<()> {
        self.command_tx.send(command).map_err(|_| Self::gone())
    }

    fn gone() -> Error {
        Error::invalid_state("audio lifecycle has shut down")
    }
}

// ============================================================================
// LiveSession
// ============================================================================

/// Session task owned by the actor.
struct LiveSession {
    id: SessionId,
    stop_tx: oneshot::Sender<()>,
    gesture_tx: mpsc::UnboundedSender<()>,
    report_rx: mpsc::UnboundedReceiver<ConnectionState>,
    task: JoinHandle<Result<()>>,
}

// ============================================================================
// Actor
// ============================================================================

struct Actor<F, K> {
    /// Settings for the next session.
    settings: AudioSettings,
    /// Creates a surface per session.
    factory: F,
    sink: K,
    state_tx: watch::Sender<LifecycleState>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    session: Option<LiveSession>,
}

impl<S, F, K> Actor<F, K>
where
    S: PlaybackSurface,
    F: FnMut() -> S + Send + 'static,
    K: StatusSink,
{
    async fn run(mut self) {
        debug!("Audio lifecycle started");

        loop {
            let input = match self.session.as_mut() {
                Some(live) => tokio::select! {
                    command = self.command_rx.recv() => Input::Command(command),
                    Some(state) = live.report_rx.recv() => Input::Report(state),
                    joined = &mut live.task => Input::Ended(joined),
                },
                None => Input::Command(self.command_rx.recv().await),
            };

            if !self.dispatch(input).await {
                break;
            }
        }

        self.stop_session().await;
        self.set_state(LifecycleState::Idle);
        debug!("Audio lifecycle terminated");
    }

    /// Handles one input. Returns `false` when the actor should stop.
    async fn dispatch(&mut self, input: Input) -> bool {
        match input {
            Input::Command(Some(Command::Connected)) => self.on_connected(),

            Input::Command(Some(Command::Disconnected { done_tx })) => {
                self.stop_session().await;
                self.set_state(LifecycleState::Idle);
                let _ = done_tx.send(());
            }

            Input::Command(Some(Command::UpdateSettings(settings))) => {
                let disable = !settings.enabled && self.session.is_some();
                self.settings = *settings;
                if disable {
                    info!("Audio disabled, stopping live session");
                    self.stop_session().await;
                    self.set_state(LifecycleState::Idle);
                }
            }

            Input::Command(Some(Command::UserGesture)) => match &self.session {
                Some(live) => {
                    let _ = live.gesture_tx.send(());
                }
                None => trace!("User gesture without live session"),
            },

            Input::Command(Some(Command::Shutdown { done_tx })) => {
                self.stop_session().await;
                self.set_state(LifecycleState::Idle);
                let _ = done_tx.send(());
                return false;
            }

            // Every handle dropped
            Input::Command(None) => return false,

            Input::Report(state) => self.on_report(state),

            Input::Ended(joined) => {
                if let Some(mut live) = self.session.take() {
                    self.finish_session(live.id, &mut live.report_rx, joined);
                }
                self.set_state(LifecycleState::Idle);
            }
        }

        true
    }

    fn on_connected(&mut self) {
        if self.session.is_some() {
            debug!("Session already live, ignoring connected signal");
            return;
        }
        if !self.settings.enabled {
            debug!("Audio disabled, not starting session");
            return;
        }

        let surface = (self.factory)();
        let (stop_tx, stop_rx) = oneshot::channel();
        let (gesture_tx, gesture_rx) = mpsc::unbounded_channel();
        let (report_tx, report_rx) = mpsc::unbounded_channel();

        let controller = match SessionController::new(self.settings.clone(), surface) {
            Ok(controller) => controller.with_reports(report_tx),
            Err(e) => {
                warn!(error = %e, "Not starting session");
                self.sink.report(Status::Fault {
                    message: e.to_string(),
                });
                return;
            }
        };
        let id = controller.id();
        let task = tokio::spawn(controller.run(stop_rx, gesture_rx));

        self.session = Some(LiveSession {
            id,
            stop_tx,
            gesture_tx,
            report_rx,
            task,
        });
        self.set_state(LifecycleState::Starting);

        info!(session = %id, "Audio session started");
    }

    fn on_report(&mut self, state: ConnectionState) {
        self.sink.report(Status::Connection(state));

        let current = *self.state_tx.borrow();
        if state == ConnectionState::Streaming && current == LifecycleState::Starting {
            self.set_state(LifecycleState::Active);
        }
    }

    /// Stops the live session and waits for its teardown.
    async fn stop_session(&mut self) {
        let Some(mut live) = self.session.take() else {
            return;
        };

        debug!(session = %live.id, "Stopping session");
        let _ = live.stop_tx.send(());
        let joined = (&mut live.task).await;

        self.finish_session(live.id, &mut live.report_rx, joined);
    }

    /// Forwards the remaining reports and the outcome of an ended session.
    fn finish_session(
        &mut self,
        id: SessionId,
        report_rx: &mut mpsc::UnboundedReceiver<ConnectionState>,
        joined: std::result::Result<Result<()>, JoinError>,
    ) {
        while let Ok(state) = report_rx.try_recv() {
            self.sink.report(Status::Connection(state));
        }

        let fault = match joined {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(e) => Some(format!("session task failed: {e}")),
        };

        match fault {
            Some(message) => {
                warn!(session = %id, %message, "Audio session faulted");
                self.sink.report(Status::Fault { message });
            }
            None => info!(session = %id, "Audio session ended"),
        }
    }

    fn set_state(&mut self, state: LifecycleState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "Lifecycle state");
            self.sink.report(Status::Lifecycle(state));
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

    use crate::buffer::{MemoryProbe, MemorySurface};
    use crate::lifecycle::TracingStatusSink;
    use crate::testing::{Recorded, Upstream, eventually};

    fn spawn(settings: AudioSettings) -> (LifecycleHandle, MemoryProbe, Recorded) {
        let surface = MemorySurface::default();
        let probe = surface.probe();
        let recorded = Recorded::default();
        let handle =
            LifecycleHandle::spawn(settings, move || surface.clone(), recorded.sink()).unwrap();
        (handle, probe, recorded)
    }

    async fn within<T>(future: impl std::future::Future<Output = T>) -> T {
        tokio::time::timeout(Duration::from_secs(5), future)
            .await
            .expect("timed out")
    }

    #[tokio::test]
    async fn test_connect_stream_disconnect() {
        let upstream = Upstream::bind().await;
        let (handle, probe, recorded) = spawn(upstream.settings());

        handle.connected().unwrap();
        within(handle.wait_for(LifecycleState::Starting)).await.unwrap();

        let mut peer = upstream.accept().await;
        peer.accept_handshake().await;
        within(handle.wait_for(LifecycleState::Active)).await.unwrap();

        peer.send_binary(Bytes::from_static(b"first")).await;
        eventually(|| probe.appended().len() == 1).await;

        within(handle.disconnected()).await.unwrap();

        assert_eq!(handle.state(), LifecycleState::Idle);
        assert_eq!(probe.releases(), 1);
        assert!(!probe.is_open());
        within(peer.wait_closed()).await;

        let statuses = recorded.statuses();
        assert!(statuses.contains(&Status::Lifecycle(LifecycleState::Starting)));
        assert!(statuses.contains(&Status::Lifecycle(LifecycleState::Active)));
        assert!(statuses.contains(&Status::Connection(ConnectionState::Streaming)));
        assert_eq!(
            statuses.last(),
            Some(&Status::Lifecycle(LifecycleState::Idle))
        );
        assert!(recorded.faults().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_stays_idle() {
        let upstream = Upstream::bind().await;
        let settings = AudioSettings::builder()
            .enabled(false)
            .port(upstream.port())
            .build()
            .unwrap();
        let (handle, _probe, recorded) = spawn(settings);

        handle.connected().unwrap();

        assert!(upstream.try_accept(Duration::from_millis(100)).await.is_none());
        assert_eq!(handle.state(), LifecycleState::Idle);
        assert!(recorded.statuses().is_empty());
    }

    #[tokio::test]
    async fn test_repeated_connected_keeps_one_session() {
        let upstream = Upstream::bind().await;
        let (handle, _probe, _recorded) = spawn(upstream.settings());

        handle.connected().unwrap();
        let mut peer = upstream.accept().await;
        peer.accept_handshake().await;
        within(handle.wait_for(LifecycleState::Active)).await.unwrap();

        handle.connected().unwrap();
        assert!(upstream.try_accept(Duration::from_millis(100)).await.is_none());
        assert_eq!(handle.state(), LifecycleState::Active);

        within(handle.disconnected()).await.unwrap();
    }

    #[tokio::test]
    async fn test_fault_returns_to_idle_and_reports() {
        let upstream = Upstream::bind().await;
        let (handle, probe, recorded) = spawn(upstream.settings());

        handle.connected().unwrap();
        let mut peer = upstream.accept().await;
        peer.recv_text().await;
        peer.send_text("ERR:bad secret").await;

        eventually(|| !recorded.faults().is_empty()).await;
        within(handle.wait_for(LifecycleState::Idle)).await.unwrap();

        assert_eq!(recorded.faults(), vec!["Handshake rejected: bad secret".to_string()]);
        assert_eq!(probe.releases(), 1);
        within(peer.wait_closed()).await;
    }

    #[tokio::test]
    async fn test_new_session_after_fault() {
        let upstream = Upstream::bind().await;
        let (handle, _probe, recorded) = spawn(upstream.settings());

        handle.connected().unwrap();
        let mut peer = upstream.accept().await;
        peer.accept_handshake().await;
        peer.close().await;
        eventually(|| !recorded.faults().is_empty()).await;
        within(handle.wait_for(LifecycleState::Idle)).await.unwrap();

        handle.connected().unwrap();
        let mut peer = upstream.accept().await;
        peer.accept_handshake().await;
        within(handle.wait_for(LifecycleState::Active)).await.unwrap();

        within(handle.shutdown()).await;
    }

    #[tokio::test]
    async fn test_disconnect_while_connecting() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _stall = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let settings = AudioSettings::builder().enabled(true).port(port).build().unwrap();
        let (handle, probe, recorded) = spawn(settings);

        handle.connected().unwrap();
        within(handle.wait_for(LifecycleState::Starting)).await.unwrap();

        within(handle.disconnected()).await.unwrap();

        assert_eq!(handle.state(), LifecycleState::Idle);
        assert_eq!(probe.releases(), 0);
        assert!(recorded.faults().is_empty());
    }

    #[tokio::test]
    async fn test_disabling_stops_live_session() {
        let upstream = Upstream::bind().await;
        let settings = upstream.settings();
        let (handle, _probe, _recorded) = spawn(settings.clone());

        handle.connected().unwrap();
        let mut peer = upstream.accept().await;
        peer.accept_handshake().await;
        within(handle.wait_for(LifecycleState::Active)).await.unwrap();

        let disabled = AudioSettings {
            enabled: false,
            ..settings.clone()
        };
        handle.update_settings(disabled).unwrap();
        within(handle.wait_for(LifecycleState::Idle)).await.unwrap();
        within(peer.wait_closed()).await;

        // Enabling again waits for the next connected signal
        handle.update_settings(settings).unwrap();
        assert!(upstream.try_accept(Duration::from_millis(100)).await.is_none());
        handle.connected().unwrap();
        let _peer = upstream.accept().await;
    }

    #[tokio::test]
    async fn test_disconnect_while_handshaking() {
        let upstream = Upstream::bind().await;
        let (handle, probe, recorded) = spawn(upstream.settings());

        handle.connected().unwrap();
        let mut peer = upstream.accept().await;

        // Request received, no reply sent
        let request = peer.recv_text().await;
        assert!(request.starts_with("CD:opus\n"));

        within(handle.disconnected()).await.unwrap();

        assert_eq!(handle.state(), LifecycleState::Idle);
        assert_eq!(probe.releases(), 1);
        within(peer.wait_closed()).await;

        let statuses = recorded.statuses();
        assert!(statuses.contains(&Status::Connection(ConnectionState::Handshaking)));
        assert!(statuses.contains(&Status::Connection(ConnectionState::Stopped)));
        assert!(!statuses.contains(&Status::Connection(ConnectionState::Streaming)));
        assert!(recorded.faults().is_empty());
    }

    #[tokio::test]
    async fn test_spawn_rejects_invalid_settings() {
        let mut settings = AudioSettings::builder().enabled(true).build().unwrap();
        settings.buffer = settings.buffer.with_max_pending(0);

        let result = LifecycleHandle::spawn(settings, MemorySurface::default, TracingStatusSink);
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_invalid_settings_are_rejected() {
        let (handle, _probe, _recorded) = spawn(AudioSettings::default());
        let invalid = AudioSettings {
            port: 0,
            ..AudioSettings::default()
        };
        assert!(matches!(
            handle.update_settings(invalid),
            Err(Error::Config { .. })
        ));
    }

    #[tokio::test]
    async fn test_gesture_reaches_live_session() {
        let upstream = Upstream::bind().await;
        let (handle, probe, _recorded) = spawn(upstream.settings());

        // No session yet, dropped
        handle.user_gesture().unwrap();

        handle.connected().unwrap();
        let mut peer = upstream.accept().await;
        peer.accept_handshake().await;
        within(handle.wait_for(LifecycleState::Active)).await.unwrap();
        assert_eq!(probe.play_calls(), 0);

        handle.user_gesture().unwrap();
        eventually(|| probe.play_calls() == 1).await;
        assert!(probe.is_playing());

        within(handle.disconnected()).await.unwrap();
        assert!(!probe.is_playing());
    }

    #[tokio::test]
    async fn test_shutdown_ends_actor() {
        let (handle, _probe, _recorded) = spawn(AudioSettings::default());

        within(handle.shutdown()).await;

        eventually(|| handle.connected().is_err()).await;
        assert!(handle.disconnected().await.is_err());
        // Second shutdown is a no-op
        within(handle.shutdown()).await;
    }
}
