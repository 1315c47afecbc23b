//! Remote Audio - Low-latency out-of-band audio for remote desktop viewers.
//!
//! This library streams server-captured audio over a WebSocket and plays it
//! back incrementally as segments arrive, without waiting for a complete
//! file.
//!
//! # Architecture
//!
//! ```text
//! viewer signal ──► Lifecycle ──► SessionController ──► Channel (WebSocket)
//!                                        │
//!                                        ▼
//!                                  StreamBuffer ──► PlaybackSurface
//! ```
//!
//! Key design principles:
//!
//! - Segments are appended in arrival order, never reordered
//! - The platform buffer takes one append at a time; the rest wait in a queue
//! - Capacity faults are recovered locally by evicting old audio
//! - One round-trip text handshake before any audio flows
//! - At most one live session, no automatic retry
//!
//! # Quick Start
//!
//! ```no_run
//! use remote_audio::{AudioSettings, LifecycleHandle, MemorySurface, Result, TracingStatusSink};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let settings = AudioSettings::builder()
//!         .enabled(true)
//!         .host("viewer.example.com")
//!         .port(6081)
//!         .build()?;
//!
//!     // Any PlaybackSurface works here
//!     let surface = MemorySurface::default();
//!     let lifecycle = LifecycleHandle::spawn(settings, move || surface.clone(), TracingStatusSink)?;
//!
//!     lifecycle.connected()?;
//!     lifecycle.user_gesture()?;
//!
//!     // ...
//!     lifecycle.disconnected().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`buffer`] | [`StreamBuffer`] and the [`PlaybackSurface`] seam |
//! | [`config`] | [`AudioSettings`] and its builder |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`lifecycle`] | [`LifecycleHandle`] and status reporting |
//! | [`protocol`] | Codecs and the handshake codec |
//! | [`session`] | [`SessionController`] |
//! | [`transport`] | WebSocket channel (internal) |
//!
//! # Features
//!
//! - **tls**: encrypted (`wss://`) endpoints through native TLS

// ============================================================================
// Modules
// ============================================================================

/// Playback buffering.
///
/// - [`StreamBuffer`] - Ordered feeding with eviction
/// - [`PlaybackSurface`] / [`SourceBuffer`] - Platform seam
/// - [`MemorySurface`] - Headless surface
pub mod buffer;

/// Settings and buffer tuning.
///
/// Use [`AudioSettings::builder()`] to create validated settings.
pub mod config;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Lifecycle state machine and status reporting.
pub mod lifecycle;

/// Codec definitions and the negotiation handshake.
pub mod protocol;

/// Audio sessions.
pub mod session;

/// WebSocket transport layer.
///
/// Internal module handling the duplex channel to the audio proxy.
pub mod transport;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Buffer types
pub use buffer::{
    BufferedRange, Completion, MemoryProbe, MemorySurface, MemorySurfaceOptions, PlayOutcome,
    PlaybackSurface, SourceBuffer, SourceEvent, StreamBuffer,
};

// Configuration types
pub use config::{AudioSettings, BufferOptions, SettingsBuilder};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::SessionId;

// Lifecycle types
pub use lifecycle::{LifecycleHandle, LifecycleState, Status, StatusSink, TracingStatusSink};

// Protocol types
pub use protocol::{Codec, Container, Negotiation, Reply};

// Session types
pub use session::{ConnectionState, SessionController};
