//! Platform seam for playback.
//!
//! A [`PlaybackSurface`] is the element that plays audio (a media element in
//! a browser binding, a device sink natively). Opening a source on it yields
//! a [`SourceBuffer`], the streaming buffer primitive segments are appended
//! to, plus a receiver of the primitive's [`SourceEvent`]s.
//!
//! The primitive accepts one append at a time. An append either completes
//! synchronously or leaves the primitive updating until it emits
//! [`SourceEvent::UpdateEnd`].

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// Notification emitted by a [`SourceBuffer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// The in-flight append or removal finished.
    UpdateEnd,
    /// The primitive failed and cannot continue.
    Error(String),
}

/// Time range currently held by a [`SourceBuffer`], in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferedRange {
    /// Oldest retained position.
    pub start: f64,
    /// End of buffered media.
    pub end: f64,
}

impl BufferedRange {
    /// Returns the buffered duration in seconds.
    #[inline]
    #[must_use]
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Result of [`PlaybackSurface::open_source`].
pub struct OpenedSource<B> {
    /// The streaming buffer primitive.
    pub buffer: B,
    /// Events emitted by the primitive.
    pub events: mpsc::UnboundedReceiver<SourceEvent>,
}

// ============================================================================
// SourceBuffer
// ============================================================================

/// Streaming buffer primitive.
pub trait SourceBuffer: Send + 'static {
    /// Returns `true` while the owning media source is open.
    fn is_open(&self) -> bool;

    /// Returns `true` while an append or removal is in flight.
    fn is_updating(&self) -> bool;

    /// Appends one segment.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::CapacityExceeded`] if the segment does not fit
    /// - [`crate::Error::InvalidState`] if the primitive is updating or closed
    fn append(&mut self, segment: &Bytes) -> Result<()>;

    /// Returns the buffered time range, or `None` when nothing is buffered.
    fn buffered(&self) -> Option<BufferedRange>;

    /// Removes buffered media between `start` and `end` seconds.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidState`] if the primitive is busy.
    fn remove(&mut self, start: f64, end: f64) -> Result<()>;
}

// ============================================================================
// PlaybackSurface
// ============================================================================

/// Element that plays the stream.
#[async_trait]
pub trait PlaybackSurface: Send + 'static {
    /// Streaming buffer primitive created by this surface.
    type Source: SourceBuffer;

    /// Binds a new media source for `mime` and resolves once it is open.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Playback`] if `mime` is not playable.
    async fn open_source(&mut self, mime: &str) -> Result<OpenedSource<Self::Source>>;

    /// Starts playback.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::PlaybackAborted`] if interrupted by pause or release
    /// - [`crate::Error::Playback`] if playback is refused
    async fn play(&mut self) -> Result<()>;

    /// Pauses playback.
    async fn pause(&mut self);

    /// Unbinds the media source.
    fn release_source(&mut self);

    /// Rewinds the playback position to zero.
    fn reset_position(&mut self);
}
