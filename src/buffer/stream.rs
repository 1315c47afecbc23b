//! Streaming playback buffer.
//!
//! Feeds encoded segments into a [`SourceBuffer`] in strict arrival order.
//! The primitive accepts one append at a time, so feeding runs a two-state
//! machine:
//!
//! ```text
//!            feed / append completes synchronously
//!        ┌──────────────────────────────────────────┐
//!        ▼                                          │
//!   ┌────────┐   feed / append in flight    ┌───────────────┐
//!   │  Idle  │ ───────────────────────────► │ Busy(pending) │ ◄─┐ feed: push back
//!   └────────┘ ◄─────────────────────────── └───────────────┘ ──┘
//!                UpdateEnd, pending empty     UpdateEnd: pop front, append
//! ```
//!
//! A capacity fault evicts everything older than `min_retain_secs` behind the
//! buffered end (at least one second) and retries the append once. If the
//! eviction itself is still in flight, the segment goes back to the head of
//! the pending queue.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::config::BufferOptions;
use crate::error::{Error, Result};
use crate::protocol::Codec;

use super::platform::{OpenedSource, PlaybackSurface, SourceBuffer, SourceEvent};

// ============================================================================
// FeedState
// ============================================================================

/// Append discipline of an attached buffer.
#[derive(Debug, Default)]
enum FeedState {
    /// Nothing in flight; the next segment is appended directly.
    #[default]
    Idle,
    /// An append or removal is in flight; new segments wait in `pending`.
    Busy { pending: VecDeque<Bytes> },
}

// ============================================================================
// Feeder
// ============================================================================

/// Owns the primitive and its pending queue.
struct Feeder<B> {
    source: B,
    state: FeedState,
    options: BufferOptions,
}

impl<B: SourceBuffer> Feeder<B> {
    fn new(source: B, options: BufferOptions) -> Self {
        Self {
            source,
            state: FeedState::Idle,
            options,
        }
    }

    fn pending_len(&self) -> usize {
        match &self.state {
            FeedState::Idle => 0,
            FeedState::Busy { pending } => pending.len(),
        }
    }

    fn is_busy(&self) -> bool {
        matches!(self.state, FeedState::Busy { .. })
    }

    fn feed(&mut self, segment: Bytes) -> Result<()> {
        if !self.source.is_open() {
            return Err(Error::invalid_state("media source is not open"));
        }

        if let FeedState::Busy { pending } = &mut self.state {
            if pending.len() >= self.options.max_pending {
                warn!(limit = self.options.max_pending, "Pending segment queue full");
                return Err(Error::queue_overflow(self.options.max_pending));
            }
            pending.push_back(segment);
            trace!(pending = pending.len(), "Segment queued");
            if self.source.is_updating() {
                return Ok(());
            }
            // No update in flight, so no update end will drain the queue
            return self.settle();
        }

        if self.source.is_updating() {
            // Primitive is busy with work it started on its own
            self.state = FeedState::Busy {
                pending: VecDeque::from([segment]),
            };
            return Ok(());
        }

        self.state = FeedState::Busy {
            pending: VecDeque::new(),
        };
        if let Err(e) = self.append(segment) {
            self.resync();
            return Err(e);
        }
        self.settle()
    }

    fn on_update_end(&mut self) -> Result<()> {
        match self.state {
            FeedState::Idle => {
                trace!("Update end while idle");
                Ok(())
            }
            FeedState::Busy { .. } => self.settle(),
        }
    }

    /// Drains the queue until the primitive reports busy or nothing is left.
    fn settle(&mut self) -> Result<()> {
        let result = self.drain();
        if result.is_err() {
            self.resync();
        }
        result
    }

    fn drain(&mut self) -> Result<()> {
        loop {
            if self.source.is_updating() {
                return Ok(());
            }

            let FeedState::Busy { pending } = &mut self.state else {
                return Ok(());
            };

            let Some(next) = pending.pop_front() else {
                self.state = FeedState::Idle;
                return Ok(());
            };

            self.append(next)?;
        }
    }

    /// Returns to `Idle` after a failed append when nothing is in flight or queued.
    fn resync(&mut self) {
        if self.source.is_updating() {
            return;
        }
        if let FeedState::Busy { pending } = &self.state
            && pending.is_empty()
        {
            self.state = FeedState::Idle;
        }
    }

    fn append(&mut self, segment: Bytes) -> Result<()> {
        match self.source.append(&segment) {
            Err(e) if e.is_capacity_fault() => self.recover_capacity(segment),
            other => other,
        }
    }

    fn recover_capacity(&mut self, segment: Bytes) -> Result<()> {
        self.evict()?;

        if self.source.is_updating() {
            self.requeue_front(segment);
            return Ok(());
        }

        match self.source.append(&segment) {
            Ok(()) => Ok(()),
            Err(e) if e.is_capacity_fault() => Err(Error::playback(format!(
                "segment of {} bytes does not fit after eviction",
                segment.len()
            ))),
            Err(e) => Err(e),
        }
    }

    fn evict(&mut self) -> Result<()> {
        let (start, end) = self
            .source
            .buffered()
            .map_or((0.0, 0.0), |range| (range.start, range.end));
        let remove_end = (end - self.options.min_retain_secs).max(start + 1.0);

        debug!(
            start,
            end = remove_end,
            buffered_end = end,
            "Capacity exceeded, evicting buffered audio"
        );

        self.source.remove(start, remove_end)
    }

    fn requeue_front(&mut self, segment: Bytes) {
        match &mut self.state {
            FeedState::Busy { pending } => pending.push_front(segment),
            FeedState::Idle => {
                self.state = FeedState::Busy {
                    pending: VecDeque::from([segment]),
                };
            }
        }
    }
}

// ============================================================================
// Attachment
// ============================================================================

/// Surface and primitive owned while attached.
struct Attachment<S: PlaybackSurface> {
    surface: S,
    events: mpsc::UnboundedReceiver<SourceEvent>,
    feeder: Feeder<S::Source>,
}

// ============================================================================
// StreamBuffer
// ============================================================================

/// Feeds encoded segments to a playback surface in arrival order.
///
/// # Example
///
/// ```ignore
/// use remote_audio::{BufferOptions, Codec, MemorySurface, StreamBuffer};
///
/// let mut buffer = StreamBuffer::for_codec(Codec::Opus, BufferOptions::default());
/// buffer.attach(MemorySurface::default()).await?;
///
/// buffer.feed(segment)?;
///
/// // Completion events come from the primitive
/// while let Some(event) = buffer.next_event().await {
///     buffer.handle_event(event)?;
/// }
/// ```
pub struct StreamBuffer<S: PlaybackSurface> {
    /// MIME type the source is opened with.
    mime: String,
    /// Eviction and queue tuning.
    options: BufferOptions,
    /// Present between `attach` and `detach`.
    attachment: Option<Attachment<S>>,
}

impl<S: PlaybackSurface> fmt::Debug for StreamBuffer<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamBuffer")
            .field("mime", &self.mime)
            .field("attached", &self.is_attached())
            .field("busy", &self.is_busy())
            .field("pending", &self.pending_len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// StreamBuffer - Constructor
// ============================================================================

impl<S: PlaybackSurface> StreamBuffer<S> {
    /// Creates a detached buffer for `mime`.
    #[must_use]
    pub fn new(mime: impl Into<String>, options: BufferOptions) -> Self {
        Self {
            mime: mime.into(),
            options,
            attachment: None,
        }
    }

    /// Creates a detached buffer for the container of `codec`.
    #[must_use]
    pub fn for_codec(codec: Codec, options: BufferOptions) -> Self {
        Self::new(codec.mime_type(), options)
    }
}

// ============================================================================
// StreamBuffer - Accessors
// ============================================================================

impl<S: PlaybackSurface> StreamBuffer<S> {
    /// Returns the MIME type.
    #[inline]
    #[must_use]
    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Returns `true` once `attach` has resolved and until `detach`.
    #[inline]
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.attachment.is_some()
    }

    /// Returns `true` while an append is in flight.
    #[inline]
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.attachment
            .as_ref()
            .is_some_and(|attachment| attachment.feeder.is_busy())
    }

    /// Returns the number of queued segments.
    #[inline]
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.attachment
            .as_ref()
            .map_or(0, |attachment| attachment.feeder.pending_len())
    }
}

// ============================================================================
// StreamBuffer - Lifecycle
// ============================================================================

impl<S: PlaybackSurface> StreamBuffer<S> {
    /// Binds the buffer to `surface` and waits for the source to open.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyAttached`] if already bound
    /// - Any error from [`PlaybackSurface::open_source`]
    pub async fn attach(&mut self, mut surface: S) -> Result<()> {
        if self.attachment.is_some() {
            return Err(Error::AlreadyAttached);
        }

        let OpenedSource { buffer, events } = surface.open_source(&self.mime).await?;

        self.attachment = Some(Attachment {
            surface,
            events,
            feeder: Feeder::new(buffer, self.options),
        });

        debug!(mime = %self.mime, "Stream buffer attached");
        Ok(())
    }

    /// Stops playback and unbinds the surface.
    ///
    /// Queued segments are discarded. Calling this while detached does
    /// nothing.
    pub async fn detach(&mut self) {
        let Some(mut attachment) = self.attachment.take() else {
            return;
        };

        attachment.surface.pause().await;
        attachment.surface.release_source();
        attachment.surface.reset_position();

        debug!(
            mime = %self.mime,
            discarded = attachment.feeder.pending_len(),
            "Stream buffer detached"
        );
    }
}

// ============================================================================
// StreamBuffer - Feeding
// ============================================================================

impl<S: PlaybackSurface> StreamBuffer<S> {
    /// Hands one segment to the buffer.
    ///
    /// Appended immediately when idle, queued behind the in-flight append
    /// otherwise.
    ///
    /// # Errors
    ///
    /// - [`Error::NotAttached`] before `attach` resolves
    /// - [`Error::InvalidState`] if the media source is not open
    /// - [`Error::QueueOverflow`] if the pending queue is full
    /// - [`Error::Playback`] if eviction cannot make room
    pub fn feed(&mut self, segment: Bytes) -> Result<()> {
        let attachment = self.attachment.as_mut().ok_or(Error::NotAttached)?;
        attachment.feeder.feed(segment)
    }

    /// Waits for the next event from the primitive.
    ///
    /// Never resolves while detached. Returns `None` if the primitive
    /// dropped its event sender.
    pub async fn next_event(&mut self) -> Option<SourceEvent> {
        match self.attachment.as_mut() {
            Some(attachment) => attachment.events.recv().await,
            None => std::future::pending().await,
        }
    }

    /// Reacts to an event from the primitive.
    ///
    /// # Errors
    ///
    /// - [`Error::Playback`] for [`SourceEvent::Error`]
    /// - Any append error raised while draining the queue
    pub fn handle_event(&mut self, event: SourceEvent) -> Result<()> {
        let Some(attachment) = self.attachment.as_mut() else {
            trace!(?event, "Event after detach ignored");
            return Ok(());
        };

        match event {
            SourceEvent::UpdateEnd => attachment.feeder.on_update_end(),
            SourceEvent::Error(message) => Err(Error::playback(message)),
        }
    }

    /// Starts playback on the bound surface.
    ///
    /// # Errors
    ///
    /// - [`Error::NotAttached`] while detached
    /// - Any error from [`PlaybackSurface::play`]
    pub async fn play(&mut self) -> Result<()> {
        let attachment = self.attachment.as_mut().ok_or(Error::NotAttached)?;
        attachment.surface.play().await
    }
}

// ============================================================================
// Tests
// ============================================================================
