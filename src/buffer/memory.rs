//! In-memory playback surface.
//!
//! [`MemorySurface`] models a byte-bounded streaming buffer without a decoder.
//! Buffered time is derived from a fixed byte rate, eviction trims from the
//! head, and every append is recorded. A cloned [`MemoryProbe`] inspects and
//! drives the surface from outside.
//!
//! Completion of appends is configurable:
//!
//! | Mode | Behavior |
//! |------|----------|
//! | [`Completion::Immediate`] | Appends complete synchronously, no events |
//! | [`Completion::Deferred`] | Stays updating until [`MemoryProbe::complete_update`] |
//! | [`Completion::Spawned`] | A runtime task completes the update and emits `UpdateEnd` |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::error::{Error, Result};

use super::platform::{BufferedRange, OpenedSource, PlaybackSurface, SourceBuffer, SourceEvent};

// ============================================================================
// Constants
// ============================================================================

/// Default capacity (12 MiB).
pub const DEFAULT_CAPACITY_BYTES: usize = 12 * 1024 * 1024;

/// Default byte rate (96 kbit/s).
pub const DEFAULT_BYTES_PER_SECOND: f64 = 12_000.0;

// ============================================================================
// Options
// ============================================================================

/// How appends and removals complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Completion {
    /// Complete synchronously.
    #[default]
    Immediate,
    /// Complete on [`MemoryProbe::complete_update`].
    Deferred,
    /// Complete from a spawned task.
    Spawned,
}

/// Result of the next `play` call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PlayOutcome {
    /// Playback starts.
    #[default]
    Play,
    /// Playback is interrupted before it starts.
    Abort,
    /// Playback is refused.
    Reject(String),
}

/// Configuration for [`MemorySurface`].
#[derive(Debug, Clone, PartialEq)]
pub struct MemorySurfaceOptions {
    /// Bytes the buffer holds before raising a capacity fault.
    pub capacity_bytes: usize,
    /// Byte rate used to convert bytes to seconds.
    pub bytes_per_second: f64,
    /// Completion mode.
    pub completion: Completion,
    /// Accepted MIME types. Empty accepts all.
    pub supported_mimes: Vec<String>,
    /// Keep appended segments for [`MemoryProbe::appended`].
    pub record_segments: bool,
}

impl Default for MemorySurfaceOptions {
    fn default() -> Self {
        Self {
            capacity_bytes: DEFAULT_CAPACITY_BYTES,
            bytes_per_second: DEFAULT_BYTES_PER_SECOND,
            completion: Completion::Immediate,
            supported_mimes: Vec::new(),
            record_segments: true,
        }
    }
}

impl MemorySurfaceOptions {
    /// Sets the capacity in bytes.
    #[must_use]
    pub fn with_capacity(mut self, bytes: usize) -> Self {
        self.capacity_bytes = bytes;
        self
    }

    /// Sets the byte rate.
    #[must_use]
    pub fn with_bytes_per_second(mut self, rate: f64) -> Self {
        self.bytes_per_second = rate;
        self
    }

    /// Sets the completion mode.
    #[must_use]
    pub fn with_completion(mut self, completion: Completion) -> Self {
        self.completion = completion;
        self
    }

    /// Adds an accepted MIME type.
    #[must_use]
    pub fn with_supported_mime(mut self, mime: impl Into<String>) -> Self {
        self.supported_mimes.push(mime.into());
        self
    }

    /// Enables or disables segment recording.
    #[must_use]
    pub fn with_recording(mut self, record: bool) -> Self {
        self.record_segments = record;
        self
    }
}

// ============================================================================
// Shared State
// ============================================================================

#[derive(Debug, Default)]
struct ProbeState {
    mime: Option<String>,
    open: bool,
    updating: bool,
    buffered_bytes: usize,
    start_secs: f64,
    appended: Vec<Bytes>,
    appended_total: usize,
    append_attempts: usize,
    removals: Vec<(f64, f64)>,
    events: Option<mpsc::UnboundedSender<SourceEvent>>,
    playing: bool,
    play_outcome: PlayOutcome,
    play_calls: usize,
    pause_calls: usize,
    releases: usize,
    position_resets: usize,
}

impl ProbeState {
    fn buffered(&self, rate: f64) -> Option<BufferedRange> {
        if self.buffered_bytes == 0 {
            return None;
        }
        Some(BufferedRange {
            start: self.start_secs,
            end: self.start_secs + self.buffered_bytes as f64 / rate,
        })
    }

    fn emit(&self, event: SourceEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

// ============================================================================
// MemoryProbe
// ============================================================================

/// Handle for inspecting and driving a [`MemorySurface`].
#[derive(Debug, Clone, Default)]
pub struct MemoryProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl MemoryProbe {
    /// Returns recorded segments in append order.
    #[must_use]
    pub fn appended(&self) -> Vec<Bytes> {
        self.state.lock().appended.clone()
    }

    /// Returns the total number of bytes appended.
    #[must_use]
    pub fn appended_bytes(&self) -> usize {
        self.state.lock().appended_total
    }

    /// Returns the number of append calls, including failed ones.
    #[must_use]
    pub fn append_attempts(&self) -> usize {
        self.state.lock().append_attempts
    }

    /// Returns requested removal ranges.
    #[must_use]
    pub fn removals(&self) -> Vec<(f64, f64)> {
        self.state.lock().removals.clone()
    }

    /// Returns the MIME type of the current or last source.
    #[must_use]
    pub fn mime(&self) -> Option<String> {
        self.state.lock().mime.clone()
    }

    /// Returns `true` while a source is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state.lock().open
    }

    /// Returns `true` while an update is in flight.
    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.state.lock().updating
    }

    /// Returns `true` between a successful `play` and `pause`.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    /// Returns the number of `play` calls.
    #[must_use]
    pub fn play_calls(&self) -> usize {
        self.state.lock().play_calls
    }

    /// Returns the number of `pause` calls.
    #[must_use]
    pub fn pause_calls(&self) -> usize {
        self.state.lock().pause_calls
    }

    /// Returns the number of released sources.
    #[must_use]
    pub fn releases(&self) -> usize {
        self.state.lock().releases
    }

    /// Returns the number of position resets.
    #[must_use]
    pub fn position_resets(&self) -> usize {
        self.state.lock().position_resets
    }

    /// Completes the in-flight update and emits `UpdateEnd`.
    ///
    /// Returns `false` if nothing was in flight.
    pub fn complete_update(&self) -> bool {
        let mut state = self.state.lock();
        if !state.updating {
            return false;
        }
        state.updating = false;
        state.emit(SourceEvent::UpdateEnd);
        true
    }

    /// Emits a primitive error.
    pub fn fail(&self, message: impl Into<String>) {
        self.state.lock().emit(SourceEvent::Error(message.into()));
    }

    /// Closes the media source without releasing it.
    pub fn close_source(&self) {
        self.state.lock().open = false;
    }

    /// Sets the outcome of subsequent `play` calls.
    pub fn set_play_outcome(&self, outcome: PlayOutcome) {
        self.state.lock().play_outcome = outcome;
    }
}

// ============================================================================
// MemorySource
// ============================================================================

/// Buffer primitive of a [`MemorySurface`].
#[derive(Debug)]
pub struct MemorySource {
    options: Arc<MemorySurfaceOptions>,
    probe: MemoryProbe,
}

impl MemorySource {
    fn begin_update(&self, state: &mut ProbeState) {
        match self.options.completion {
            Completion::Immediate => {}
            Completion::Deferred => state.updating = true,
            Completion::Spawned => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    state.updating = true;
                    let probe = self.probe.clone();
                    handle.spawn(async move {
                        tokio::task::yield_now().await;
                        probe.complete_update();
                    });
                }
                Err(_) => trace!("No runtime, completing update synchronously"),
            },
        }
    }
}

impl SourceBuffer for MemorySource {
    fn is_open(&self) -> bool {
        self.probe.state.lock().open
    }

    fn is_updating(&self) -> bool {
        self.probe.state.lock().updating
    }

    fn append(&mut self, segment: &Bytes) -> Result<()> {
        let mut state = self.probe.state.lock();
        state.append_attempts += 1;

        if !state.open {
            return Err(Error::invalid_state("media source is closed"));
        }
        if state.updating {
            return Err(Error::invalid_state("source buffer is updating"));
        }
        if state.buffered_bytes + segment.len() > self.options.capacity_bytes {
            return Err(Error::CapacityExceeded);
        }

        state.buffered_bytes += segment.len();
        state.appended_total += segment.len();
        if self.options.record_segments {
            state.appended.push(segment.clone());
        }

        self.begin_update(&mut state);
        Ok(())
    }

    fn buffered(&self) -> Option<BufferedRange> {
        self.probe.state.lock().buffered(self.options.bytes_per_second)
    }

    /// Trims from the oldest position up to `end`.
    fn remove(&mut self, start: f64, end: f64) -> Result<()> {
        let rate = self.options.bytes_per_second;
        let mut state = self.probe.state.lock();

        if state.updating {
            return Err(Error::invalid_state("source buffer is updating"));
        }

        state.removals.push((start, end));

        if let Some(range) = state.buffered(rate) {
            let new_start = end.clamp(range.start, range.end);
            let removed = (((new_start - range.start) * rate).round() as usize).min(state.buffered_bytes);
            state.buffered_bytes -= removed;
            state.start_secs = new_start;
        }

        self.begin_update(&mut state);
        Ok(())
    }
}

// ============================================================================
// MemorySurface
// ============================================================================

/// Playback surface backed by memory.
///
/// Clones share state, so one surface can serve successive sessions.
#[derive(Debug, Clone, Default)]
pub struct MemorySurface {
    options: Arc<MemorySurfaceOptions>,
    probe: MemoryProbe,
}

impl MemorySurface {
    /// Creates a surface with `options`.
    #[must_use]
    pub fn new(options: MemorySurfaceOptions) -> Self {
        Self {
            options: Arc::new(options),
            probe: MemoryProbe::default(),
        }
    }

    /// Returns a probe sharing this surface's state.
    #[must_use]
    pub fn probe(&self) -> MemoryProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl PlaybackSurface for MemorySurface {
    type Source = MemorySource;

    async fn open_source(&mut self, mime: &str) -> Result<OpenedSource<MemorySource>> {
        if !self.options.supported_mimes.is_empty()
            && !self.options.supported_mimes.iter().any(|m| m == mime)
        {
            return Err(Error::playback(format!("unsupported MIME type: {mime}")));
        }

        let events = {
            let mut state = self.probe.state.lock();
            let (tx, rx) = mpsc::unbounded_channel();
            state.mime = Some(mime.to_string());
            state.open = true;
            state.updating = false;
            state.buffered_bytes = 0;
            state.start_secs = 0.0;
            state.events = Some(tx);
            rx
        };

        // Source opening is asynchronous on real surfaces
        tokio::task::yield_now().await;

        Ok(OpenedSource {
            buffer: MemorySource {
                options: Arc::clone(&self.options),
                probe: self.probe.clone(),
            },
            events,
        })
    }

    async fn play(&mut self) -> Result<()> {
        let mut state = self.probe.state.lock();
        state.play_calls += 1;

        match state.play_outcome.clone() {
            PlayOutcome::Play => {
                state.playing = true;
                Ok(())
            }
            PlayOutcome::Abort => Err(Error::PlaybackAborted),
            PlayOutcome::Reject(message) => Err(Error::playback(message)),
        }
    }

    async fn pause(&mut self) {
        let mut state = self.probe.state.lock();
        state.pause_calls += 1;
        state.playing = false;
    }

    fn release_source(&mut self) {
        let mut state = self.probe.state.lock();
        state.releases += 1;
        state.open = false;
        state.updating = false;
        state.buffered_bytes = 0;
        state.events = None;
    }

    fn reset_position(&mut self) {
        self.probe.state.lock().position_resets += 1;
    }
}

// ============================================================================
// Tests
// ============================================================================
