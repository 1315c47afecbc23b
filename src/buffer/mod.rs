//! Playback buffering.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `platform` | [`PlaybackSurface`] and [`SourceBuffer`] seams |
//! | `stream` | [`StreamBuffer`], ordered feeding with eviction |
//! | `memory` | [`MemorySurface`], a byte-bounded in-memory surface |

// ============================================================================
// Submodules
// ============================================================================

/// In-memory playback surface.
pub mod memory;

/// Platform seam for playback.
pub mod platform;

/// Ordered segment feeding.
pub mod stream;

// ============================================================================
// Re-exports
// ============================================================================

pub use memory::{
    Completion, MemoryProbe, MemorySource, MemorySurface, MemorySurfaceOptions, PlayOutcome,
};
pub use platform::{BufferedRange, OpenedSource, PlaybackSurface, SourceBuffer, SourceEvent};
pub use stream::StreamBuffer;
