//! Stream buffer tuning.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use remote_audio::BufferOptions;
//!
//! let options = BufferOptions::new()
//!     .with_min_retain(Duration::from_secs(10))
//!     .with_max_pending(256);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Seconds of trailing audio kept when evicting after a capacity fault.
pub const DEFAULT_MIN_RETAIN_SECS: f64 = 30.0;

/// Segments allowed to wait for the platform buffer before the session fails.
pub const DEFAULT_MAX_PENDING: usize = 1024;

// ============================================================================
// BufferOptions
// ============================================================================

/// Tuning for a stream buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferOptions {
    /// Buffered audio, in seconds, preserved behind the playhead on eviction.
    pub min_retain_secs: f64,

    /// Bound of the pending segment queue.
    pub max_pending: usize,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min_retain_secs: DEFAULT_MIN_RETAIN_SECS,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }

    /// Sets how much trailing audio eviction keeps.
    #[inline]
    #[must_use]
    pub fn with_min_retain(mut self, retain: Duration) -> Self {
        self.min_retain_secs = retain.as_secs_f64();
        self
    }

    /// Sets the pending queue bound.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = BufferOptions::default();
        assert_eq!(options.min_retain_secs, 30.0);
        assert_eq!(options.max_pending, 1024);
    }

    #[test]
    fn test_builder_methods() {
        let options = BufferOptions::new()
            .with_min_retain(Duration::from_millis(2500))
            .with_max_pending(4);
        assert_eq!(options.min_retain_secs, 2.5);
        assert_eq!(options.max_pending, 4);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let options: BufferOptions = serde_json::from_str(r#"{"max_pending": 8}"#).unwrap();
        assert_eq!(options.max_pending, 8);
        assert_eq!(options.min_retain_secs, DEFAULT_MIN_RETAIN_SECS);
    }
}
