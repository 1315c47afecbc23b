//! Audio codec and container identifiers.
//!
//! The codec token is what the handshake sends as `CD:<codec>`; the MIME type
//! is what the platform buffer is initialized with. Both must describe what
//! the upstream encoder actually emits, otherwise the platform buffer fails
//! to initialize.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ============================================================================
// Container
// ============================================================================

/// Streamable container the encoder wraps audio in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Container {
    /// WebM (Matroska subset).
    WebM,
    /// Fragmented MP4.
    Mp4,
}

impl Container {
    /// Returns the base MIME type of the container.
    #[inline]
    #[must_use]
    pub const fn mime_base(self) -> &'static str {
        match self {
            Self::WebM => "audio/webm",
            Self::Mp4 => "audio/mp4",
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

/// Audio codec negotiated with the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// Opus in WebM.
    #[default]
    Opus,
    /// Vorbis in WebM.
    Vorbis,
    /// AAC-LC in fragmented MP4.
    Aac,
}

impl Codec {
    /// All supported codecs.
    pub const ALL: [Codec; 3] = [Codec::Opus, Codec::Vorbis, Codec::Aac];

    /// Returns the token used on the wire.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Opus => "opus",
            Self::Vorbis => "vorbis",
            Self::Aac => "aac",
        }
    }

    /// Returns the container this codec is streamed in.
    #[inline]
    #[must_use]
    pub const fn container(self) -> Container {
        match self {
            Self::Opus | Self::Vorbis => Container::WebM,
            Self::Aac => Container::Mp4,
        }
    }

    /// Returns the MIME type used to initialize the platform buffer.
    #[must_use]
    pub fn mime_type(self) -> String {
        let codecs = match self {
            Self::Opus => "opus",
            Self::Vorbis => "vorbis",
            Self::Aac => "mp4a.40.2",
        };
        format!("{}; codecs=\"{codecs}\"", self.container().mime_base())
    }

    /// Returns `true` if the encoder accepts `rate` for this codec.
    ///
    /// Opus only runs at its fixed internal rates; the others accept any
    /// positive rate.
    #[must_use]
    pub fn supports_sample_rate(self, rate: u32) -> bool {
        match self {
            Self::Opus => matches!(rate, 8_000 | 12_000 | 16_000 | 24_000 | 48_000),
            Self::Vorbis | Self::Aac => rate > 0,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Codec {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|codec| codec.as_str() == s)
            .ok_or_else(|| Error::protocol(format!("unknown codec: {s}")))
    }
}

// ============================================================================
// Tests
// ============================================================================
