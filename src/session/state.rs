//! Connection state reported by a session.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// ConnectionState
// ============================================================================

/// Progress of one session.
///
/// A session moves forward through
/// `idle → connecting → attached → handshaking → streaming` and always ends
/// in `stopped`, from any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Not started.
    #[default]
    Idle,
    /// Opening the channel.
    Connecting,
    /// Channel open and buffer attached to the surface.
    Attached,
    /// Negotiation sent, waiting for the reply.
    Handshaking,
    /// Segments are flowing into the buffer.
    Streaming,
    /// Torn down.
    Stopped,
}

impl ConnectionState {
    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Attached => "attached",
            Self::Handshaking => "handshaking",
            Self::Streaming => "streaming",
            Self::Stopped => "stopped",
        }
    }

    /// Returns `true` once the session has been torn down.
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
