//! Error types for remote audio streaming.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use remote_audio::{Result, StreamBuffer};
//!
//! fn push(buffer: &mut StreamBuffer<MemorySurface>, data: Bytes) -> Result<()> {
//!     buffer.feed(data)?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::Url`], [`Error::Json`] |
//! | Buffer | [`Error::AlreadyAttached`], [`Error::NotAttached`], [`Error::InvalidState`], [`Error::CapacityExceeded`], [`Error::QueueOverflow`] |
//! | Handshake | [`Error::Handshake`], [`Error::Protocol`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`], [`Error::WebSocket`] |
//! | Playback | [`Error::Playback`], [`Error::PlaybackAborted`] |
//! | External | [`Error::Io`] |
//!
//! # Propagation
//!
//! Capacity faults are recovered inside the buffer and never reach a caller.
//! Everything else that reaches the session controller ends the session and
//! is reported through the status sink; nothing is process-fatal.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when settings are invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Endpoint URL could not be built.
    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),

    // ========================================================================
    // Buffer Errors
    // ========================================================================
    /// The stream buffer is already bound to a playback surface.
    #[error("Stream buffer is already attached to a playback surface")]
    AlreadyAttached,

    /// The stream buffer has no playback surface yet.
    ///
    /// Returned by `feed` and `play` before `attach` has resolved.
    #[error("Stream buffer is not attached to a playback surface")]
    NotAttached,

    /// The platform buffer is not in a state that accepts the operation.
    #[error("Invalid state: {message}")]
    InvalidState {
        /// What the platform buffer was doing.
        message: String,
    },

    /// The platform buffer ran out of space for an append.
    ///
    /// Recovered by eviction inside the stream buffer.
    #[error("Platform buffer capacity exceeded")]
    CapacityExceeded,

    /// Too many segments waiting for the platform buffer.
    #[error("Pending segment queue overflow (limit {limit})")]
    QueueOverflow {
        /// Configured queue bound.
        limit: usize,
    },

    // ========================================================================
    // Handshake Errors
    // ========================================================================
    /// The upstream rejected the negotiation with `ERR:<reason>`.
    #[error("Handshake rejected: {reason}")]
    Handshake {
        /// Reason sent by the upstream.
        reason: String,
    },

    /// Protocol violation or unexpected message.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Duplex channel could not be opened or failed.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Channel open did not complete in time.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Channel closed by the upstream or the transport.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Playback Errors
    // ========================================================================
    /// Unrecoverable playback surface or platform buffer failure.
    #[error("Playback error: {message}")]
    Playback {
        /// Description of the playback failure.
        message: String,
    },

    /// `play` was interrupted by a concurrent pause or source release.
    #[error("Playback request aborted")]
    PlaybackAborted,

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    #[inline]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a queue overflow error.
    #[inline]
    pub fn queue_overflow(limit: usize) -> Self {
        Self::QueueOverflow { limit }
    }

    /// Creates a handshake rejection error.
    #[inline]
    pub fn handshake(reason: impl Into<String>) -> Self {
        Self::Handshake {
            reason: reason.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a playback error.
    #[inline]
    pub fn playback(message: impl Into<String>) -> Self {
        Self::Playback {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a platform buffer capacity fault.
    #[inline]
    #[must_use]
    pub fn is_capacity_fault(&self) -> bool {
        matches!(self, Self::CapacityExceeded)
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is handled without ending the session.
    ///
    /// Capacity faults are absorbed by eviction and an aborted `play` is the
    /// expected outcome of stopping while playback starts.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CapacityExceeded | Self::PlaybackAborted)
    }

    /// Returns `true` if this error ends the session that raised it.
    #[inline]
    #[must_use]
    pub fn is_session_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}

// ============================================================================
// Tests
// ============================================================================
