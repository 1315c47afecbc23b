//! Handshake protocol spoken before audio flows.
//!
//! The same duplex channel carries one text negotiation round trip and then
//! only binary segments of the negotiated container.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Purpose |
//! |---------|-----------|---------|
//! | [`Negotiation`] | Client → Upstream | Codec, bitrate, sample rate, secret |
//! | [`Reply`] | Upstream → Client | `READY` or `ERR:<reason>` |
//! | binary | Upstream → Client | Encoded segments |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `codec` | Codec tokens and MIME types |
//! | `handshake` | Request and reply encoding |

// ============================================================================
// Submodules
// ============================================================================

/// Codec tokens and container MIME types.
pub mod codec;

/// Negotiation request and reply messages.
pub mod handshake;

// ============================================================================
// Re-exports
// ============================================================================

pub use codec::{Codec, Container};
pub use handshake::{Negotiation, Reply};
