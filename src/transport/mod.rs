//! WebSocket transport layer.
//!
//! The session speaks to the upstream audio proxy over a WebSocket. The
//! proxy bridges it to the server-side encoder.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Session (Rust) │         WebSocket            │  Audio proxy    │
//! │                 │◄────────────────────────────►│                 │
//! │  Channel        │   ws://host:port/path        │  Encoder bridge │
//! │  → event loop   │                              │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Channel Lifecycle
//!
//! 1. `Channel::connect` - Open the socket (bounded by a timeout)
//! 2. `Channel::send_text` - Handshake request
//! 3. `Channel::next_event` - Handshake reply, then binary segments
//! 4. `Channel::close` - Close the socket and join the event loop
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `channel` | WebSocket channel and event loop |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket channel and event loop.
pub mod channel;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{Channel, ChannelEvent};
