//! Audio sessions.
//!
//! A session is one playback attempt, from opening the channel to teardown.
//! Sessions never retry: any fault ends the session and is reported to the
//! lifecycle, which decides whether another one starts.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `controller` | [`SessionController`], drives one session |
//! | `state` | [`ConnectionState`] reported on every transition |

// ============================================================================
// Submodules
// ============================================================================

/// Session controller.
pub mod controller;

/// Connection state.
pub mod state;

// ============================================================================
// Re-exports
// ============================================================================

pub use controller::SessionController;
pub use state::ConnectionState;
