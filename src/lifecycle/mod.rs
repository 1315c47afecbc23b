//! Audio lifecycle.
//!
//! Ties viewer connection signals and user settings to session start and
//! stop, and publishes status for the host UI.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `machine` | [`LifecycleHandle`] and the actor behind it |
//! | `status` | [`Status`] updates and [`StatusSink`] |

// ============================================================================
// Submodules
// ============================================================================

/// Lifecycle state machine.
pub mod machine;

/// Status reporting.
pub mod status;

// ============================================================================
// Re-exports
// ============================================================================

pub use machine::{LifecycleHandle, LifecycleState};
pub use status::{Status, StatusSink, TracingStatusSink};
