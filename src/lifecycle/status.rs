//! Status reporting to the host UI.

// ============================================================================
// Imports
// ============================================================================

use tracing::{info, warn};

use crate::session::ConnectionState;

use super::machine::LifecycleState;

// ============================================================================
// Status
// ============================================================================

/// Status update published by the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    /// The lifecycle changed state.
    Lifecycle(LifecycleState),
    /// The live session changed connection state.
    Connection(ConnectionState),
    /// The live session ended with a fault.
    Fault {
        /// Description of the fault.
        message: String,
    },
}

// ============================================================================
// StatusSink
// ============================================================================

/// Receiver of [`Status`] updates.
///
/// Called from the lifecycle task, so implementations should not block.
/// Closures taking a [`Status`] implement this trait.
pub trait StatusSink: Send + Sync + 'static {
    /// Handles one update.
    fn report(&self, status: Status);
}

impl<F> StatusSink for F
where
    F: Fn(Status) + Send + Sync + 'static,
{
    fn report(&self, status: Status) {
        self(status);
    }
}

/// Sink that logs every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatusSink;

impl StatusSink for TracingStatusSink {
    fn report(&self, status: Status) {
        match status {
            Status::Lifecycle(state) => info!(%state, "Audio lifecycle"),
            Status::Connection(state) => info!(%state, "Audio connection"),
            Status::Fault { message } => warn!(%message, "Audio session fault"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
