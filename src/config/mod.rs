//! Host-supplied configuration.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`AudioSettings`] | Serde-loadable settings snapshot |
//! | [`SettingsBuilder`] | Fluent builder with validation |
//! | [`BufferOptions`] | Stream buffer tuning |

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder for settings.
pub mod builder;

/// Stream buffer tuning.
pub mod options;

/// Settings and endpoint construction.
pub mod settings;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::SettingsBuilder;
pub use options::BufferOptions;
pub use settings::AudioSettings;
