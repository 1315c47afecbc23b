//! Builder pattern for audio settings.
//!
//! Provides a fluent API for configuring [`AudioSettings`].
//!
//! # Example
//!
//! ```no_run
//! use remote_audio::{AudioSettings, Codec};
//!
//! # fn example() -> remote_audio::Result<()> {
//! let settings = AudioSettings::builder()
//!     .enabled(true)
//!     .host("viewer.example.com")
//!     .port(6081)
//!     .codec(Codec::Opus)
//!     .secret("shared")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::Result;
use crate::protocol::Codec;

use super::settings::AudioSettings;

// ============================================================================
// SettingsBuilder
// ============================================================================

/// Builder for [`AudioSettings`].
///
/// Use [`AudioSettings::builder()`] to create a new builder.
#[derive(Debug, Default, Clone)]
pub struct SettingsBuilder {
    /// Settings under construction.
    settings: AudioSettings,
}

// ============================================================================
// SettingsBuilder Implementation
// ============================================================================

impl SettingsBuilder {
    /// Creates a builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from existing settings.
    #[inline]
    #[must_use]
    pub fn from_settings(settings: AudioSettings) -> Self {
        Self { settings }
    }

    /// Enables or disables audio.
    #[inline]
    #[must_use]
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.settings.enabled = enabled;
        self
    }

    /// Sets the codec.
    #[inline]
    #[must_use]
    pub fn codec(mut self, codec: Codec) -> Self {
        self.settings.codec = codec;
        self
    }

    /// Sets the bitrate in bits per second.
    #[inline]
    #[must_use]
    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.settings.bitrate = bitrate;
        self
    }

    /// Sets the sample rate in Hz.
    #[inline]
    #[must_use]
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.settings.sample_rate = sample_rate;
        self
    }

    /// Sets the shared secret.
    #[inline]
    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        self.settings.secret = Some(secret.into());
        self
    }

    /// Sets the upstream host.
    #[inline]
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.settings.host = host.into();
        self
    }

    /// Sets the upstream port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.settings.port = port;
        self
    }

    /// Sets the endpoint path.
    #[inline]
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.settings.path = path.into();
        self
    }

    /// Selects the encrypted scheme.
    #[inline]
    #[must_use]
    pub fn encrypt(mut self, encrypt: bool) -> Self {
        self.settings.encrypt = encrypt;
        self
    }

    /// Sets the channel open timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.settings.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets how much trailing audio eviction keeps.
    #[inline]
    #[must_use]
    pub fn min_retain(mut self, retain: Duration) -> Self {
        self.settings.buffer = self.settings.buffer.with_min_retain(retain);
        self
    }

    /// Sets the pending queue bound.
    #[inline]
    #[must_use]
    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.settings.buffer = self.settings.buffer.with_max_pending(max_pending);
        self
    }

    /// Builds the settings with validation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] if validation fails.
    pub fn build(self) -> Result<AudioSettings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

// ============================================================================
// Tests
// ============================================================================
