//! Audio settings supplied by the host UI.
//!
//! Settings are plain serde data so the host can persist them as JSON. They
//! are validated when built or loaded, and each session takes a snapshot of
//! them when it starts.
//!
//! # Example
//!
//! ```ignore
//! use remote_audio::AudioSettings;
//!
//! let settings = AudioSettings::from_json(r#"{
//!     "audio_enabled": true,
//!     "host": "viewer.example.com",
//!     "port": 6081
//! }"#)?;
//!
//! assert_eq!(settings.endpoint()?.as_str(), "ws://viewer.example.com:6081/audio");
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::protocol::{Codec, Negotiation};

use super::builder::SettingsBuilder;
use super::options::BufferOptions;

// ============================================================================
// Constants
// ============================================================================

/// Default upstream host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default upstream port.
pub const DEFAULT_PORT: u16 = 6081;

/// Default endpoint path.
pub const DEFAULT_PATH: &str = "audio";

/// Default bitrate in bits per second.
pub const DEFAULT_BITRATE: u32 = 96_000;

/// Default sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;

/// Default timeout for opening the channel.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

// ============================================================================
// AudioSettings
// ============================================================================

/// User-facing audio settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioSettings {
    /// Start audio when the viewer connects.
    #[serde(alias = "audio_enabled")]
    pub enabled: bool,

    /// Codec requested from the upstream encoder.
    pub codec: Codec,

    /// Bitrate in bits per second.
    pub bitrate: u32,

    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Optional plaintext shared secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// Upstream host name or address.
    pub host: String,

    /// Upstream port.
    pub port: u16,

    /// Endpoint path, with or without a leading slash.
    pub path: String,

    /// Use the encrypted WebSocket scheme.
    pub encrypt: bool,

    /// Milliseconds allowed for opening the channel.
    pub connect_timeout_ms: u64,

    /// Stream buffer tuning.
    pub buffer: BufferOptions,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            codec: Codec::default(),
            bitrate: DEFAULT_BITRATE,
            sample_rate: DEFAULT_SAMPLE_RATE,
            secret: None,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            path: DEFAULT_PATH.to_string(),
            encrypt: false,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            buffer: BufferOptions::default(),
        }
    }
}

impl fmt::Debug for AudioSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSettings")
            .field("enabled", &self.enabled)
            .field("codec", &self.codec)
            .field("bitrate", &self.bitrate)
            .field("sample_rate", &self.sample_rate)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("encrypt", &self.encrypt)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// AudioSettings - Public API
// ============================================================================

impl AudioSettings {
    /// Creates a settings builder starting from defaults.
    #[inline]
    #[must_use]
    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    /// Loads and validates settings from JSON.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the JSON is malformed
    /// - [`Error::Config`] if validation fails
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Serializes the settings to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Returns the WebSocket scheme selected by `encrypt`.
    #[inline]
    #[must_use]
    pub const fn scheme(&self) -> &'static str {
        if self.encrypt { "wss" } else { "ws" }
    }

    /// Builds the upstream endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Url`] if host, port and path do not form a URL.
    pub fn endpoint(&self) -> Result<Url> {
        let host = if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };
        let path = self.path.trim_start_matches('/');

        let url = Url::parse(&format!("{}://{host}:{}/{path}", self.scheme(), self.port))?;
        Ok(url)
    }

    /// Returns the timeout for opening the channel.
    #[inline]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Returns the negotiation parameters for a new session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the secret is unusable.
    pub fn negotiation(&self) -> Result<Negotiation> {
        Negotiation::new(self.codec, self.bitrate, self.sample_rate).with_secret(self.secret.clone())
    }

    /// Validates the settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::config("host is required"));
        }
        if self.host.chars().any(char::is_whitespace) {
            return Err(Error::config(format!("invalid host: {:?}", self.host)));
        }
        if self.port == 0 {
            return Err(Error::config("port must be non-zero"));
        }
        if self.bitrate == 0 {
            return Err(Error::config("bitrate must be non-zero"));
        }
        if !self.codec.supports_sample_rate(self.sample_rate) {
            return Err(Error::config(format!(
                "sample rate {} Hz is not supported by {}",
                self.sample_rate, self.codec
            )));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::config("connect timeout must be non-zero"));
        }
        if !self.buffer.min_retain_secs.is_finite() || self.buffer.min_retain_secs < 0.0 {
            return Err(Error::config("min_retain_secs must be a non-negative number"));
        }
        if self.buffer.max_pending == 0 {
            return Err(Error::config("max_pending must be non-zero"));
        }
        if self.encrypt && !cfg!(feature = "tls") {
            return Err(Error::config(
                "encrypted endpoints require the `tls` feature of remote-audio",
            ));
        }

        self.negotiation()?;
        self.endpoint()
            .map_err(|e| Error::config(format!("invalid endpoint: {e}")))?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
