//! Handshake messages exchanged once per session.
//!
//! The client sends one text message carrying the negotiation parameters and
//! waits for exactly one text reply before any binary audio flows.
//!
//! # Request
//!
//! ```text
//! CD:<codec>
//! BR:<bitrate>
//! SR:<sample-rate>
//!
//! [sec:<secret>]
//! ```
//!
//! Newline-separated `key:value` fields; an empty line ends the parameter
//! block and the optional secret line follows it. The secret key is
//! lowercase while the parameter keys are uppercase. Upstreams in the field
//! depend on that spelling, so it is kept as is.
//!
//! # Reply
//!
//! `READY` on success, `ERR:<reason>` on rejection. Anything else is a
//! protocol violation.

// ============================================================================
// Imports
// ============================================================================

use crate::error::{Error, Result};

use super::Codec;

// ============================================================================
// Constants
// ============================================================================

/// Key of the codec field.
pub const CODEC_KEY: &str = "CD";

/// Key of the bitrate field.
pub const BITRATE_KEY: &str = "BR";

/// Key of the sample rate field.
pub const SAMPLE_RATE_KEY: &str = "SR";

/// Key of the optional secret line.
pub const SECRET_KEY: &str = "sec";

/// Reply token accepting the session.
pub const READY_TOKEN: &str = "READY";

/// Prefix of a rejection reply.
pub const ERROR_PREFIX: &str = "ERR:";

// ============================================================================
// Negotiation
// ============================================================================

/// Parameters the client proposes for a session.
///
/// Chosen once from the current settings and never changed after sending.
#[derive(Clone, PartialEq, Eq)]
pub struct Negotiation {
    codec: Codec,
    bitrate: u32,
    sample_rate: u32,
    secret: Option<String>,
}

impl std::fmt::Debug for Negotiation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Negotiation")
            .field("codec", &self.codec)
            .field("bitrate", &self.bitrate)
            .field("sample_rate", &self.sample_rate)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Negotiation {
    /// Creates negotiation parameters without a secret.
    #[inline]
    #[must_use]
    pub fn new(codec: Codec, bitrate: u32, sample_rate: u32) -> Self {
        Self {
            codec,
            bitrate,
            sample_rate,
            secret: None,
        }
    }

    /// Attaches a shared secret.
    ///
    /// An empty secret is the same as no secret.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the secret contains a line break, which
    /// would split the message.
    pub fn with_secret(mut self, secret: Option<String>) -> Result<Self> {
        let secret = secret.filter(|s| !s.is_empty());
        if let Some(ref s) = secret
            && s.contains(['\n', '\r'])
        {
            return Err(Error::config("secret must not contain line breaks"));
        }
        self.secret = secret;
        Ok(self)
    }

    /// Returns the codec.
    #[inline]
    #[must_use]
    pub const fn codec(&self) -> Codec {
        self.codec
    }

    /// Returns the bitrate in bits per second.
    #[inline]
    #[must_use]
    pub const fn bitrate(&self) -> u32 {
        self.bitrate
    }

    /// Returns the sample rate in Hz.
    #[inline]
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Returns the shared secret, if any.
    #[inline]
    #[must_use]
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    /// Serializes the request message.
    #[must_use]
    pub fn encode(&self) -> String {
        let secret_line = match self.secret.as_deref() {
            Some(secret) => format!("{SECRET_KEY}:{secret}"),
            None => String::new(),
        };

        format!(
            "{CODEC_KEY}:{}\n{BITRATE_KEY}:{}\n{SAMPLE_RATE_KEY}:{}\n\n{secret_line}\n",
            self.codec, self.bitrate, self.sample_rate
        )
    }

    /// Parses a request message on the receiving side.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] for unknown, duplicate or missing keys,
    /// malformed lines, unparseable numbers and unknown codecs.
    pub fn decode(text: &str) -> Result<Self> {
        let mut lines = text.split('\n');

        let mut codec = None;
        let mut bitrate = None;
        let mut sample_rate = None;

        loop {
            let Some(line) = lines.next() else {
                return Err(Error::protocol("unterminated parameter block"));
            };
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                break;
            }

            let (key, value) = split_field(line)?;
            match key {
                CODEC_KEY => set_once(&mut codec, key, value.parse::<Codec>()?)?,
                BITRATE_KEY => set_once(&mut bitrate, key, parse_number(key, value)?)?,
                SAMPLE_RATE_KEY => set_once(&mut sample_rate, key, parse_number(key, value)?)?,
                other => return Err(Error::protocol(format!("unknown key: {other}"))),
            }
        }

        let mut secret: Option<String> = None;
        for line in lines {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }

            let (key, value) = split_field(line)?;
            if key != SECRET_KEY {
                return Err(Error::protocol(format!("unknown key: {key}")));
            }
            set_once(&mut secret, key, value.to_string())?;
        }

        Ok(Self {
            codec: codec.ok_or_else(|| missing(CODEC_KEY))?,
            bitrate: bitrate.ok_or_else(|| missing(BITRATE_KEY))?,
            sample_rate: sample_rate.ok_or_else(|| missing(SAMPLE_RATE_KEY))?,
            secret: secret.filter(|s| !s.is_empty()),
        })
    }
}

// ============================================================================
// Reply
// ============================================================================

/// Upstream answer to a [`Negotiation`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Session accepted; binary audio follows.
    Ready,
    /// Session refused.
    Rejected {
        /// Human-readable reason.
        reason: String,
    },
}

impl Reply {
    /// Parses a reply message.
    ///
    /// A single trailing line break is tolerated.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the text is neither `READY` nor
    /// `ERR:<reason>`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text
            .strip_suffix('\n')
            .map(|t| t.strip_suffix('\r').unwrap_or(t))
            .unwrap_or(text);

        if text == READY_TOKEN {
            return Ok(Self::Ready);
        }

        if let Some(reason) = text.strip_prefix(ERROR_PREFIX) {
            return Ok(Self::Rejected {
                reason: reason.trim().to_string(),
            });
        }

        Err(Error::protocol(format!(
            "unexpected handshake reply: {:?}",
            truncate(text, 64)
        )))
    }

    /// Serializes the reply message.
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            Self::Ready => READY_TOKEN.to_string(),
            Self::Rejected { reason } => format!("{ERROR_PREFIX}{reason}"),
        }
    }

    /// Converts the reply into the outcome of the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Handshake`] carrying the upstream reason on rejection.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Ready => Ok(()),
            Self::Rejected { reason } => Err(Error::handshake(reason)),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn split_field(line: &str) -> Result<(&str, &str)> {
    line.split_once(':')
        .ok_or_else(|| Error::protocol(format!("malformed line: {:?}", truncate(line, 64))))
}

fn set_once<T>(slot: &mut Option<T>, key: &str, value: T) -> Result<()> {
    if slot.is_some() {
        return Err(Error::protocol(format!("duplicate key: {key}")));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_number(key: &str, value: &str) -> Result<u32> {
    value
        .parse()
        .map_err(|_| Error::protocol(format!("invalid value for {key}: {value:?}")))
}

fn missing(key: &str) -> Error {
    Error::protocol(format!("missing key: {key}"))
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

// ============================================================================
// Tests
// ============================================================================
