//! Error type shared by the decoder, the state holders and the bridge.

use thiserror::Error;

/// Errors produced by the IME bridge.
///
/// Only `IndexOutOfRange` signals a caller bug. Native failures are reported
/// so the bridge can log them, but the bridge itself treats them as "no
/// update" and keeps the previous snapshot.
#[derive(Debug, Error)]
pub enum ImeError {
    /// A per-character query used an index past the current buffer.
    #[error("index {index} out of range for buffer of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// The OS declined to return data for a message that claimed to carry it.
    #[error("native query `{query}` failed: {reason}")]
    NativeQueryFailure { query: &'static str, reason: String },

    /// A native payload was returned but could not be decoded.
    #[error("malformed {what} payload: {detail}")]
    MalformedPayload { what: &'static str, detail: String },

    /// Releasing or restoring the input context failed during disposal.
    #[error("failed to release input context: {0}")]
    ContextRelease(String),

    /// The bridge was already disposed.
    #[error("bridge has been disposed")]
    Disposed,

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ImeError {
    pub(crate) fn query(query: &'static str, reason: impl Into<String>) -> Self {
        Self::NativeQueryFailure {
            query,
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        Self::MalformedPayload {
            what,
            detail: detail.into(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, ImeError>;
