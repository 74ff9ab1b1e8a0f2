//! Centralized error types for the Essentia core library.
//!
//! Decode-side protocol ambiguity is deliberately NOT an error: unrecognized
//! wire data degrades to an `Unrecognized` classification at the codec and
//! never propagates as a failure (stale-but-correct state beats
//! guessed-and-wrong state). The error type below covers caller mistakes and
//! transport-level problems only.

use thiserror::Error;

/// Application-wide error type for the Essentia core.
#[derive(Debug, Error)]
pub enum EssentiaError {
    /// Zone number outside 1..=12.
    #[error("invalid zone {0} (expected 1-12)")]
    InvalidZone(u8),

    /// Source number outside 1..=6.
    #[error("invalid source {0} (expected 1-6)")]
    InvalidSource(u8),

    /// Session configuration failed validation.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Operation requires an open session.
    #[error("session is not open")]
    SessionClosed,

    /// Socket-level failure surfaced to the caller (connect, send, close).
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

impl EssentiaError {
    /// Returns a machine-readable error code for host integrations.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidZone(_) => "invalid_zone",
            Self::InvalidSource(_) => "invalid_source",
            Self::Configuration(_) => "configuration_error",
            Self::SessionClosed => "session_closed",
            Self::Transport(_) => "transport_error",
        }
    }
}

/// Convenient Result alias for crate-wide operations.
pub type EssentiaResult<T> = Result<T, EssentiaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_zone_error_returns_correct_code() {
        let err = EssentiaError::InvalidZone(13);
        assert_eq!(err.code(), "invalid_zone");
        assert_eq!(err.to_string(), "invalid zone 13 (expected 1-12)");
    }

    #[test]
    fn transport_error_wraps_io_error() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe");
        let err = EssentiaError::from(io);
        assert_eq!(err.code(), "transport_error");
    }
}
