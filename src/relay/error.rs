//! Error taxonomy for delivery attempts.
//!
//! Connection failures are normally absorbed by the reconnect loop and never
//! surface to the caller directly; they appear here only when the loop is
//! interrupted or a live connection fails mid-operation.

use thiserror::Error;

use crate::encoder::EncodeError;

/// Failures reported by the backend connection layer.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The connection could not be established.
    #[error("Failed to connect to backend: {0}")]
    Connect(String),

    /// A command failed after the connection was established.
    #[error("Backend operation failed: {0}")]
    Operation(String),

    /// The reconnect loop was interrupted before a connection was made.
    #[error("Connection attempt interrupted")]
    Interrupted,
}

/// Top-level failure for one delivery attempt.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The envelope could not be serialized. Never retried.
    #[error("Failed to encode envelope: {0}")]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl RelayError {
    /// Returns `true` if the reconnect loop exited on the interrupt flag.
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        matches!(self, Self::Backend(BackendError::Interrupted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_diagnostic_context() {
        let err = RelayError::Backend(BackendError::Operation("WRONGTYPE".to_string()));
        assert_eq!(err.to_string(), "Backend operation failed: WRONGTYPE");

        let err = RelayError::Backend(BackendError::Connect("refused".to_string()));
        assert_eq!(err.to_string(), "Failed to connect to backend: refused");
    }

    #[test]
    fn interrupted_is_recognized() {
        assert!(RelayError::Backend(BackendError::Interrupted).is_interrupted());
        assert!(!RelayError::Backend(BackendError::Operation(String::new())).is_interrupted());
    }
}
