//! ABI error types

use thiserror::Error;

/// Errors raised while decoding guest records or saved state
#[derive(Debug, Error)]
pub enum AbiError {
    /// Serialization error from postcard
    #[error("Serialization error: {0}")]
    Serialization(#[from] postcard::Error),

    /// Saved state written by an incompatible version
    #[error(
        "Incompatible state version: {major}.{minor} (expected {expected_major}.{expected_minor})"
    )]
    IncompatibleVersion {
        major: u8,
        minor: u8,
        expected_major: u8,
        expected_minor: u8,
    },

    /// Guest buffer too small for the record
    #[error("Buffer too small: needed {needed}, got {available}")]
    BufferTooSmall { needed: usize, available: usize },

    /// I/O error while reading or writing a record
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Type alias for ABI results
pub type Result<T> = std::result::Result<T, AbiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AbiError::IncompatibleVersion {
            major: 2,
            minor: 0,
            expected_major: 1,
            expected_minor: 0,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Incompatible state version"));
        assert!(msg.contains("2.0"));
        assert!(msg.contains("1.0"));
    }

    #[test]
    fn test_buffer_too_small_error() {
        let err = AbiError::BufferTooSmall {
            needed: 8,
            available: 3,
        };
        assert!(format!("{}", err).contains("needed 8, got 3"));
    }
}
