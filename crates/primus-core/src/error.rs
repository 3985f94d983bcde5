//! Error types for the coordination core.
//!
//! Nothing in this crate is fatal on its own: malformed frames are dropped,
//! connection errors fall back to the primary-election logic, and the reply
//! timeout is a normal state transition. These errors surface where a caller
//! genuinely has to react (configuration, invalid identities, a stopped engine)
//! and internally to classify what a Client should drop.

use thiserror::Error;

/// Main error type for the coordination core.
#[derive(Debug, Error)]
pub enum PrimusError {
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("Invalid application identity: name={name:?} user={user:?}")]
    InvalidIdentity { name: String, user: String },

    #[error("Unsupported command payload version {version} (expected {expected})")]
    UnsupportedVersion { version: i32, expected: i32 },

    #[error("Unknown command kind: {0}")]
    UnknownCommandKind(i32),

    #[error("Frame payload of {len} bytes exceeds maximum {max}")]
    FrameTooLarge { len: u64, max: u64 },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Coordination engine is no longer running")]
    EngineStopped,
}

/// Result type alias for coordination operations.
pub type Result<T> = std::result::Result<T, PrimusError>;

impl From<std::io::Error> for PrimusError {
    fn from(err: std::io::Error) -> Self {
        PrimusError::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for PrimusError {
    fn from(err: serde_json::Error) -> Self {
        PrimusError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl PrimusError {
    /// True for errors that describe a single bad message rather than a bad
    /// connection. The offending frame is dropped and the stream keeps going.
    pub fn is_malformed_message(&self) -> bool {
        matches!(
            self,
            PrimusError::Json { .. }
                | PrimusError::InvalidIdentity { .. }
                | PrimusError::UnsupportedVersion { .. }
                | PrimusError::UnknownCommandKind(_)
        )
    }

    /// Socket error kind behind this error, if there is one.
    ///
    /// Stream-level protocol violations (such as an oversized frame) map to
    /// `InvalidData` so they read like any other broken connection.
    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            PrimusError::Io {
                source: Some(err), ..
            } => Some(err.kind()),
            PrimusError::Io { source: None, .. } => Some(std::io::ErrorKind::Other),
            PrimusError::FrameTooLarge { .. } => Some(std::io::ErrorKind::InvalidData),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PrimusError::UnsupportedVersion {
            version: 7,
            expected: 1,
        };
        assert_eq!(
            err.to_string(),
            "Unsupported command payload version 7 (expected 1)"
        );
    }

    #[test]
    fn test_malformed_classification() {
        assert!(PrimusError::UnknownCommandKind(99).is_malformed_message());
        assert!(PrimusError::InvalidIdentity {
            name: String::new(),
            user: "bob".into()
        }
        .is_malformed_message());
        assert!(!PrimusError::EngineStopped.is_malformed_message());
        assert!(!PrimusError::FrameTooLarge { len: 10, max: 5 }.is_malformed_message());
    }

    #[test]
    fn test_io_kind_mapping() {
        let refused: PrimusError =
            std::io::Error::from(std::io::ErrorKind::ConnectionRefused).into();
        assert_eq!(
            refused.io_kind(),
            Some(std::io::ErrorKind::ConnectionRefused)
        );
        assert_eq!(
            PrimusError::FrameTooLarge { len: 10, max: 5 }.io_kind(),
            Some(std::io::ErrorKind::InvalidData)
        );
        assert_eq!(PrimusError::EngineStopped.io_kind(), None);
    }
}
