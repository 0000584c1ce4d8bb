//! Error types for the replication server.

use std::fmt;

use codec::CodecError;

use crate::connection::ConnectionId;

/// Result type for replication server operations.
pub type ReplicationResult<T> = Result<T, ReplicationError>;

/// Errors raised by [`crate::ReplicationServer`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationError {
    /// Capturing, encoding or decoding failed.
    Codec(CodecError),

    /// Connection is not registered.
    UnknownConnection { connection: ConnectionId },

    /// Connection is already registered.
    ConnectionExists { connection: ConnectionId },
}

impl fmt::Display for ReplicationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::UnknownConnection { connection } => write!(f, "{connection} is not registered"),
            Self::ConnectionExists { connection } => write!(f, "{connection} already exists"),
        }
    }
}

impl std::error::Error for ReplicationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Codec(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CodecError> for ReplicationError {
    fn from(err: CodecError) -> Self {
        Self::Codec(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn codec_errors_chain() {
        let err: ReplicationError = CodecError::InvalidTick { context: "build" }.into();
        assert!(err.source().is_some());
        assert_eq!(err.to_string(), "codec error: invalid tick in build");
    }

    #[test]
    fn connection_display() {
        let err = ReplicationError::UnknownConnection {
            connection: ConnectionId(4),
        };
        assert_eq!(err.to_string(), "connection 4 is not registered");
    }
}
