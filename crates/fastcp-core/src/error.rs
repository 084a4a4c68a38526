//! Error types for fastcp-core.

use thiserror::Error;

/// Main error type for fastcp operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration (bad key length, bad root path, bad address).
    #[error("configuration error: {message}")]
    Config { message: String },

    /// Protocol violation or malformed frame (bad header, length mismatch,
    /// oversize decompression).
    #[error("protocol error: {message}")]
    Protocol { message: String },

    /// Peer closed the connection or the stream broke mid-transfer.
    #[error("connection lost")]
    ConnectionLost,

    /// Handshake was rejected by the peer.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Requested destination escapes the configured root.
    #[error("invalid path: {path}")]
    PathInvalid { path: String },

    /// Computed checksum disagrees with the expected one.
    #[error("checksum mismatch")]
    ChecksumMismatch,

    /// A transfer is already in progress on this session.
    #[error("transfer already in progress")]
    TransferBusy,

    /// Operation timed out.
    #[error("operation timed out")]
    Timeout,
}

impl Error {
    /// Shorthand for a protocol violation.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Protocol {
            message: message.into(),
        }
    }

    /// Shorthand for a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
        }
    }

    /// Returns true if this error means the connection is unusable and must
    /// be torn down along with any in-flight writer pipeline.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Protocol { .. } | Error::ConnectionLost | Error::Io(_) | Error::Timeout
        )
    }
}

/// Convenience result type for fastcp operations.
pub type Result<T> = std::result::Result<T, Error>;
