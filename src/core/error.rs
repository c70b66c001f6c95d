//! Error types for the reader client.

use thiserror::Error;

/// Errors raised by the reader client.
#[derive(Error, Debug)]
pub enum ReaderError {
    /// Transport failure, receive timeout, or a device-reported `Error` line.
    ///
    /// `partial` carries any response lines already read when the failure
    /// occurred, for diagnosis of a desynchronized stream.
    #[error("communication error: {message}")]
    Communication {
        message: String,
        partial: Vec<String>,
    },

    /// No response line arrived within the effective receive deadline.
    ///
    /// A refinement of the communication class; the streaming drain treats
    /// it as normal completion, everything else as a failure.
    #[error("receive timed out after {0} ms")]
    Timeout(u64),

    /// A response row whose shape does not match the negotiated layout.
    ///
    /// Implies stream desynchronization, so `is_communication()` treats it
    /// as a communication failure.
    #[error("parse error: {0}")]
    Parse(String),

    /// A filter, tag operation, or read-plan kind the wire protocol cannot
    /// express. Not transient; never retried.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Out-of-range bank/address/count/antenna supplied by the caller.
    #[error("illegal argument: {0}")]
    IllegalArgument(String),

    /// Operation attempted while disconnected.
    #[error("reader not connected")]
    NotConnected,

    /// Invalid configuration or parameter value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReaderError {
    /// Communication error with no partial response.
    pub fn comm(message: impl Into<String>) -> Self {
        Self::Communication {
            message: message.into(),
            partial: Vec::new(),
        }
    }

    /// Communication error carrying the lines read before the failure.
    pub fn comm_partial(message: impl Into<String>, partial: Vec<String>) -> Self {
        Self::Communication {
            message: message.into(),
            partial,
        }
    }

    /// Parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Check whether this error means the connection is no longer usable.
    ///
    /// Covers transport failures and parse errors (a malformed row implies
    /// the stream is desynchronized).
    pub fn is_communication(&self) -> bool {
        matches!(
            self,
            Self::Communication { .. } | Self::Timeout(_) | Self::Parse(_) | Self::Io(_)
        )
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReaderError>;
