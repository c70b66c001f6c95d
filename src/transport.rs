//! Byte-stream transport boundary.
//!
//! The engine consumes the reader as a line-oriented text stream behind
//! the `RqlTransport` trait; TCP is the built-in implementation. Serial
//! and Bluetooth transports plug in from outside through the same trait.

pub mod tcp;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::Result;

pub use tcp::TcpTransport;

/// Direction of a raw packet, for transport observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacketDirection {
    /// Bytes sent to the reader.
    Send,
    /// Bytes received from the reader.
    Receive,
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Send => write!(f, ">>>"),
            Self::Receive => write!(f, "<<<"),
        }
    }
}

/// Observer of the literal bytes crossing the transport, for diagnostics.
#[async_trait]
pub trait TransportListener: Send + Sync {
    /// Called with every chunk sent or received.
    async fn on_packet(&self, direction: PacketDirection, bytes: &[u8]);
}

/// A bidirectional, line-oriented byte stream to the reader.
#[async_trait]
pub trait RqlTransport: Send + Sync {
    /// Open the connection.
    async fn open(&mut self) -> Result<()>;

    /// Write bytes to the stream.
    async fn send(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read one newline-terminated line, without its terminator.
    ///
    /// Returns `None` at end of stream. Times out per `set_timeout`.
    async fn receive_line(&mut self) -> Result<Option<String>>;

    /// Set the receive deadline applied to each `receive_line` call.
    fn set_timeout(&mut self, timeout: Duration);

    /// The current receive deadline.
    fn timeout(&self) -> Duration;

    /// Flush buffered writes.
    async fn flush(&mut self) -> Result<()>;

    /// Close the connection.
    async fn close(&mut self) -> Result<()>;
}
