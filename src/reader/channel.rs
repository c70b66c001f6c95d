//! Command/response exchange over the transport.
//!
//! The channel enforces the wire framing: statements go out `;`-terminated
//! and newline-framed; responses come back as data lines ended by one
//! blank line, with `Error`-prefixed lines signalling device failure.
//!
//! Exactly one logical command may be in flight at a time. The channel
//! lives behind `Arc<tokio::sync::Mutex<…>>`; synchronous callers lock it
//! per exchange, and the streaming worker holds the owned guard for the
//! whole session so nothing can interleave with the receive loop.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::core::error::{ReaderError, Result};
use crate::transport::{PacketDirection, RqlTransport, TransportListener};

/// Serialized access point to the duplex stream.
pub struct CommandChannel {
    transport: Box<dyn RqlTransport>,
    transport_timeout: Duration,
    listeners: Vec<Arc<dyn TransportListener>>,
}

impl CommandChannel {
    /// Channel over the given transport.
    pub fn new(transport: Box<dyn RqlTransport>) -> Self {
        Self {
            transport,
            transport_timeout: Duration::from_secs(5),
            listeners: Vec::new(),
        }
    }

    /// Set the base transport timeout added to every command timeout.
    pub fn set_transport_timeout(&mut self, timeout: Duration) {
        self.transport_timeout = timeout;
    }

    /// Register an observer of the literal bytes sent and received.
    pub fn add_listener(&mut self, listener: Arc<dyn TransportListener>) {
        self.listeners.push(listener);
    }

    /// Open the underlying transport.
    pub async fn open(&mut self) -> Result<()> {
        self.transport.open().await
    }

    /// Close the underlying transport.
    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    /// Send one statement, appending the `;` terminator and newline when
    /// absent.
    pub async fn send(&mut self, query: &str) -> Result<()> {
        let mut statement = query.trim_end().to_string();
        if !statement.ends_with(';') {
            statement.push(';');
        }
        statement.push('\n');

        trace!(query = %statement.trim_end(), "send");
        self.transport.send(statement.as_bytes()).await?;
        self.transport.flush().await?;
        self.notify(PacketDirection::Send, statement.as_bytes()).await;
        Ok(())
    }

    /// Receive one blank-line-terminated response batch.
    ///
    /// The effective receive deadline is the transport timeout plus the
    /// caller's command timeout. A stray leading blank line is stripped
    /// when `permit_leading_empty` is set. A line beginning with `Error`
    /// consumes one more line and raises, carrying any lines already read.
    pub async fn receive_batch(
        &mut self,
        timeout_ms: u64,
        permit_leading_empty: bool,
    ) -> Result<Vec<String>> {
        let effective = self.transport_timeout + Duration::from_millis(timeout_ms);
        self.transport.set_timeout(effective);

        let mut lines: Vec<String> = Vec::new();
        let mut first = permit_leading_empty;
        loop {
            match self.transport.receive_line().await {
                Ok(Some(line)) => {
                    self.notify(PacketDirection::Receive, line.as_bytes()).await;
                    if line.is_empty() {
                        if first {
                            first = false;
                            continue;
                        }
                        break;
                    }
                    first = false;
                    if line.starts_with("Error") {
                        // the device follows an error line with exactly one
                        // more line, which is discarded
                        let _ = self.transport.receive_line().await;
                        debug!(error = %line, "device error");
                        return Err(ReaderError::comm_partial(line, lines));
                    }
                    lines.push(line);
                }
                Ok(None) => {
                    return Err(ReaderError::comm_partial(
                        "connection closed by reader",
                        lines,
                    ))
                }
                Err(ReaderError::Timeout(ms)) if !lines.is_empty() => {
                    return Err(ReaderError::comm_partial(
                        format!("receive timed out mid-batch after {} ms", ms),
                        lines,
                    ))
                }
                Err(e) => return Err(e),
            }
        }
        Ok(lines)
    }

    /// Send a statement and receive its response batch.
    pub async fn exchange(&mut self, query: &str, timeout_ms: u64) -> Result<Vec<String>> {
        self.send(query).await?;
        self.receive_batch(timeout_ms, false).await
    }

    async fn notify(&self, direction: PacketDirection, bytes: &[u8]) {
        for listener in &self.listeners {
            listener.on_packet(direction, bytes).await;
        }
    }
}
