//! TCP transport.

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

use crate::core::error::{ReaderError, Result};
use crate::transport::RqlTransport;

/// Default RQL service port.
pub const DEFAULT_PORT: u16 = 8080;

/// Line-oriented TCP connection to the reader.
pub struct TcpTransport {
    address: String,
    connect_timeout: Duration,
    receive_timeout: Duration,
    reader: Option<BufReader<OwnedReadHalf>>,
    writer: Option<OwnedWriteHalf>,
}

impl TcpTransport {
    /// Transport for `host:port`.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            connect_timeout: Duration::from_secs(5),
            receive_timeout: Duration::from_secs(5),
            reader: None,
            writer: None,
        }
    }

    /// Set the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The configured address.
    pub fn address(&self) -> &str {
        &self.address
    }
}

#[async_trait]
impl RqlTransport for TcpTransport {
    async fn open(&mut self) -> Result<()> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| {
                ReaderError::comm(format!(
                    "connect to {} timed out after {:?}",
                    self.address, self.connect_timeout
                ))
            })??;
        stream
            .set_nodelay(true)
            .map_err(|e| ReaderError::comm(format!("set_nodelay failed: {}", e)))?;
        let (read_half, write_half) = stream.into_split();
        self.reader = Some(BufReader::new(read_half));
        self.writer = Some(write_half);
        debug!(address = %self.address, "transport opened");
        Ok(())
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(ReaderError::NotConnected)?;
        writer.write_all(bytes).await?;
        Ok(())
    }

    async fn receive_line(&mut self) -> Result<Option<String>> {
        let reader = self.reader.as_mut().ok_or(ReaderError::NotConnected)?;
        let deadline = self.receive_timeout;

        let mut line = String::new();
        let n = tokio::time::timeout(deadline, reader.read_line(&mut line))
            .await
            .map_err(|_| ReaderError::Timeout(deadline.as_millis() as u64))??;
        if n == 0 {
            return Ok(None);
        }
        while line.ends_with('\n') || line.ends_with('\r') {
            line.pop();
        }
        Ok(Some(line))
    }

    fn set_timeout(&mut self, timeout: Duration) {
        self.receive_timeout = timeout;
    }

    fn timeout(&self) -> Duration {
        self.receive_timeout
    }

    async fn flush(&mut self) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(ReaderError::NotConnected)?;
        writer.flush().await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.shutdown().await;
        }
        self.reader = None;
        debug!(address = %self.address, "transport closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_open_send_receive_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 64];
            let n = tokio::io::AsyncReadExt::read(&mut sock, &mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"RESET;\n");
            sock.write_all(b"\r\n").await.unwrap();
        });

        let mut transport = TcpTransport::new(addr.to_string());
        transport.open().await.unwrap();
        transport.send(b"RESET;\n").await.unwrap();
        transport.flush().await.unwrap();
        let line = transport.receive_line().await.unwrap();
        assert_eq!(line.as_deref(), Some(""));
        transport.close().await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _keepalive = tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut transport = TcpTransport::new(addr.to_string());
        transport.open().await.unwrap();
        transport.set_timeout(Duration::from_millis(50));
        assert!(matches!(
            transport.receive_line().await,
            Err(ReaderError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn test_not_connected() {
        let mut transport = TcpTransport::new("127.0.0.1:1");
        assert!(matches!(
            transport.send(b"x").await,
            Err(ReaderError::NotConnected)
        ));
    }
}
