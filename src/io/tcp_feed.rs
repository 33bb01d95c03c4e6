//! Line-delimited JSON feed over TCP
//!
//! The development feed (and the `feedsim` binary) speak newline-delimited
//! JSON: one payload per line, each an object or array of reading objects.
//! Bytes are accumulated and split on newlines so payloads survive
//! arbitrary TCP fragmentation.

use crate::io::stream::{StreamTransport, TransportError};
use async_trait::async_trait;
use bytes::BytesMut;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tracing::info;

const READ_BUF_SIZE: usize = 4096;

/// NDJSON-over-TCP transport for [`crate::io::stream::StreamConnection`]
pub struct TcpJsonTransport {
    addr: String,
    dial_timeout: Duration,
    stream: Option<TcpStream>,
    acc: BytesMut,
}

impl TcpJsonTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            dial_timeout: Duration::from_secs(10),
            stream: None,
            acc: BytesMut::with_capacity(READ_BUF_SIZE),
        }
    }

    pub fn with_dial_timeout(mut self, timeout: Duration) -> Self {
        self.dial_timeout = timeout;
        self
    }
}

#[async_trait]
impl StreamTransport for TcpJsonTransport {
    async fn open(&mut self) -> Result<(), TransportError> {
        let stream =
            tokio::time::timeout(self.dial_timeout, TcpStream::connect(&self.addr)).await??;
        stream.set_nodelay(true)?;
        info!(addr = %self.addr, "feed_tcp_connected");
        self.acc.clear();
        self.stream = Some(stream);
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<String>, TransportError> {
        loop {
            // Drain a complete line from the accumulator first
            if let Some(idx) = self.acc.iter().position(|&b| b == b'\n') {
                let line = self.acc.split_to(idx + 1);
                let line = std::str::from_utf8(&line[..idx])?.trim();
                if line.is_empty() {
                    continue;
                }
                return Ok(Some(line.to_string()));
            }

            let stream = self.stream.as_mut().ok_or("not connected")?;
            let mut buf = [0u8; READ_BUF_SIZE];
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                self.stream = None;
                return Ok(None);
            }
            self.acc.extend_from_slice(&buf[..n]);
        }
    }

    async fn close(&mut self) {
        self.stream = None;
        self.acc.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_lines_reassembled_across_fragments() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            // One payload split across writes, then two in a single write
            socket.write_all(b"{\"tin\": \"A\", ").await.unwrap();
            socket.write_all(b"\"value\": 1}\n").await.unwrap();
            socket.write_all(b"{\"tin\": \"B\"}\n{\"tin\": \"C\"}\n").await.unwrap();
        });

        let mut transport = TcpJsonTransport::new(addr.to_string());
        transport.open().await.unwrap();

        assert_eq!(
            transport.recv().await.unwrap().as_deref(),
            Some(r#"{"tin": "A", "value": 1}"#)
        );
        assert_eq!(transport.recv().await.unwrap().as_deref(), Some(r#"{"tin": "B"}"#));
        assert_eq!(transport.recv().await.unwrap().as_deref(), Some(r#"{"tin": "C"}"#));
        // Writer task is done; peer close reads as a clean end of stream
        assert_eq!(transport.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_blank_lines_skipped() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"\n\n{\"tin\": \"A\"}\n").await.unwrap();
        });

        let mut transport = TcpJsonTransport::new(addr.to_string());
        transport.open().await.unwrap();
        assert_eq!(transport.recv().await.unwrap().as_deref(), Some(r#"{"tin": "A"}"#));
    }

    #[tokio::test]
    async fn test_recv_before_open_errors() {
        let mut transport = TcpJsonTransport::new("127.0.0.1:1");
        assert!(transport.recv().await.is_err());
    }
}
