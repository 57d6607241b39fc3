//! Backend connection primitives.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Dial the backend with a connect timeout
//! - Line framing on top of the raw TCP stream

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::error::{BridgeError, BridgeResult};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a backend connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Inbound half of a backend connection, yielding one message per line.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected, and a
/// line longer than `max_line` is discarded up to its terminating newline.
pub struct LineReader {
    inner: BufReader<OwnedReadHalf>,
    buf: Vec<u8>,
    max_line: usize,
}

impl LineReader {
    /// Next message, `Ok(None)` on clean EOF.
    ///
    /// Blank lines are skipped and a trailing `\r` is dropped. An
    /// unterminated final line is still returned.
    pub async fn next_message(&mut self) -> std::io::Result<Option<String>> {
        loop {
            self.buf.clear();
            let read = (&mut self.inner)
                .take(self.max_line as u64 + 1)
                .read_until(b'\n', &mut self.buf)
                .await?;
            if read == 0 {
                return Ok(None);
            }

            let terminated = self.buf.last() == Some(&b'\n');
            if !terminated && read > self.max_line {
                let skipped = read + self.skip_line().await?;
                tracing::warn!(
                    bytes = skipped,
                    limit = self.max_line,
                    "Oversized backend line dropped"
                );
                continue;
            }

            let mut line = self.buf.as_slice();
            if let Some(rest) = line.strip_suffix(b"\n") {
                line = rest;
            }
            if let Some(rest) = line.strip_suffix(b"\r") {
                line = rest;
            }
            if line.is_empty() {
                continue;
            }
            return Ok(Some(String::from_utf8_lossy(line).into_owned()));
        }
    }

    /// Consume input through the next newline (or EOF), returning the count.
    async fn skip_line(&mut self) -> std::io::Result<usize> {
        let mut skipped = 0;
        loop {
            let (used, done) = {
                let available = self.inner.fill_buf().await?;
                if available.is_empty() {
                    return Ok(skipped);
                }
                match available.iter().position(|b| *b == b'\n') {
                    Some(pos) => (pos + 1, true),
                    None => (available.len(), false),
                }
            };
            self.inner.consume(used);
            skipped += used;
            if done {
                return Ok(skipped);
            }
        }
    }
}

/// Outbound half of a backend connection.
pub struct LineWriter {
    inner: OwnedWriteHalf,
}

impl LineWriter {
    /// Write one message followed by a newline.
    pub async fn send(&mut self, message: &str) -> std::io::Result<()> {
        let mut frame = Vec::with_capacity(message.len() + 1);
        frame.extend_from_slice(message.as_bytes());
        frame.push(b'\n');
        self.inner.write_all(&frame).await?;
        self.inner.flush().await
    }

    /// Half-close the connection.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.inner.shutdown().await {
            tracing::debug!(error = %e, "Backend shutdown failed");
        }
    }
}

/// Dial the backend, failing with `ConnectionFailed` on error or timeout.
pub async fn connect(
    address: &str,
    timeout: Duration,
    max_line: usize,
) -> BridgeResult<(LineReader, LineWriter)> {
    let stream = match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(BridgeError::ConnectionFailed(e.to_string())),
        Err(_) => {
            return Err(BridgeError::ConnectionFailed(format!(
                "connect to {} timed out after {}s",
                address,
                timeout.as_secs()
            )))
        }
    };

    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!(error = %e, "Failed to set TCP_NODELAY");
    }

    let (read_half, write_half) = stream.into_split();
    Ok((
        LineReader {
            inner: BufReader::new(read_half),
            buf: Vec::new(),
            max_line,
        },
        LineWriter { inner: write_half },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
        assert!(id2.as_u64() > id1.as_u64());
        assert!(id1.to_string().starts_with("conn-"));
    }

    #[tokio::test]
    async fn test_line_framing() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket
                .write_all(b"type:login_success\r\n\ntype:groups_list|groups:a,b\n")
                .await
                .unwrap();
            let mut line = String::new();
            BufReader::new(&mut socket).read_line(&mut line).await.unwrap();
            line
        });

        let (mut reader, mut writer) = connect(&addr.to_string(), Duration::from_secs(1), 1024)
            .await
            .unwrap();
        writer.send("type:login|username:alice").await.unwrap();

        assert_eq!(
            reader.next_message().await.unwrap().as_deref(),
            Some("type:login_success")
        );
        assert_eq!(
            reader.next_message().await.unwrap().as_deref(),
            Some("type:groups_list|groups:a,b")
        );
        assert_eq!(server.await.unwrap(), "type:login|username:alice\n");
        assert_eq!(reader.next_message().await.unwrap(), None);
    }

    /// Serve `payload` to the first client, then close.
    async fn serve_bytes(payload: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(payload).await.unwrap();
        });
        addr.to_string()
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_replaced_not_fatal() {
        let addr = serve_bytes(b"type:system_message|content:caf\xe9\ntype:ok\n").await;
        let (mut reader, _writer) = connect(&addr, Duration::from_secs(1), 1024).await.unwrap();

        assert_eq!(
            reader.next_message().await.unwrap().as_deref(),
            Some("type:system_message|content:caf\u{FFFD}")
        );
        assert_eq!(reader.next_message().await.unwrap().as_deref(), Some("type:ok"));
        assert_eq!(reader.next_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_line_is_dropped() {
        let addr = serve_bytes(
            b"type:a|content:0123456789abcdef0123456789\ntype:b\ntype:c|x:12345678901\n",
        )
        .await;
        let (mut reader, _writer) = connect(&addr, Duration::from_secs(1), 20).await.unwrap();

        assert_eq!(reader.next_message().await.unwrap().as_deref(), Some("type:b"));
        // exactly at the limit
        assert_eq!(
            reader.next_message().await.unwrap().as_deref(),
            Some("type:c|x:12345678901")
        );
        assert_eq!(reader.next_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unterminated_final_line_is_returned() {
        let addr = serve_bytes(b"type:ok\ntype:last").await;
        let (mut reader, _writer) = connect(&addr, Duration::from_secs(1), 1024).await.unwrap();

        assert_eq!(reader.next_message().await.unwrap().as_deref(), Some("type:ok"));
        assert_eq!(reader.next_message().await.unwrap().as_deref(), Some("type:last"));
        assert_eq!(reader.next_message().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_connect_refused_is_connection_failed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = connect(&addr.to_string(), Duration::from_secs(1), 1024)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BridgeError::ConnectionFailed(_)));
    }
}
