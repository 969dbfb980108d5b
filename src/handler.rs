//! Per-connection request handling.
//!
//! Each accepted connection carries exactly one exchange:
//!
//! ```text
//! Client:  <line>\n
//! Server:  (waits for the configured delay, then reads the line)
//!          Hello TCP Client! I received a message from you!
//!          (closes the connection)
//! ```
//!
//! The reply has no trailing newline and there is no error channel on the
//! wire. The read has no timeout: a client that never sends a newline and
//! never closes holds the handler indefinitely.

use crate::error::ConnectionError;
use bytes::{Bytes, BytesMut};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace};

/// Fixed reply written to every client.
pub const RESPONSE: &[u8] = b"Hello TCP Client! I received a message from you!";

/// Artificial latency introduced before the request line is read.
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

/// Read chunk size
const READ_CHUNK: usize = 1024;

/// Record of one handled connection: who connected and what they sent,
/// exactly as it was logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub peer: SocketAddr,
    pub message: String,
}

/// Handle a single client connection.
///
/// Takes ownership of the stream so it is closed on every return path.
pub async fn handle_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    delay: Duration,
) -> Result<Exchange, ConnectionError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    info!(peer = %peer, "Got a TCP message");

    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }

    let mut buffer = BytesMut::with_capacity(READ_CHUNK);
    let line = read_line(&mut stream, &mut buffer)
        .await
        .map_err(ConnectionError::Read)?;
    let message = String::from_utf8_lossy(strip_whitespace(&line)).into_owned();

    info!(peer = %peer, line = %message, "Received message");

    stream
        .write_all(RESPONSE)
        .await
        .map_err(ConnectionError::Write)?;
    stream.flush().await.map_err(ConnectionError::Write)?;

    // The peer may already be gone; the reply has been handed to the kernel.
    if let Err(e) = stream.shutdown().await {
        debug!(peer = %peer, error = %e, "Shutdown after response failed");
    }
    trace!(peer = %peer, "Connection closed");

    Ok(Exchange { peer, message })
}

/// Read bytes up to and including the first `\n`, or up to end-of-stream.
///
/// Anything the client sent past the newline is discarded.
async fn read_line<R>(reader: &mut R, buffer: &mut BytesMut) -> io::Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    let mut scanned = 0;

    loop {
        if let Some(pos) = buffer[scanned..].iter().position(|&b| b == b'\n') {
            let line = buffer.split_to(scanned + pos + 1).freeze();
            buffer.clear();
            return Ok(line);
        }
        scanned = buffer.len();

        buffer.reserve(READ_CHUNK);
        if reader.read_buf(buffer).await? == 0 {
            trace!(len = buffer.len(), "EOF before newline");
            return Ok(buffer.split().freeze());
        }
    }
}

/// Strip leading and trailing ASCII whitespace, vertical tab included.
fn strip_whitespace(line: &[u8]) -> &[u8] {
    let is_space = |b: &u8| matches!(*b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0b' | b'\x0c');

    let start = line.iter().position(|b| !is_space(b)).unwrap_or(line.len());
    let end = line.iter().rposition(|b| !is_space(b)).map_or(start, |i| i + 1);
    &line[start..end]
}
