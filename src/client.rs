//! Client side of the greeting exchange.

use crate::error::ClientError;
use crate::handler::RESPONSE;
use bytes::{Bytes, BytesMut};
use std::fmt::Display;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

/// Send `message` followed by a newline, half-close, and collect everything
/// the server writes back until it closes the connection.
pub async fn send_line<A>(addr: A, message: &str) -> Result<Bytes, ClientError>
where
    A: ToSocketAddrs + Display,
{
    let label = addr.to_string();
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|source| ClientError::Connect {
            addr: label.clone(),
            source,
        })?;
    debug!(addr = %label, "Connected");

    stream.write_all(message.as_bytes()).await?;
    stream.write_all(b"\n").await?;
    stream.shutdown().await?;

    let mut response = BytesMut::with_capacity(RESPONSE.len());
    while stream.read_buf(&mut response).await? != 0 {}

    Ok(response.freeze())
}

/// Like [`send_line`], but fails unless the reply is the expected greeting.
pub async fn greet<A>(addr: A, message: &str) -> Result<(), ClientError>
where
    A: ToSocketAddrs + Display,
{
    let response = send_line(addr, message).await?;
    check_response(&response)
}

/// Verify a reply is exactly the greeting.
pub fn check_response(response: &[u8]) -> Result<(), ClientError> {
    if response == RESPONSE {
        Ok(())
    } else {
        Err(ClientError::UnexpectedResponse(
            String::from_utf8_lossy(response).into_owned(),
        ))
    }
}
