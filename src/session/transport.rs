//! Stream transport to the peer.
//!
//! [`Transport`] opens a byte stream to a socket address. The bridge wraps
//! the stream in a [`ConnectionHandle`], which enforces the session's
//! write and read rules:
//!
//! - a write is all-or-fail; a short write is [`Error::PartialWrite`]
//! - a read returns at most `read_buffer - 1` bytes
//! - a zero-length read is [`Error::PeerClosed`]
//! - closing consumes the handle, so it happens exactly once

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default response buffer size.
pub const DEFAULT_READ_BUFFER: usize = 128;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Transport
// ============================================================================

/// Opens byte streams to peers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Stream type produced by [`Transport::open`].
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Opens a stream to `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TransportOpen`] if the peer cannot be reached.
    async fn open(&self, addr: SocketAddr) -> Result<Self::Stream>;
}

// ============================================================================
// TcpTransport
// ============================================================================

/// TCP transport with a bounded connect time.
#[derive(Debug, Clone, Copy)]
pub struct TcpTransport {
    connect_timeout: Duration,
    nodelay: bool,
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            nodelay: true,
        }
    }
}

impl TcpTransport {
    /// Creates a transport with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the connect timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Enables or disables `TCP_NODELAY`.
    #[inline]
    #[must_use]
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Returns the connect timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

#[async_trait]
impl Transport for TcpTransport {
    type Stream = TcpStream;

    async fn open(&self, addr: SocketAddr) -> Result<TcpStream> {
        debug!(%addr, timeout_ms = self.connect_timeout.as_millis() as u64, "Connecting");

        let stream = timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                Error::transport_open(
                    addr,
                    format!("timed out after {}ms", self.connect_timeout.as_millis()),
                )
            })?
            .map_err(|e| Error::transport_open(addr, e.to_string()))?;

        if self.nodelay
            && let Err(e) = stream.set_nodelay(true)
        {
            warn!(%addr, error = %e, "Failed to set TCP_NODELAY");
        }

        Ok(stream)
    }
}

// ============================================================================
// ConnectionHandle
// ============================================================================

/// An open stream owned by one session.
pub struct ConnectionHandle<S> {
    stream: S,
    peer: SocketAddr,
    buffer: Vec<u8>,
    read_timeout: Option<Duration>,
}

impl<S> ConnectionHandle<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Wraps an open stream.
    ///
    /// # Arguments
    ///
    /// * `stream` - Open stream to the peer
    /// * `peer` - Peer address, for logging
    /// * `read_buffer` - Response buffer size; at least 2 bytes
    #[must_use]
    pub fn new(stream: S, peer: SocketAddr, read_buffer: usize) -> Self {
        Self {
            stream,
            peer,
            buffer: vec![0; read_buffer.max(2)],
            read_timeout: None,
        }
    }

    /// Bounds every response read.
    #[inline]
    #[must_use]
    pub fn with_read_timeout(mut self, read_timeout: Option<Duration>) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Returns the peer address.
    #[inline]
    #[must_use]
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Writes `payload` in a single transport write.
    ///
    /// # Errors
    ///
    /// - [`Error::PartialWrite`] if fewer bytes were accepted
    /// - [`Error::TransportIo`] if the write failed
    pub async fn write_message(&mut self, payload: &[u8]) -> Result<()> {
        let written = self
            .stream
            .write(payload)
            .await
            .map_err(|e| Error::transport_io(format!("write to {}: {e}", self.peer)))?;

        if written != payload.len() {
            return Err(Error::partial_write(written, payload.len()));
        }

        self.stream
            .flush()
            .await
            .map_err(|e| Error::transport_io(format!("flush to {}: {e}", self.peer)))?;

        trace!(peer = %self.peer, bytes = written, "Wrote message");
        Ok(())
    }

    /// Reads one response.
    ///
    /// The returned slice is valid until the next call.
    ///
    /// # Errors
    ///
    /// - [`Error::PeerClosed`] on a zero-length read
    /// - [`Error::TransportIo`] on read failure or read timeout
    pub async fn read_response(&mut self) -> Result<&[u8]> {
        let limit = self.buffer.len() - 1;
        let read = self.stream.read(&mut self.buffer[..limit]);

        let result = match self.read_timeout {
            Some(deadline) => timeout(deadline, read).await.map_err(|_| {
                Error::transport_io(format!(
                    "no response from {} within {}ms",
                    self.peer,
                    deadline.as_millis()
                ))
            })?,
            None => read.await,
        };

        let count =
            result.map_err(|e| Error::transport_io(format!("read from {}: {e}", self.peer)))?;
        if count == 0 {
            return Err(Error::PeerClosed);
        }

        trace!(peer = %self.peer, bytes = count, "Read response");
        Ok(&self.buffer[..count])
    }

    /// Shuts the stream down and releases it.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(peer = %self.peer, error = %e, "Shutdown failed");
        }
        debug!(peer = %self.peer, "Transport closed");
    }
}

impl<S> fmt::Debug for ConnectionHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("peer", &self.peer)
            .field("read_buffer", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io;

    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    fn peer() -> SocketAddr {
        "192.168.4.2:3333".parse().unwrap()
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let mock = Builder::new().write(b"ping").read(b"pong").build();
        let mut handle = ConnectionHandle::new(mock, peer(), DEFAULT_READ_BUFFER);

        handle.write_message(b"ping").await.unwrap();
        assert_eq!(handle.read_response().await.unwrap(), b"pong");
    }

    #[tokio::test]
    async fn test_short_write_is_partial() {
        let mock = Builder::new().write(b"pi").build();
        let mut handle = ConnectionHandle::new(mock, peer(), DEFAULT_READ_BUFFER);

        let err = handle.write_message(b"ping").await.unwrap_err();
        assert!(matches!(err, Error::PartialWrite { written: 2, expected: 4 }));
    }

    #[tokio::test]
    async fn test_read_is_capped_below_buffer_size() {
        let mock = Builder::new().read(b"abcdefgh").read(b"h").build();
        let mut handle = ConnectionHandle::new(mock, peer(), 8);

        assert_eq!(handle.read_response().await.unwrap(), b"abcdefg");
        assert_eq!(handle.read_response().await.unwrap(), b"h");
        assert_eq!(handle.read_response().await.unwrap(), b"h");
    }

    #[tokio::test]
    async fn test_zero_length_read_is_peer_closed() {
        let mock = Builder::new().build();
        let mut handle = ConnectionHandle::new(mock, peer(), DEFAULT_READ_BUFFER);

        assert!(matches!(handle.read_response().await, Err(Error::PeerClosed)));
    }

    #[tokio::test]
    async fn test_read_error_is_transport_io() {
        let mock = Builder::new()
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut handle = ConnectionHandle::new(mock, peer(), DEFAULT_READ_BUFFER);

        let err = handle.read_response().await.unwrap_err();
        assert!(matches!(err, Error::TransportIo { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let (client, _server) = tokio::io::duplex(64);
        let mut handle = ConnectionHandle::new(client, peer(), DEFAULT_READ_BUFFER)
            .with_read_timeout(Some(Duration::from_millis(250)));

        let err = handle.read_response().await.unwrap_err();
        assert!(matches!(err, Error::TransportIo { .. }));
    }

    #[tokio::test]
    async fn test_tcp_transport_connects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            socket.write_all(b"ack").await.unwrap();
            buf
        });

        let stream = TcpTransport::new().open(addr).await.unwrap();
        let mut handle = ConnectionHandle::new(stream, addr, DEFAULT_READ_BUFFER);
        handle.write_message(b"ping").await.unwrap();
        assert_eq!(handle.read_response().await.unwrap(), b"ack");
        handle.close().await;

        assert_eq!(&accept.await.unwrap(), b"ping");
    }

    #[tokio::test]
    async fn test_tcp_transport_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = TcpTransport::new().open(addr).await.unwrap_err();
        assert!(matches!(err, Error::TransportOpen { addr: a, .. } if a == addr));
    }
}
