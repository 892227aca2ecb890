//! Secure channel over an existing byte stream.
//!
//! The channel drives a [`rustls::ClientConnection`] by hand so that both
//! carry-over buffers stay explicit:
//!
//! - `incoming` holds ciphertext read from the socket that rustls has not
//!   consumed yet. It is always fed to rustls before the socket is read
//!   again, so no byte is dropped or seen twice.
//! - `plaintext` holds decrypted data that did not fit the caller's buffer.
//!   It survives key updates and is handed out before anything new is
//!   decrypted.

use std::io::{self, Read as _, Write as _};
use std::time::Duration;

use bytes::{Buf as _, BytesMut};
use rustls::pki_types::ServerName;
use rustls::{ClientConnection, ProtocolVersion};
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tracing::{debug, warn};

use crate::config::VerifyLevel;
use crate::{Error, Result, punycode, verify};

const READ_CHUNK: usize = 16 * 1024;

/// Life cycle of a secure channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Exchanging handshake messages.
    Handshaking,
    /// Application data may flow.
    Established,
    /// `close_notify` has been sent.
    Shutdown,
}

/// Record framing limits negotiated for the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSizes {
    /// Record header length.
    pub header: usize,
    /// Maximum record trailer (authentication tag and padding).
    pub trailer: usize,
    /// Maximum plaintext per record.
    pub max_payload: usize,
}

impl StreamSizes {
    fn for_version(version: Option<ProtocolVersion>) -> Self {
        let trailer = match version {
            // content type byte and AEAD tag
            Some(ProtocolVersion::TLSv1_3) => 1 + 16,
            // explicit nonce and AEAD tag
            _ => 8 + 16,
        };
        Self {
            header: 5,
            trailer,
            max_payload: 16 * 1024,
        }
    }
}

/// TLS client channel wrapping a byte stream `S`.
pub struct SecureChannel<S> {
    io: S,
    conn: ClientConnection,
    state: State,
    incoming: BytesMut,
    plaintext: BytesMut,
    sizes: StreamSizes,
    peer_closed: bool,
}

impl<S> std::fmt::Debug for SecureChannel<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecureChannel")
            .field("state", &self.state)
            .field("incoming", &self.incoming.len())
            .field("plaintext", &self.plaintext.len())
            .field("sizes", &self.sizes)
            .finish_non_exhaustive()
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> SecureChannel<S> {
    /// Runs the client handshake over `io` and verifies the server
    /// certificate for `host` at the given level.
    ///
    /// # Errors
    ///
    /// Returns an error if the host name is unusable, the handshake fails,
    /// or the certificate is rejected.
    pub async fn connect(io: S, host: &str, level: VerifyLevel) -> Result<Self> {
        let config = verify::client_config(level)?;
        Self::connect_with(io, host, config).await
    }

    /// Runs the client handshake with an explicit rustls configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the host name is unusable, the handshake fails,
    /// or the certificate is rejected.
    pub async fn connect_with(
        io: S,
        host: &str,
        config: std::sync::Arc<rustls::ClientConfig>,
    ) -> Result<Self> {
        let ascii = punycode::domain_to_ascii(host)
            .ok_or_else(|| Error::Connect(format!("cannot encode host name {host:?}")))?;
        let name = ServerName::try_from(ascii)?;
        let conn = ClientConnection::new(config, name)?;

        let mut channel = Self {
            io,
            conn,
            state: State::Handshaking,
            incoming: BytesMut::with_capacity(READ_CHUNK),
            plaintext: BytesMut::new(),
            sizes: StreamSizes::for_version(None),
            peer_closed: false,
        };
        channel.handshake().await?;
        channel.sizes = StreamSizes::for_version(channel.conn.protocol_version());
        channel.state = State::Established;

        debug!(
            host,
            version = ?channel.conn.protocol_version(),
            suite = ?channel.conn.negotiated_cipher_suite().map(|s| s.suite()),
            "secure channel established"
        );
        Ok(channel)
    }

    /// Returns the channel state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Returns the negotiated framing limits.
    #[must_use]
    pub const fn sizes(&self) -> StreamSizes {
        self.sizes
    }

    /// Reads decrypted data into `buf`, returning the number of bytes
    /// copied. `0` means the peer closed the channel cleanly.
    ///
    /// Plaintext that does not fit is kept for the next call.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket fails or a record cannot be decrypted.
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.state != State::Established {
            return Err(Error::InvalidState(format!("recv in {:?}", self.state)));
        }

        loop {
            if !self.plaintext.is_empty() {
                let n = buf.len().min(self.plaintext.len());
                buf[..n].copy_from_slice(&self.plaintext[..n]);
                self.plaintext.advance(n);
                return Ok(n);
            }
            if self.peer_closed || buf.is_empty() {
                return Ok(0);
            }

            self.pump().await?;
            if self.conn.is_handshaking() {
                debug!("peer requested renegotiation");
                self.state = State::Handshaking;
                self.handshake().await?;
                self.state = State::Established;
            }
            // key updates and alerts
            self.flush_tls().await?;
        }
    }

    /// Encrypts and writes all of `data`, one record payload at a time.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is not established or the socket
    /// write fails.
    pub async fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.state != State::Established {
            return Err(Error::InvalidState(format!("send in {:?}", self.state)));
        }
        for chunk in data.chunks(self.sizes.max_payload) {
            self.conn.writer().write_all(chunk)?;
            self.flush_tls().await?;
        }
        Ok(())
    }

    /// Sends `close_notify` and shuts the socket down, giving up after
    /// `limit`. Failures are logged, not returned. Calling it twice is a
    /// no-op.
    pub async fn shutdown(&mut self, limit: Duration) {
        if self.state == State::Shutdown {
            return;
        }
        self.state = State::Shutdown;
        self.conn.send_close_notify();
        let closed = tokio::time::timeout(limit, async {
            if let Err(err) = self.flush_tls().await {
                warn!(error = %err, "failed to send close_notify");
            }
            if let Err(err) = self.io.shutdown().await {
                debug!(error = %err, "socket shutdown failed");
            }
        })
        .await;
        if closed.is_err() {
            warn!(?limit, "peer stalled during close_notify");
        }
    }

    /// Returns the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.io
    }

    async fn handshake(&mut self) -> Result<()> {
        while self.conn.is_handshaking() {
            self.flush_tls().await?;
            if self.conn.is_handshaking() {
                if !self.conn.wants_read() {
                    return Err(Error::InvalidState("handshake stalled".to_string()));
                }
                self.pump().await?;
            }
        }
        // final flight
        self.flush_tls().await
    }

    /// Feeds pending ciphertext to rustls, reading from the socket only
    /// when nothing is buffered. An incomplete record is not an error: it
    /// is simply consumed and the next call reads more.
    async fn pump(&mut self) -> Result<()> {
        if self.incoming.is_empty() {
            self.incoming.reserve(READ_CHUNK);
            let n = self.io.read_buf(&mut self.incoming).await?;
            if n == 0 {
                return Err(Error::Closed);
            }
        }

        let mut pending = &self.incoming[..];
        let consumed = self.conn.read_tls(&mut pending)?;
        self.incoming.advance(consumed);

        if let Err(err) = self.conn.process_new_packets() {
            // deliver the alert before giving up
            if let Err(flush_err) = self.flush_tls().await {
                debug!(error = %flush_err, "failed to send alert");
            }
            return Err(err.into());
        }

        self.drain_plaintext()
    }

    fn drain_plaintext(&mut self) -> Result<()> {
        let mut chunk = [0u8; 4096];
        loop {
            match self.conn.reader().read(&mut chunk) {
                Ok(0) => {
                    self.peer_closed = true;
                    return Ok(());
                }
                Ok(n) => self.plaintext.extend_from_slice(&chunk[..n]),
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn flush_tls(&mut self) -> Result<()> {
        let mut out = Vec::new();
        while self.conn.wants_write() {
            out.clear();
            self.conn.write_tls(&mut out)?;
            self.io.write_all(&out).await?;
        }
        self.io.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_stream_sizes() {
        let tls13 = StreamSizes::for_version(Some(ProtocolVersion::TLSv1_3));
        assert_eq!(tls13.header, 5);
        assert_eq!(tls13.trailer, 17);
        assert_eq!(tls13.max_payload, 16384);

        let tls12 = StreamSizes::for_version(Some(ProtocolVersion::TLSv1_2));
        assert_eq!(tls12.trailer, 24);
    }

    #[tokio::test]
    async fn test_handshake_fails_on_garbage() {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        tokio::spawn(async move {
            let mut buf = [0u8; 4096];
            let _ = server.read(&mut buf).await;
            let _ = server.write_all(b"HTTP/1.1 400 Bad Request\r\n\r\n").await;
            let _ = server.read(&mut buf).await;
        });
        let result = SecureChannel::connect(client, "mail.example.com", VerifyLevel::STRICT).await;
        assert!(matches!(result, Err(Error::Tls(_))));
    }

    #[tokio::test]
    async fn test_handshake_fails_on_eof() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        drop(server);
        let result = SecureChannel::connect(client, "mail.example.com", VerifyLevel::STRICT).await;
        assert!(result.is_err());
    }
}
