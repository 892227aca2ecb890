//! Transport stream.
//!
//! A [`Transport`] owns a byte stream (plain or secure) plus a read buffer.
//! Callers see blocking-style calls: every read and write is bounded by the
//! configured timeout and is interrupted when the abort signal fires.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tokio::net::{TcpStream, lookup_host};
use tracing::debug;

use crate::abort::AbortSignal;
use crate::config::{Domain, Timeouts, VerifyLevel};
use crate::tls::SecureChannel;
use crate::{Error, Result, verify};

const READ_CHUNK: usize = 8 * 1024;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Byte streams a transport can run over.
pub trait Socket: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Socket for T {}

type BoxedSocket = Box<dyn Socket>;

enum Channel {
    Plain(BoxedSocket),
    Secure(Box<SecureChannel<BoxedSocket>>),
    Closed,
}

impl Channel {
    async fn read(&mut self, buf: &mut BytesMut) -> Result<usize> {
        match self {
            Self::Plain(socket) => {
                buf.reserve(READ_CHUNK);
                Ok(socket.read_buf(buf).await?)
            }
            Self::Secure(channel) => {
                let mut chunk = [0u8; READ_CHUNK];
                let n = channel.recv(&mut chunk).await?;
                buf.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
            Self::Closed => Err(Error::InvalidState("transport is closed".to_string())),
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(socket) => {
                socket.write_all(data).await?;
                socket.flush().await?;
                Ok(())
            }
            Self::Secure(channel) => channel.send(data).await,
            Self::Closed => Err(Error::InvalidState("transport is closed".to_string())),
        }
    }
}

/// A connected byte stream with timeouts and cancellation.
pub struct Transport {
    channel: Channel,
    rbuf: BytesMut,
    timeouts: Timeouts,
    abort: AbortSignal,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let channel = match self.channel {
            Channel::Plain(_) => "plain",
            Channel::Secure(_) => "secure",
            Channel::Closed => "closed",
        };
        f.debug_struct("Transport")
            .field("channel", &channel)
            .field("buffered", &self.rbuf.len())
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl Transport {
    /// Resolves `host` and connects to the first address of the preferred
    /// family that accepts the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connect`] if resolution yields no usable address or
    /// every attempt fails, and [`Error::Aborted`] if the signal fires.
    pub async fn connect(
        host: &str,
        port: u16,
        domain: Domain,
        timeouts: Timeouts,
        mut abort: AbortSignal,
    ) -> Result<Self> {
        let addrs: Vec<SocketAddr> = guarded(&mut abort, timeouts.connect, "resolve", async {
            lookup_host((host, port))
                .await
                .map(|resolved| resolved.collect())
                .map_err(|e| Error::Connect(format!("cannot resolve {host}: {e}")))
        })
        .await?;

        let candidates: Vec<SocketAddr> = addrs
            .into_iter()
            .filter(|addr| domain.accepts(addr))
            .collect();
        if candidates.is_empty() {
            return Err(Error::Connect(format!("no {domain} address for {host}")));
        }

        let mut failures = Vec::new();
        for addr in candidates {
            debug!(%addr, "connecting");
            let attempt = guarded(&mut abort, timeouts.connect, "connect", async {
                Ok(TcpStream::connect(addr).await?)
            })
            .await;
            match attempt {
                Ok(stream) => {
                    if let Err(err) = stream.set_nodelay(true) {
                        debug!(error = %err, "failed to set TCP_NODELAY");
                    }
                    return Ok(Self::from_socket(stream, timeouts, abort));
                }
                Err(Error::Aborted) => return Err(Error::Aborted),
                Err(err) => {
                    debug!(%addr, error = %err, "connect attempt failed");
                    failures.push(format!("{addr}: {err}"));
                }
            }
        }

        Err(Error::Connect(failures.join("; ")))
    }

    /// Wraps an already connected stream.
    pub fn from_socket<S: Socket + 'static>(socket: S, timeouts: Timeouts, abort: AbortSignal) -> Self {
        Self {
            channel: Channel::Plain(Box::new(socket)),
            rbuf: BytesMut::with_capacity(READ_CHUNK),
            timeouts,
            abort,
        }
    }

    /// Returns true once the transport runs over a secure channel.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        matches!(self.channel, Channel::Secure(_))
    }

    /// Returns the number of received bytes not yet consumed.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.rbuf.len()
    }

    /// Returns the configured timeouts.
    #[must_use]
    pub const fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Upgrades the plain stream to a secure channel for `host`.
    ///
    /// Refused while received plaintext is still buffered: such bytes
    /// arrived before the handshake and must not be read as protected data.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the transport is not plain or has
    /// buffered input, or the handshake error.
    pub async fn upgrade(self, host: &str, level: VerifyLevel) -> Result<Self> {
        let config = verify::client_config(level)?;
        self.upgrade_with(host, config).await
    }

    /// Upgrades with an explicit TLS client configuration.
    ///
    /// # Errors
    ///
    /// See [`Transport::upgrade`].
    pub async fn upgrade_with(self, host: &str, config: Arc<rustls::ClientConfig>) -> Result<Self> {
        if !self.rbuf.is_empty() {
            return Err(Error::InvalidState(format!(
                "{} bytes received before the TLS handshake",
                self.rbuf.len()
            )));
        }
        let Self {
            channel,
            rbuf,
            timeouts,
            mut abort,
        } = self;
        let Channel::Plain(socket) = channel else {
            return Err(Error::InvalidState("transport is not plaintext".to_string()));
        };

        let secure = guarded(
            &mut abort,
            timeouts.connect,
            "TLS handshake",
            SecureChannel::connect_with(socket, host, config),
        )
        .await?;

        Ok(Self {
            channel: Channel::Secure(Box::new(secure)),
            rbuf,
            timeouts,
            abort,
        })
    }

    /// Reads one line, without its CRLF or LF terminator.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineTooLong`] past `limit` bytes, [`Error::Closed`]
    /// on end of stream, or a timeout/abort/I/O error.
    pub async fn read_line(&mut self, limit: usize) -> Result<Vec<u8>> {
        self.read_line_within(limit, self.timeouts.io).await
    }

    /// Reads one line, allowing each underlying read up to `wait`.
    ///
    /// # Errors
    ///
    /// See [`Transport::read_line`].
    pub async fn read_line_within(&mut self, limit: usize, wait: Duration) -> Result<Vec<u8>> {
        let mut scanned = 0;
        loop {
            if let Some(offset) = self.rbuf[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + offset;
                if end > limit {
                    return Err(Error::LineTooLong(limit));
                }
                let mut line = self.rbuf.split_to(end + 1).to_vec();
                line.pop();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(line);
            }
            if self.rbuf.len() > limit {
                return Err(Error::LineTooLong(limit));
            }
            scanned = self.rbuf.len();
            self.fill(wait).await?;
        }
    }

    /// Reads exactly `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the stream ends first, or a
    /// timeout/abort/I/O error.
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        while self.rbuf.len() < n {
            self.fill(self.timeouts.io).await?;
        }
        Ok(self.rbuf.split_to(n).to_vec())
    }

    /// Writes all of `data`.
    ///
    /// # Errors
    ///
    /// Returns a timeout, abort or I/O error.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let Self {
            channel,
            timeouts,
            abort,
            ..
        } = self;
        guarded(abort, timeouts.io, "write", channel.write_all(data)).await
    }

    /// Closes the transport gracefully: `close_notify` for a secure channel,
    /// then a write half-close, then a short drain of whatever the peer still
    /// sends. Errors are logged. Further calls do nothing.
    pub async fn shutdown(&mut self) {
        let channel = std::mem::replace(&mut self.channel, Channel::Closed);
        let drain_for = self.timeouts.io.min(DRAIN_TIMEOUT);
        match channel {
            Channel::Closed => return,
            Channel::Plain(mut socket) => {
                if let Err(err) = socket.shutdown().await {
                    debug!(error = %err, "socket shutdown failed");
                }
                drain(&mut socket, drain_for).await;
            }
            Channel::Secure(mut secure) => {
                secure.shutdown(self.timeouts.io).await;
                drain(secure.get_mut(), drain_for).await;
            }
        }
        self.rbuf.clear();
        debug!("transport closed");
    }

    async fn fill(&mut self, wait: Duration) -> Result<()> {
        let Self {
            channel,
            rbuf,
            abort,
            ..
        } = self;
        let n = guarded(abort, wait, "read", channel.read(rbuf)).await?;
        if n == 0 {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

/// Runs `fut` bounded by `limit` and interrupted by `abort`.
async fn guarded<T>(
    abort: &mut AbortSignal,
    limit: Duration,
    operation: &'static str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        () = abort.aborted() => Err(Error::Aborted),
        result = tokio::time::timeout(limit, fut) => match result {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout { operation, after: limit }),
        },
    }
}

async fn drain<S: AsyncRead + Unpin>(socket: &mut S, limit: Duration) {
    let mut sink = [0u8; 1024];
    let drained = tokio::time::timeout(limit, async {
        while let Ok(n) = socket.read(&mut sink).await {
            if n == 0 {
                break;
            }
        }
    })
    .await;
    if drained.is_err() {
        debug!("peer kept sending during shutdown");
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
    use crate::abort::AbortHandle;
    use tokio::net::TcpListener;
    use tokio_test::io::Builder;

    fn transport(mock: tokio_test::io::Mock) -> Transport {
        Transport::from_socket(mock, Timeouts::default(), AbortSignal::never())
    }

    #[tokio::test]
    async fn test_read_line_across_reads() {
        let mock = Builder::new()
            .read(b"* OK rea")
            .read(b"dy\r\nsecond\nthi")
            .read(b"rd\r\n")
            .build();
        let mut t = transport(mock);
        assert_eq!(t.read_line(1024).await.unwrap(), b"* OK ready");
        assert_eq!(t.read_line(1024).await.unwrap(), b"second");
        assert_eq!(t.read_line(1024).await.unwrap(), b"third");
    }

    #[tokio::test]
    async fn test_read_exact_then_line() {
        let mock = Builder::new().read(b"hel").read(b"lo)\r\n").build();
        let mut t = transport(mock);
        assert_eq!(t.read_exact(5).await.unwrap(), b"hello");
        assert_eq!(t.read_line(1024).await.unwrap(), b")");
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let mock = Builder::new().read(b"0123456789abcdef").build();
        let mut t = transport(mock);
        assert!(matches!(t.read_line(8).await, Err(Error::LineTooLong(8))));
    }

    #[tokio::test]
    async fn test_eof_is_closed() {
        let mock = Builder::new().read(b"partial").build();
        let mut t = transport(mock);
        assert!(matches!(t.read_line(1024).await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_write_all() {
        let mock = Builder::new().write(b"a001 CAPABILITY\r\n").build();
        let mut t = transport(mock);
        t.write_all(b"a001 CAPABILITY\r\n").await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout() {
        let (client, _server) = tokio::io::duplex(1024);
        let timeouts = Timeouts::default().io_timeout(Duration::from_secs(5));
        let mut t = Transport::from_socket(client, timeouts, AbortSignal::never());
        let err = t.read_line(1024).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Timeout {
                operation: "read",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_abort_interrupts_read() {
        let (client, _server) = tokio::io::duplex(1024);
        let handle = AbortHandle::new();
        let mut t = Transport::from_socket(client, Timeouts::default(), handle.signal());
        let reader = tokio::spawn(async move { t.read_line(1024).await });
        tokio::task::yield_now().await;
        handle.abort();
        let result = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(result, Err(Error::Aborted)));
    }

    #[tokio::test]
    async fn test_upgrade_refused_with_buffered_plaintext() {
        let mock = Builder::new().read(b"+OK Begin TLS\r\ninjected\r\n").build();
        let mut t = transport(mock);
        assert_eq!(t.read_line(1024).await.unwrap(), b"+OK Begin TLS");
        assert!(t.buffered() > 0);
        let result = t.upgrade("mail.example.com", VerifyLevel::STRICT).await;
        assert!(matches!(result, Err(Error::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let (client, server) = tokio::io::duplex(1024);
        drop(server);
        let mut t = Transport::from_socket(client, Timeouts::default(), AbortSignal::never());
        t.shutdown().await;
        t.shutdown().await;
        assert!(matches!(
            t.write_all(b"x").await,
            Err(Error::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_connect_to_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"+OK hello\r\n").await.unwrap();
        });

        let mut t = Transport::connect(
            "127.0.0.1",
            port,
            Domain::V4,
            Timeouts::default(),
            AbortSignal::never(),
        )
        .await
        .unwrap();
        assert_eq!(t.read_line(1024).await.unwrap(), b"+OK hello");
        assert!(!t.is_secure());
        server.await.unwrap();
        t.shutdown().await;
    }

    #[tokio::test]
    async fn test_connect_no_address_for_family() {
        let result = Transport::connect(
            "127.0.0.1",
            1,
            Domain::V6,
            Timeouts::default(),
            AbortSignal::never(),
        )
        .await;
        assert!(matches!(result, Err(Error::Connect(msg)) if msg.contains("ipv6")));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let result = Transport::connect(
            "127.0.0.1",
            port,
            Domain::Any,
            Timeouts::default(),
            AbortSignal::never(),
        )
        .await;
        assert!(matches!(result, Err(Error::Connect(_))));
    }
}
