//! Framed I/O for IMAP protocol.
//!
//! IMAP uses CRLF-terminated lines with support for literals. A line ending
//! in `{n}` (or `{n+}`) is followed by exactly `n` raw bytes and then the
//! rest of the logical line, so the reader keeps reading until a physical
//! line arrives without a literal marker.

use std::time::Duration;

use mailwatch_net::Transport;
use tracing::trace;

use crate::{Error, Result};

/// Maximum line length to prevent memory exhaustion.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum literal size to prevent memory exhaustion.
pub const MAX_LITERAL_SIZE: usize = 100 * 1024 * 1024; // 100 MB

/// Framed connection for IMAP protocol.
#[derive(Debug)]
pub struct FramedStream {
    transport: Transport,
}

impl FramedStream {
    /// Creates a new framed stream.
    #[must_use]
    pub const fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// Reads a complete logical response, literals included. The returned
    /// bytes keep the CRLF that precedes each literal payload and drop the
    /// final line terminator.
    ///
    /// # Errors
    ///
    /// Returns a transport error, or a protocol error if a line or literal
    /// exceeds its size limit.
    pub async fn read_response(&mut self) -> Result<Vec<u8>> {
        let wait = self.transport.timeouts().io;
        self.read_response_within(wait).await
    }

    /// Like [`FramedStream::read_response`], allowing up to `wait` for the
    /// first line to start arriving.
    ///
    /// # Errors
    ///
    /// See [`FramedStream::read_response`].
    pub async fn read_response_within(&mut self, wait: Duration) -> Result<Vec<u8>> {
        let mut response = self.read_line(wait).await?;

        // Check for literal at end of line: {123} or {123+}
        while let Some(literal_len) = parse_literal_length(&response) {
            if literal_len > MAX_LITERAL_SIZE {
                return Err(Error::Protocol(format!(
                    "literal too large: {literal_len} bytes (max {MAX_LITERAL_SIZE})"
                )));
            }
            response.extend_from_slice(b"\r\n");
            let literal = self.transport.read_exact(literal_len).await?;
            response.extend_from_slice(&literal);

            let io = self.transport.timeouts().io;
            let rest = self.read_line(io).await?;
            response.extend_from_slice(&rest);
        }

        trace!(response = %String::from_utf8_lossy(&response), "S:");
        Ok(response)
    }

    async fn read_line(&mut self, wait: Duration) -> Result<Vec<u8>> {
        match self.transport.read_line_within(MAX_LINE_LENGTH, wait).await {
            Err(mailwatch_net::Error::LineTooLong(limit)) => Err(Error::Protocol(format!(
                "line too long (max {limit} bytes)"
            ))),
            other => Ok(other?),
        }
    }

    /// Writes a command to the stream.
    ///
    /// # Errors
    ///
    /// Returns a transport error.
    pub async fn write_command(&mut self, data: &[u8]) -> Result<()> {
        self.transport.write_all(data).await?;
        Ok(())
    }

    /// Gets a reference to the underlying transport.
    #[must_use]
    pub const fn get_ref(&self) -> &Transport {
        &self.transport
    }

    /// Gets a mutable reference to the underlying transport.
    pub fn get_mut(&mut self) -> &mut Transport {
        &mut self.transport
    }

    /// Consumes the framed stream and returns the transport.
    #[must_use]
    pub fn into_inner(self) -> Transport {
        self.transport
    }
}

/// Parses a literal length from the end of a line.
///
/// Matches patterns like `{123}` or `{123+}` (non-synchronizing).
fn parse_literal_length(line: &[u8]) -> Option<usize> {
    let body = line.strip_suffix(b"}")?;
    let open = body.iter().rposition(|&b| b == b'{')?;
    let digits = &body[open + 1..];
    let digits = digits.strip_suffix(b"+").unwrap_or(digits);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
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
    use mailwatch_net::{AbortSignal, Timeouts};
    use tokio_test::io::Builder;

    use super::*;

    fn framed(mock: tokio_test::io::Mock) -> FramedStream {
        FramedStream::new(Transport::from_socket(
            mock,
            Timeouts::default(),
            AbortSignal::never(),
        ))
    }

    #[test]
    fn test_parse_literal_length() {
        assert_eq!(parse_literal_length(b"* 1 FETCH (BODY[] {120}"), Some(120));
        assert_eq!(parse_literal_length(b"A001 LOGIN {5+}"), Some(5));
        assert_eq!(parse_literal_length(b"* OK done"), None);
        assert_eq!(parse_literal_length(b"* OK {}"), None);
        assert_eq!(parse_literal_length(b"* OK {x}"), None);
    }

    #[tokio::test]
    async fn test_plain_line() {
        let mock = Builder::new().read(b"* OK ready\r\n").build();
        let mut stream = framed(mock);
        assert_eq!(stream.read_response().await.unwrap(), b"* OK ready");
    }

    #[tokio::test]
    async fn test_literal_reassembled_across_boundaries() {
        let whole: &[u8] = b"a001 OK {5}\r\nhello\r\n";
        for split in 1..whole.len() {
            let mock = Builder::new()
                .read(&whole[..split])
                .read(&whole[split..])
                .build();
            let mut stream = framed(mock);
            let response = stream.read_response().await.unwrap();
            assert_eq!(response, b"a001 OK {5}\r\nhello", "split at {split}");

            let parsed = crate::parser::Response::parse(&response).unwrap();
            let mut tokenizer = mailwatch_mime::Tokenizer::imap(&parsed.data);
            assert_eq!(
                tokenizer.next_token(&[]),
                Some(mailwatch_mime::Token::Literal(b"hello"))
            );
        }
    }

    #[tokio::test]
    async fn test_literal_with_crlf_inside() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (UID 5 BODY[HEADER] {14}\r\n")
            .read(b"Subject: x\r\n\r\n")
            .read(b")\r\n* 2 EXISTS\r\n")
            .build();
        let mut stream = framed(mock);
        let first = stream.read_response().await.unwrap();
        assert_eq!(
            first,
            b"* 1 FETCH (UID 5 BODY[HEADER] {14}\r\nSubject: x\r\n\r\n)"
        );
        assert_eq!(stream.read_response().await.unwrap(), b"* 2 EXISTS");
    }

    #[tokio::test]
    async fn test_literal_too_large() {
        let mock = Builder::new()
            .read(b"* 1 FETCH (BODY[] {999999999999})\r\n")
            .build();
        let mut stream = framed(mock);
        // the marker is not at the end of the line, so this is a plain line
        assert!(stream.read_response().await.is_ok());

        let mock = Builder::new().read(b"* 1 FETCH (BODY[] {104857601}\r\n").build();
        let mut stream = framed(mock);
        assert!(matches!(
            stream.read_response().await,
            Err(Error::Protocol(msg)) if msg.contains("literal too large")
        ));
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let mock = Builder::new().read(b"* OK partial").build();
        let mut stream = framed(mock);
        assert!(matches!(
            stream.read_response().await,
            Err(Error::Net(mailwatch_net::Error::Closed))
        ));
    }

    #[tokio::test]
    async fn test_write_command() {
        let mock = Builder::new().write(b"A001 NOOP\r\n").build();
        let mut stream = framed(mock);
        stream.write_command(b"A001 NOOP\r\n").await.unwrap();
    }
}
