//! Error types for transports and secure channels.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the transport and secure channel layers.
///
/// Every variant is fatal to the current fetch attempt.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No resolved address could be connected.
    #[error("Connection failed: {0}")]
    Connect(String),

    /// A read, write or connect did not finish in time.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being waited for.
        operation: &'static str,
        /// The limit that elapsed.
        after: Duration,
    },

    /// The peer closed the connection during a required read.
    #[error("Connection closed by peer")]
    Closed,

    /// The operation was interrupted by an abort signal.
    #[error("Operation aborted")]
    Aborted,

    /// A single line exceeded the allowed length.
    #[error("Line exceeds {0} bytes")]
    LineTooLong(usize),

    /// TLS handshake or record layer error.
    #[error("TLS error: {0}")]
    Tls(rustls::Error),

    /// The peer certificate was rejected.
    #[error("Certificate rejected: {0}")]
    Certificate(String),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// The TLS client configuration could not be built.
    #[error("TLS configuration error: {0}")]
    Config(String),

    /// Invalid state for the requested operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl From<rustls::Error> for Error {
    fn from(err: rustls::Error) -> Self {
        match err {
            rustls::Error::InvalidCertificate(cert) => Self::Certificate(format!("{cert:?}")),
            other => Self::Tls(other),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

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

    #[test]
    fn test_certificate_errors_are_split_out() {
        let err = Error::from(rustls::Error::InvalidCertificate(
            rustls::CertificateError::UnknownIssuer,
        ));
        assert!(matches!(err, Error::Certificate(ref msg) if msg == "UnknownIssuer"));

        let err = Error::from(rustls::Error::HandshakeNotComplete);
        assert!(matches!(err, Error::Tls(_)));
    }

    #[test]
    fn test_timeout_display() {
        let err = Error::Timeout {
            operation: "read",
            after: Duration::from_secs(60),
        };
        assert_eq!(err.to_string(), "read timed out after 60s");
    }
}
