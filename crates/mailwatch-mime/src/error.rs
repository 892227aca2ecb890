//! Error types for header decoding.

/// Result type alias for decoding operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Header decoding errors.
///
/// These never abort a message: callers fall back to the undecoded text or
/// an invalid sentinel and carry on with the next field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Base64 payload is malformed (length, alphabet or padding).
    #[error("Base64 decode error: {0}")]
    Base64(String),

    /// Quoted-Printable payload contains a malformed escape.
    #[error("Quoted-Printable decode error: {0}")]
    QuotedPrintable(String),

    /// Encoded word has an unknown transfer encoding.
    #[error("Unknown transfer encoding: {0}")]
    UnknownEncoding(String),

    /// Date header could not be parsed.
    #[error("Invalid date: {0}")]
    Date(String),
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Self::Base64(err.to_string())
    }
}
