//! Error types for the IMAP backend.

use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport or secure channel failure.
    #[error(transparent)]
    Net(#[from] mailwatch_net::Error),

    /// Response could not be parsed.
    #[error("Protocol error at position {position}: {message}")]
    Parse {
        /// Byte position where the error occurred.
        position: usize,
        /// Description of what went wrong.
        message: String,
    },

    /// Server returned NO response.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD response.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Server sent BYE (disconnecting).
    #[error("Server sent BYE: {0}")]
    Bye(String),

    /// Protocol violation or unexpected data.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server does not advertise IMAP4 in its capabilities.
    #[error("Server is not IMAP4 compliant")]
    NotCompliant,

    /// A command argument holds a line break or NUL.
    #[error("Invalid {0}: line breaks and NUL cannot be sent")]
    InvalidArgument(&'static str),

    /// Server refuses plaintext LOGIN.
    #[error("Server disabled LOGIN")]
    LoginDisabled,
}

impl Error {
    /// Returns true if the error came from an aborted transport.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Net(mailwatch_net::Error::Aborted))
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
