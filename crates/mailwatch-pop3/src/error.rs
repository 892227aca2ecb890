//! Error types for POP3 operations.

/// Result type alias for POP3 operations.
pub type Result<T> = std::result::Result<T, Error>;

/// POP3 error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport or secure channel failure.
    #[error(transparent)]
    Net(#[from] mailwatch_net::Error),

    /// Server answered `-ERR`; carries the server's text verbatim.
    #[error("POP3 server error: {0}")]
    Negative(String),

    /// Protocol error (unexpected or malformed response).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Feature not supported by server.
    #[error("Server does not support {0}")]
    NotSupported(String),
}

impl Error {
    /// Returns true if the failure was caused by the abort signal.
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Net(mailwatch_net::Error::Aborted))
    }
}
