//! Error types for the core library.

use thiserror::Error;

use crate::store::StoreError;
use crate::uri::UriError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// IMAP operation failed.
    #[error("IMAP error: {0}")]
    Imap(#[from] mailwatch_imap::Error),

    /// POP3 operation failed.
    #[error("POP3 error: {0}")]
    Pop3(#[from] mailwatch_pop3::Error),

    /// Connecting or securing the transport failed.
    #[error(transparent)]
    Net(#[from] mailwatch_net::Error),

    /// The mailbox URI is malformed.
    #[error("Invalid URI: {0}")]
    Uri(#[from] UriError),

    /// Ignore-list persistence failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The worker was told to stop.
    #[error("Fetch cancelled")]
    Cancelled,
}

impl Error {
    /// Returns true if this error means the worker was stopped rather than
    /// the fetch having failed.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        match self {
            Self::Cancelled | Self::Net(mailwatch_net::Error::Aborted) => true,
            Self::Imap(e) => e.is_aborted(),
            Self::Pop3(e) => e.is_aborted(),
            _ => false,
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
    fn test_aborted_is_cancelled() {
        assert!(Error::Cancelled.is_cancelled());
        assert!(Error::Net(mailwatch_net::Error::Aborted).is_cancelled());
        assert!(Error::Imap(mailwatch_imap::Error::Net(mailwatch_net::Error::Aborted)).is_cancelled());
        assert!(Error::Pop3(mailwatch_pop3::Error::Net(mailwatch_net::Error::Aborted)).is_cancelled());
        assert!(!Error::Net(mailwatch_net::Error::Closed).is_cancelled());
        assert!(!Error::Pop3(mailwatch_pop3::Error::Negative("bad".into())).is_cancelled());
    }
}
