//! Mailbox types.

use mailwatch_mime::utf7;

/// Mailbox name, as the user writes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox(pub String);

impl Mailbox {
    /// Creates a new mailbox name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The INBOX mailbox (case-insensitive per RFC).
    #[must_use]
    pub fn inbox() -> Self {
        Self("INBOX".to_string())
    }

    /// Mailbox named by a URI path: leading slashes are dropped and an
    /// empty path means INBOX.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let name = path.trim_start_matches('/');
        if name.is_empty() {
            Self::inbox()
        } else {
            Self::new(name)
        }
    }

    /// Returns the mailbox name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the name to put on the wire: unchanged if ASCII, modified
    /// UTF-7 otherwise.
    #[must_use]
    pub fn encoded(&self) -> String {
        if self.0.is_ascii() {
            self.0.clone()
        } else {
            utf7::encode_imap(&self.0)
        }
    }
}

impl std::fmt::Display for Mailbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Mailbox status information from EXAMINE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxStatus {
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Number of recent messages.
    pub recent: u32,
    /// UIDVALIDITY value.
    pub uid_validity: Option<u32>,
    /// Whether mailbox is read-only.
    pub read_only: bool,
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

    #[test]
    fn test_from_path() {
        assert_eq!(Mailbox::from_path(""), Mailbox::inbox());
        assert_eq!(Mailbox::from_path("/"), Mailbox::inbox());
        assert_eq!(Mailbox::from_path("/Lists/rust").as_str(), "Lists/rust");
    }

    #[test]
    fn test_ascii_name_unchanged() {
        assert_eq!(Mailbox::new("Tom & Jerry").encoded(), "Tom & Jerry");
    }

    #[test]
    fn test_non_ascii_name_encoded() {
        assert_eq!(Mailbox::new("Entwürfe").encoded(), "Entw&APw-rfe");
    }
}
