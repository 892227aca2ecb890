//! New-mail records built from raw header blocks.

use chrono::{DateTime, Utc};
use mailwatch_mime::{Address, HeaderFields, MailDate, encoded_word};

/// Header fields read from every message.
const FIELDS: [&str; 4] = ["Subject", "From", "Date", "Status"];

/// One message as shown to the user. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mail {
    /// Server-assigned id, unique within its mailbox.
    pub uid: String,
    /// Decoded subject.
    pub subject: String,
    /// Decoded sender.
    pub from: Address,
    /// The `From:` value as received.
    pub from_raw: String,
    /// Parsed `Date:`.
    pub date: MailDate,
    /// Set when a `Status:` header marks the message as read.
    pub read: bool,
}

impl Mail {
    /// Builds a mail from a raw header block.
    ///
    /// Missing fields leave their slot empty; a missing or malformed date is
    /// [`MailDate::Invalid`].
    #[must_use]
    pub fn from_header(uid: impl Into<String>, header: &[u8]) -> Self {
        let mut mail = Self {
            uid: uid.into(),
            subject: String::new(),
            from: Address::default(),
            from_raw: String::new(),
            date: MailDate::Invalid,
            read: false,
        };

        let mut fields = HeaderFields::new(header);
        while let Some((index, value)) = fields.field(&FIELDS) {
            match index {
                0 => mail.subject = encoded_word::decode(&value),
                1 => {
                    mail.from = Address::parse(&value);
                    mail.from_raw = String::from_utf8_lossy(&value).into_owned();
                }
                2 => mail.date = MailDate::parse(&value),
                _ => mail.read = value.iter().any(|&b| b.eq_ignore_ascii_case(&b'R')),
            }
        }
        mail
    }

    /// Renders the sender: display name, else address, else the raw header
    /// value.
    #[must_use]
    pub fn from_display(&self) -> &str {
        if self.from.is_empty() {
            &self.from_raw
        } else {
            self.from.display()
        }
    }

    /// Returns the date in UTC if it parsed.
    #[must_use]
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.date.valid().map(|date| date.with_timezone(&Utc))
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
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_from_header() {
        let header = b"Subject: =?ISO-8859-1?Q?caf=E9?= au lait\r\n\
                       From: \"Doe, John\" <john@example.com>\r\n\
                       Date: Tue, 1 Jul 2003 10:52:37 +0200\r\n\r\n";
        let mail = Mail::from_header("42", header);
        assert_eq!(mail.uid, "42");
        assert_eq!(mail.subject, "café au lait");
        assert_eq!(mail.from_display(), "Doe, John");
        assert_eq!(mail.from.address, "john@example.com");
        assert_eq!(mail.from_raw, "\"Doe, John\" <john@example.com>");
        assert_eq!(
            mail.timestamp(),
            Some(Utc.with_ymd_and_hms(2003, 7, 1, 8, 52, 37).unwrap())
        );
        assert!(!mail.read);
    }

    #[test]
    fn test_folded_subject() {
        let header = b"Subject: a long\r\n  subject line\r\n\r\n";
        let mail = Mail::from_header("1", header);
        assert_eq!(mail.subject, "a long  subject line");
    }

    #[test]
    fn test_status_marks_read() {
        let mail = Mail::from_header("1", b"Status: RO\r\n\r\n");
        assert!(mail.read);
        let mail = Mail::from_header("1", b"Status: O\r\n\r\n");
        assert!(!mail.read);
    }

    #[test]
    fn test_missing_fields() {
        let mail = Mail::from_header("7", b"X-Other: y\r\n\r\n");
        assert_eq!(mail.subject, "");
        assert_eq!(mail.from_display(), "");
        assert_eq!(mail.date, MailDate::Invalid);
        assert_eq!(mail.timestamp(), None);
    }

    #[test]
    fn test_from_display_fallbacks() {
        let mail = Mail::from_header("1", b"From: bob@example.com\r\n\r\n");
        assert_eq!(mail.from_display(), "bob@example.com");

        let mail = Mail::from_header("1", b"From: <>\r\n\r\n");
        assert_eq!(mail.from_display(), "<>");
    }
}
