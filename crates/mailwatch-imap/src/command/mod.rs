//! IMAP command builder.
//!
//! Only the commands a read-only new-mail check needs are modelled.

mod serialize;
mod tag_generator;

pub use tag_generator::{TAG_SPACE, TagGenerator};

use serialize::{is_quotable, write_astring};

use crate::{Error, Result};

/// Header fields fetched for every new message.
pub const HEADER_FIELDS: &str = "SUBJECT FROM DATE";

/// IMAP command.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPABILITY command.
    Capability,
    /// NOOP command.
    Noop,
    /// LOGOUT command.
    Logout,
    /// STARTTLS command.
    StartTls,
    /// LOGIN command.
    Login {
        /// Username.
        username: String,
        /// Password.
        password: String,
    },
    /// EXAMINE command (read-only SELECT). The name must already be
    /// modified UTF-7 encoded.
    Examine {
        /// Mailbox to examine.
        mailbox: String,
    },
    /// `UID SEARCH UNSEEN`.
    SearchUnseen,
    /// `UID FETCH <uid> BODY.PEEK[HEADER.FIELDS (SUBJECT FROM DATE)]`.
    FetchHeaders {
        /// Message UID.
        uid: u32,
    },
    /// IDLE command.
    Idle,
    /// DONE (to end IDLE).
    Done,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted(""))
    }
}

impl Command {
    /// Serializes the command to bytes with the given tag.
    #[must_use]
    pub fn serialize(&self, tag: &str) -> Vec<u8> {
        let mut buf = Vec::new();

        // DONE doesn't get a tag (it's sent during IDLE)
        if !matches!(self, Self::Done) {
            buf.extend_from_slice(tag.as_bytes());
            buf.push(b' ');
        }

        match self {
            Self::Capability => buf.extend_from_slice(b"CAPABILITY"),
            Self::Noop => buf.extend_from_slice(b"NOOP"),
            Self::Logout => buf.extend_from_slice(b"LOGOUT"),
            Self::StartTls => buf.extend_from_slice(b"STARTTLS"),

            Self::Login { username, password } => {
                buf.extend_from_slice(b"LOGIN");
                write_astring(&mut buf, username);
                write_astring(&mut buf, password);
            }

            Self::Examine { mailbox } => {
                buf.extend_from_slice(b"EXAMINE");
                write_astring(&mut buf, mailbox);
            }

            Self::SearchUnseen => buf.extend_from_slice(b"UID SEARCH UNSEEN"),

            Self::FetchHeaders { uid } => {
                buf.extend_from_slice(
                    format!("UID FETCH {uid} BODY.PEEK[HEADER.FIELDS ({HEADER_FIELDS})]")
                        .as_bytes(),
                );
            }

            Self::Idle => buf.extend_from_slice(b"IDLE"),
            Self::Done => buf.extend_from_slice(b"DONE"),
        }

        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Checks that every argument can be sent as an IMAP string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] naming the argument that holds a
    /// CR, LF or NUL; its value is not included.
    pub fn check(&self) -> Result<()> {
        let invalid = match self {
            Self::Login { username, .. } if !is_quotable(username) => Some("username"),
            Self::Login { password, .. } if !is_quotable(password) => Some("password"),
            Self::Examine { mailbox } if !is_quotable(mailbox) => Some("mailbox"),
            _ => None,
        };
        invalid.map_or(Ok(()), |name| Err(Error::InvalidArgument(name)))
    }

    /// Renders the command for logs, with credentials replaced.
    #[must_use]
    pub fn redacted(&self, tag: &str) -> String {
        match self {
            Self::Login { username, .. } => {
                let mut buf = format!("{tag} LOGIN").into_bytes();
                write_astring(&mut buf, username);
                buf.extend_from_slice(b" <redacted>");
                String::from_utf8_lossy(&buf).trim_start().to_string()
            }
            _ => {
                let line = self.serialize(tag);
                String::from_utf8_lossy(&line).trim().to_string()
            }
        }
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

    #[test]
    fn test_capability_command() {
        let cmd = Command::Capability;
        assert_eq!(cmd.serialize("A001"), b"A001 CAPABILITY\r\n");
    }

    #[test]
    fn test_login_command() {
        let cmd = Command::Login {
            username: "user".to_string(),
            password: "pass".to_string(),
        };
        assert_eq!(cmd.serialize("A001"), b"A001 LOGIN user pass\r\n");
    }

    #[test]
    fn test_login_quoted() {
        let cmd = Command::Login {
            username: "user@example.com".to_string(),
            password: "pass word".to_string(),
        };
        assert_eq!(
            cmd.serialize("A001"),
            b"A001 LOGIN user@example.com \"pass word\"\r\n"
        );
    }

    #[test]
    fn test_login_anonymous_empty_password() {
        let cmd = Command::Login {
            username: "ANONYMOUS".to_string(),
            password: String::new(),
        };
        assert_eq!(cmd.serialize("AB12"), b"AB12 LOGIN ANONYMOUS \"\"\r\n");
    }

    #[test]
    fn test_login_is_redacted() {
        let cmd = Command::Login {
            username: "user".to_string(),
            password: "hunter2".to_string(),
        };
        let shown = cmd.redacted("A001");
        assert_eq!(shown, "A001 LOGIN user <redacted>");
        assert!(!format!("{cmd:?}").contains("hunter2"));
    }

    #[test]
    fn test_examine_command() {
        let cmd = Command::Examine {
            mailbox: "INBOX".to_string(),
        };
        assert_eq!(cmd.serialize("A001"), b"A001 EXAMINE INBOX\r\n");

        let cmd = Command::Examine {
            mailbox: "Sent Items".to_string(),
        };
        assert_eq!(cmd.serialize("A001"), b"A001 EXAMINE \"Sent Items\"\r\n");
    }

    #[test]
    fn test_search_command() {
        assert_eq!(
            Command::SearchUnseen.serialize("A001"),
            b"A001 UID SEARCH UNSEEN\r\n"
        );
    }

    #[test]
    fn test_fetch_headers_command() {
        let cmd = Command::FetchHeaders { uid: 4821 };
        assert_eq!(
            cmd.serialize("A001"),
            b"A001 UID FETCH 4821 BODY.PEEK[HEADER.FIELDS (SUBJECT FROM DATE)]\r\n"
        );
    }

    #[test]
    fn test_idle_command() {
        assert_eq!(Command::Idle.serialize("A001"), b"A001 IDLE\r\n");
    }

    #[test]
    fn test_done_command() {
        assert_eq!(Command::Done.serialize(""), b"DONE\r\n");
        assert_eq!(Command::Done.serialize("A001"), b"DONE\r\n");
    }
}
