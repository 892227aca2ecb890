//! POP3 command builder (RFC 1939, RFC 2449, RFC 2595).

use std::fmt;

/// POP3 command.
#[derive(Clone, PartialEq, Eq)]
pub enum Command {
    /// CAPA - List capabilities
    Capa,
    /// STLS - Upgrade to TLS
    Stls,
    /// USER - Name the mailbox
    User {
        /// Mailbox name
        username: String,
    },
    /// PASS - Authenticate
    Pass {
        /// Password
        password: String,
    },
    /// UIDL - Unique-id listing for every message
    Uidl,
    /// TOP - Headers plus the first lines of the body
    Top {
        /// Message number
        message: u32,
        /// Body lines to include
        lines: u32,
    },
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command to bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = self.line().into_bytes();
        buf.extend_from_slice(b"\r\n");
        buf
    }

    /// Returns the command line with the password masked, for logging.
    #[must_use]
    pub fn redacted(&self) -> String {
        match self {
            Self::Pass { .. } => "PASS <redacted>".to_string(),
            _ => self.line(),
        }
    }

    /// Returns true if the reply to this command is a multi-line listing.
    #[must_use]
    pub const fn is_multiline(&self) -> bool {
        matches!(self, Self::Capa | Self::Uidl | Self::Top { .. })
    }

    fn line(&self) -> String {
        match self {
            Self::Capa => "CAPA".to_string(),
            Self::Stls => "STLS".to_string(),
            Self::User { username } => format!("USER {username}"),
            Self::Pass { password } => format!("PASS {password}"),
            Self::Uidl => "UIDL".to_string(),
            Self::Top { message, lines } => format!("TOP {message} {lines}"),
            Self::Quit => "QUIT".to_string(),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
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
    fn test_simple_commands() {
        assert_eq!(Command::Capa.serialize(), b"CAPA\r\n");
        assert_eq!(Command::Stls.serialize(), b"STLS\r\n");
        assert_eq!(Command::Uidl.serialize(), b"UIDL\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
    }

    #[test]
    fn test_user_pass() {
        let user = Command::User {
            username: "alice".to_string(),
        };
        assert_eq!(user.serialize(), b"USER alice\r\n");

        let pass = Command::Pass {
            password: "open sesame".to_string(),
        };
        assert_eq!(pass.serialize(), b"PASS open sesame\r\n");
    }

    #[test]
    fn test_top() {
        let cmd = Command::Top {
            message: 3,
            lines: 0,
        };
        assert_eq!(cmd.serialize(), b"TOP 3 0\r\n");
        assert!(cmd.is_multiline());
        assert!(!Command::Stls.is_multiline());
    }

    #[test]
    fn test_password_never_shown() {
        let pass = Command::Pass {
            password: "hunter2".to_string(),
        };
        assert_eq!(pass.redacted(), "PASS <redacted>");
        assert!(!format!("{pass:?}").contains("hunter2"));
        assert_eq!(
            Command::User {
                username: "bob".to_string()
            }
            .redacted(),
            "USER bob"
        );
    }
}
