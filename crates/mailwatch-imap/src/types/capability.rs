//! Server capabilities and response status.

/// Response status from a tagged or untagged status response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
    /// Server greeting (pre-authenticated).
    PreAuth,
    /// Server is closing connection.
    Bye,
}

impl Status {
    /// Parses a response kind into a status.
    #[must_use]
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.to_ascii_uppercase().as_str() {
            "OK" => Some(Self::Ok),
            "NO" => Some(Self::No),
            "BAD" => Some(Self::Bad),
            "PREAUTH" => Some(Self::PreAuth),
            "BYE" => Some(Self::Bye),
            _ => None,
        }
    }

    /// Returns true if this is a successful status.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }
}

/// Server capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4` (RFC 1730)
    Imap4,
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// `IMAP4rev2` (RFC 9051)
    Imap4Rev2,
    /// IDLE command support (RFC 2177)
    Idle,
    /// STARTTLS support
    StartTls,
    /// LOGIN disabled
    LoginDisabled,
    /// AUTH mechanism
    Auth(String),
    /// Unknown capability
    Unknown(String),
}

impl Capability {
    /// Parses a capability string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4" => Self::Imap4,
            "IMAP4REV1" => Self::Imap4Rev1,
            "IMAP4REV2" => Self::Imap4Rev2,
            "IDLE" => Self::Idle,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            _ if upper.starts_with("AUTH=") => Self::Auth(s[5..].to_string()),
            _ => Self::Unknown(s.to_string()),
        }
    }

    /// Returns true for any IMAP4 protocol revision.
    #[must_use]
    pub const fn is_imap4(&self) -> bool {
        matches!(self, Self::Imap4 | Self::Imap4Rev1 | Self::Imap4Rev2)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4 => write!(f, "IMAP4"),
            Self::Imap4Rev1 => write!(f, "IMAP4rev1"),
            Self::Imap4Rev2 => write!(f, "IMAP4rev2"),
            Self::Idle => write!(f, "IDLE"),
            Self::StartTls => write!(f, "STARTTLS"),
            Self::LoginDisabled => write!(f, "LOGINDISABLED"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// Capability list announced by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(Vec<Capability>);

impl Capabilities {
    /// Parses a whitespace separated capability list.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        Self(list.split_ascii_whitespace().map(Capability::parse).collect())
    }

    /// Returns true if nothing has been announced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks if the server has a specific capability.
    #[must_use]
    pub fn contains(&self, cap: &Capability) -> bool {
        self.0.contains(cap)
    }

    /// Returns true if any IMAP4 revision is advertised.
    #[must_use]
    pub fn supports_imap4(&self) -> bool {
        self.0.iter().any(Capability::is_imap4)
    }

    /// Returns true if the server supports IDLE (RFC 2177).
    #[must_use]
    pub fn supports_idle(&self) -> bool {
        self.contains(&Capability::Idle)
    }

    /// Returns true if STARTTLS is offered.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.contains(&Capability::StartTls)
    }

    /// Returns true if LOGIN is refused.
    #[must_use]
    pub fn login_disabled(&self) -> bool {
        self.contains(&Capability::LoginDisabled)
    }

    /// Iterates over the capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.0.iter()
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

    mod status_tests {
        use super::*;

        #[test]
        fn parse_status() {
            assert_eq!(Status::parse("ok"), Some(Status::Ok));
            assert_eq!(Status::parse("PREAUTH"), Some(Status::PreAuth));
            assert_eq!(Status::parse("BYE"), Some(Status::Bye));
            assert_eq!(Status::parse("EXISTS"), None);
        }

        #[test]
        fn is_ok() {
            assert!(Status::Ok.is_ok());
            assert!(Status::PreAuth.is_ok());
            assert!(!Status::No.is_ok());
            assert!(!Status::Bad.is_ok());
            assert!(!Status::Bye.is_ok());
        }
    }

    mod capability_parse_tests {
        use super::*;

        #[test]
        fn parse_revisions() {
            assert_eq!(Capability::parse("IMAP4"), Capability::Imap4);
            assert_eq!(Capability::parse("imap4rev1"), Capability::Imap4Rev1);
            assert_eq!(Capability::parse("IMAP4rev2"), Capability::Imap4Rev2);
            assert!(Capability::parse("IMAP4rev1").is_imap4());
            assert!(!Capability::parse("IMAP5").is_imap4());
        }

        #[test]
        fn parse_auth() {
            let cap = Capability::parse("AUTH=PLAIN");
            assert_eq!(cap, Capability::Auth("PLAIN".to_string()));
            assert_eq!(cap.to_string(), "AUTH=PLAIN");
        }

        #[test]
        fn parse_unknown() {
            let cap = Capability::parse("XSOMETHING");
            assert_eq!(cap, Capability::Unknown("XSOMETHING".to_string()));
        }
    }

    #[test]
    fn test_capability_list() {
        let caps = Capabilities::parse("IMAP4rev1 IDLE STARTTLS LOGINDISABLED AUTH=PLAIN");
        assert!(caps.supports_imap4());
        assert!(caps.supports_idle());
        assert!(caps.supports_starttls());
        assert!(caps.login_disabled());
        assert_eq!(caps.iter().count(), 5);
    }

    #[test]
    fn test_empty_list() {
        let caps = Capabilities::parse("   ");
        assert!(caps.is_empty());
        assert!(!caps.supports_imap4());
    }
}
