//! Mailbox connection strings.
//!
//! `scheme://[user@]host[:port][/path][#fragment]` with scheme one of
//! `imap`, `imap+ssl`, `pop`, `pop+ssl`. User, path and fragment are
//! percent-decoded; decoding is byte-wise, so a multi-byte character is
//! always decoded (or encoded) as a whole. Escapes that do not form UTF-8
//! are read as windows-1252.
//!
//! ```
//! use mailwatch_core::Uri;
//!
//! let uri: Uri = "imap+ssl://alice%40example.com@mail.example.com/Archive".parse().unwrap();
//! assert_eq!(uri.user(), Some("alice@example.com"));
//! assert_eq!(uri.port(), 993);
//! assert_eq!(uri.path(), "Archive");
//! ```

use std::fmt::{self, Write as _};
use std::str::FromStr;

use thiserror::Error;

/// URI parse failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UriError {
    /// No `scheme://` prefix.
    #[error("missing scheme")]
    MissingScheme,
    /// Scheme other than imap, imap+ssl, pop, pop+ssl.
    #[error("unknown scheme: {0}")]
    UnknownScheme(String),
    /// Empty host.
    #[error("missing host")]
    EmptyHost,
    /// Port is not a number in 1..=65535.
    #[error("invalid port: {0}")]
    InvalidPort(String),
    /// `[` without a closing `]`.
    #[error("unterminated IPv6 address")]
    UnterminatedIpv6,
}

/// Access protocol and transport security.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    /// IMAP4, STARTTLS when offered.
    Imap,
    /// IMAP4 over implicit TLS.
    ImapSsl,
    /// POP3, STLS when offered.
    Pop,
    /// POP3 over implicit TLS.
    PopSsl,
}

impl Scheme {
    /// Returns the scheme as written in a URI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Imap => "imap",
            Self::ImapSsl => "imap+ssl",
            Self::Pop => "pop",
            Self::PopSsl => "pop+ssl",
        }
    }

    /// Returns the port used when the URI names none.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Imap => 143,
            Self::ImapSsl => 993,
            Self::Pop => 110,
            Self::PopSsl => 995,
        }
    }

    /// Returns true for the IMAP schemes.
    #[must_use]
    pub const fn is_imap(self) -> bool {
        matches!(self, Self::Imap | Self::ImapSsl)
    }

    /// Returns true if TLS starts before the protocol greeting.
    #[must_use]
    pub const fn is_implicit_tls(self) -> bool {
        matches!(self, Self::ImapSsl | Self::PopSsl)
    }
}

impl FromStr for Scheme {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "imap" => Ok(Self::Imap),
            "imap+ssl" => Ok(Self::ImapSsl),
            "pop" => Ok(Self::Pop),
            "pop+ssl" => Ok(Self::PopSsl),
            _ => Err(UriError::UnknownScheme(s.to_string())),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed mailbox URI.
///
/// Empty user and fragment parts are normalized to absent, so the canonical
/// string of a parsed URI parses back to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Uri {
    scheme: Scheme,
    user: Option<String>,
    host: String,
    port: Option<u16>,
    path: String,
    fragment: Option<String>,
}

impl Uri {
    /// Creates a URI with only a scheme and host.
    #[must_use]
    pub fn new(scheme: Scheme, host: impl Into<String>) -> Self {
        Self {
            scheme,
            user: None,
            host: host.into(),
            port: None,
            path: String::new(),
            fragment: None,
        }
    }

    /// Sets the user; an empty user means anonymous.
    #[must_use]
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into()).filter(|u| !u.is_empty());
        self
    }

    /// Sets an explicit port.
    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the path (IMAP folder).
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Sets the fragment.
    #[must_use]
    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into()).filter(|f| !f.is_empty());
        self
    }

    /// Returns the scheme.
    #[must_use]
    pub const fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Returns the decoded user, if any.
    #[must_use]
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Returns the host (IPv6 addresses without brackets).
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the port, falling back to the scheme's default.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// Returns the port only if the URI names one.
    #[must_use]
    pub const fn explicit_port(&self) -> Option<u16> {
        self.port
    }

    /// Returns the decoded path without its leading `/`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the decoded fragment, if any.
    #[must_use]
    pub fn fragment(&self) -> Option<&str> {
        self.fragment.as_deref()
    }

    /// Returns true for the POP3 mode that only reports mail new since the
    /// previous poll (`#recent`).
    #[must_use]
    pub fn is_recent_only(&self) -> bool {
        !self.scheme.is_imap()
            && self
                .fragment
                .as_deref()
                .is_some_and(|f| f.eq_ignore_ascii_case("recent"))
    }
}

impl FromStr for Uri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = s.split_once("://").ok_or(UriError::MissingScheme)?;
        let scheme: Scheme = scheme.parse()?;

        let (rest, fragment) = match rest.split_once('#') {
            Some((rest, fragment)) => (rest, Some(decode(fragment))),
            None => (rest, None),
        };
        let (authority, path) = match rest.split_once('/') {
            Some((authority, path)) => (authority, decode(path)),
            None => (rest, String::new()),
        };
        let (user, host_port) = match authority.rsplit_once('@') {
            Some((user, host_port)) => (Some(decode(user)), host_port),
            None => (None, authority),
        };

        let (host, port) = if let Some(bracketed) = host_port.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or(UriError::UnterminatedIpv6)?;
            let port = match after {
                "" => None,
                _ => Some(
                    after
                        .strip_prefix(':')
                        .ok_or_else(|| UriError::InvalidPort(after.to_string()))?,
                ),
            };
            (host, port)
        } else {
            match host_port.rsplit_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (host_port, None),
            }
        };

        let host = decode(host);
        if host.is_empty() {
            return Err(UriError::EmptyHost);
        }
        let port = match port.filter(|p| !p.is_empty()) {
            Some(port) => Some(
                port.parse::<u16>()
                    .ok()
                    .filter(|&p| p != 0)
                    .ok_or_else(|| UriError::InvalidPort(port.to_string()))?,
            ),
            None => None,
        };

        Ok(Self {
            scheme,
            user: user.filter(|u| !u.is_empty()),
            host,
            port,
            path,
            fragment: fragment.filter(|f| !f.is_empty()),
        })
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        if let Some(user) = &self.user {
            f.write_str(&encode(user, b""))?;
            f.write_char('@')?;
        }
        if self.host.contains(':') {
            write!(f, "[{}]", encode(&self.host, b":"))?;
        } else {
            f.write_str(&encode(&self.host, b""))?;
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        if !self.path.is_empty() {
            f.write_char('/')?;
            f.write_str(&encode(&self.path, b"/"))?;
        }
        if let Some(fragment) = &self.fragment {
            f.write_char('#')?;
            f.write_str(&encode(fragment, b""))?;
        }
        Ok(())
    }
}

/// Percent-encodes every byte outside the unreserved set and `keep`.
fn encode(text: &str, keep: &[u8]) -> String {
    let mut out = String::with_capacity(text.len());
    for &byte in text.as_bytes() {
        if byte.is_ascii_alphanumeric() || b"-._~".contains(&byte) || keep.contains(&byte) {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

/// Percent-decodes `text`. A `%` not followed by two hex digits is kept.
fn decode(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && let Some(byte) = bytes
                .get(i + 1..i + 3)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok())
        {
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    mailwatch_mime::charset::decode_raw(&out).into_owned()
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
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_parse_full() {
        let uri: Uri = "imap://bob@mail.example.com:1143/Lists/rust#x".parse().unwrap();
        assert_eq!(uri.scheme(), Scheme::Imap);
        assert_eq!(uri.user(), Some("bob"));
        assert_eq!(uri.host(), "mail.example.com");
        assert_eq!(uri.port(), 1143);
        assert_eq!(uri.explicit_port(), Some(1143));
        assert_eq!(uri.path(), "Lists/rust");
        assert_eq!(uri.fragment(), Some("x"));
    }

    #[test]
    fn test_default_ports() {
        for (text, port) in [
            ("imap://h", 143),
            ("imap+ssl://h", 993),
            ("pop://h", 110),
            ("pop+ssl://h", 995),
        ] {
            let uri: Uri = text.parse().unwrap();
            assert_eq!(uri.port(), port, "{text}");
            assert_eq!(uri.explicit_port(), None);
        }
    }

    #[test]
    fn test_anonymous_and_empty_parts() {
        let uri: Uri = "pop://@pop.example.com:/#".parse().unwrap();
        assert_eq!(uri.user(), None);
        assert_eq!(uri.explicit_port(), None);
        assert_eq!(uri.path(), "");
        assert_eq!(uri.fragment(), None);
        assert_eq!(uri.to_string(), "pop://pop.example.com");
    }

    #[test]
    fn test_user_with_at_sign() {
        let uri: Uri = "imap+ssl://alice@example.com@mail.example.com".parse().unwrap();
        assert_eq!(uri.user(), Some("alice@example.com"));
        assert_eq!(uri.host(), "mail.example.com");
        assert_eq!(
            uri.to_string(),
            "imap+ssl://alice%40example.com@mail.example.com"
        );
    }

    #[test]
    fn test_ipv6_host() {
        let uri: Uri = "imap://user@[::1]:1430/".parse().unwrap();
        assert_eq!(uri.host(), "::1");
        assert_eq!(uri.port(), 1430);
        assert_eq!(uri.to_string(), "imap://user@[::1]:1430");

        let uri: Uri = "pop+ssl://[2001:db8::2]".parse().unwrap();
        assert_eq!(uri.host(), "2001:db8::2");
        assert_eq!(uri.port(), 995);
        assert_eq!(uri.to_string(), "pop+ssl://[2001:db8::2]");
    }

    #[test]
    fn test_multibyte_percent_encoding() {
        let uri: Uri = "imap://j%C3%BCrgen@h/Entw%C3%BCrfe".parse().unwrap();
        assert_eq!(uri.user(), Some("jürgen"));
        assert_eq!(uri.path(), "Entwürfe");
        assert_eq!(uri.to_string(), "imap://j%C3%BCrgen@h/Entw%C3%BCrfe");

        // a lone Latin-1 escape is read as windows-1252
        let uri: Uri = "imap://h/Entw%FCrfe".parse().unwrap();
        assert_eq!(uri.path(), "Entwürfe");

        // stray percent signs survive
        let uri: Uri = "imap://h/100%".parse().unwrap();
        assert_eq!(uri.path(), "100%");
        assert_eq!(uri.to_string(), "imap://h/100%25");
    }

    #[test]
    fn test_recent_only_is_pop3() {
        let pop: Uri = "pop://u@h#recent".parse().unwrap();
        assert!(pop.is_recent_only());
        let imap: Uri = "imap://u@h#recent".parse().unwrap();
        assert!(!imap.is_recent_only());
        let plain: Uri = "pop+ssl://u@h".parse().unwrap();
        assert!(!plain.is_recent_only());
    }

    #[test]
    fn test_errors() {
        assert_eq!("mail.example.com".parse::<Uri>(), Err(UriError::MissingScheme));
        assert_eq!(
            "smtp://h".parse::<Uri>(),
            Err(UriError::UnknownScheme("smtp".to_string()))
        );
        assert_eq!("imap://user@".parse::<Uri>(), Err(UriError::EmptyHost));
        assert_eq!(
            "imap://h:99999".parse::<Uri>(),
            Err(UriError::InvalidPort("99999".to_string()))
        );
        assert_eq!(
            "imap://h:0".parse::<Uri>(),
            Err(UriError::InvalidPort("0".to_string()))
        );
        assert_eq!("imap://[::1".parse::<Uri>(), Err(UriError::UnterminatedIpv6));
        assert!(matches!(
            "imap://[::1]x".parse::<Uri>(),
            Err(UriError::InvalidPort(_))
        ));
    }

    #[test]
    fn test_scheme_case_insensitive() {
        let uri: Uri = "IMAP+SSL://h".parse().unwrap();
        assert_eq!(uri.scheme(), Scheme::ImapSsl);
        assert_eq!(uri.to_string(), "imap+ssl://h");
    }

    fn scheme() -> impl Strategy<Value = Scheme> {
        prop_oneof![
            Just(Scheme::Imap),
            Just(Scheme::ImapSsl),
            Just(Scheme::Pop),
            Just(Scheme::PopSsl),
        ]
    }

    proptest! {
        #[test]
        fn canonical_string_parses_back(
            scheme in scheme(),
            user in "[a-zA-Z0-9@:%#/ éü]{0,10}",
            host in "[a-z]{1,10}(\\.[a-z]{2,3})?",
            port in proptest::option::of(1u16..),
            path in "[A-Za-z0-9/ #@ü&-]{0,12}",
            fragment in "[a-z#%]{0,6}",
        ) {
            let mut uri = Uri::new(scheme, host)
                .with_user(user)
                .with_path(path)
                .with_fragment(fragment);
            if let Some(port) = port {
                uri = uri.with_port(port);
            }

            let text = uri.to_string();
            let parsed: Uri = text.parse().unwrap();
            prop_assert_eq!(&parsed, &uri);
            prop_assert_eq!(parsed.to_string(), text);
        }
    }
}
