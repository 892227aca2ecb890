//! Connection configuration types.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Default time allowed for establishing a TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default time allowed for a single read or write.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeouts applied by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Connection (and TLS handshake) timeout.
    pub connect: Duration,
    /// Read/write timeout.
    pub io: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            io: DEFAULT_IO_TIMEOUT,
        }
    }
}

impl Timeouts {
    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect = timeout;
        self
    }

    /// Sets the I/O timeout.
    #[must_use]
    pub const fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io = timeout;
        self
    }
}

/// Address family preference used when resolving a host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Domain {
    /// Try every resolved address.
    #[default]
    Any,
    /// IPv4 addresses only.
    V4,
    /// IPv6 addresses only.
    V6,
}

impl Domain {
    /// Returns true if `addr` belongs to this family.
    #[must_use]
    pub const fn accepts(self, addr: &SocketAddr) -> bool {
        match self {
            Self::Any => true,
            Self::V4 => addr.is_ipv4(),
            Self::V6 => addr.is_ipv6(),
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Any => "any",
            Self::V4 => "ipv4",
            Self::V6 => "ipv6",
        })
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "any" => Ok(Self::Any),
            "4" | "v4" | "ipv4" => Ok(Self::V4),
            "6" | "v6" | "ipv6" => Ok(Self::V6),
            other => Err(format!("unknown address family {other:?}")),
        }
    }
}

/// Certificate verification strictness.
///
/// - `0`: full verification
/// - `1`: also accept revoked certificates and certificates issued for
///   another usage
/// - `2`: additionally accept expired or not yet valid certificates and
///   unknown issuers
///
/// The host name is always checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct VerifyLevel(u8);

impl VerifyLevel {
    /// Full verification.
    pub const STRICT: Self = Self(0);
    /// The most permissive level.
    pub const MAX: Self = Self(2);

    /// Creates a level, rejecting values above [`VerifyLevel::MAX`].
    #[must_use]
    pub const fn new(level: u8) -> Option<Self> {
        if level <= Self::MAX.0 {
            Some(Self(level))
        } else {
            None
        }
    }

    /// Returns the numeric level.
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
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
    fn test_default_timeouts() {
        let timeouts = Timeouts::default();
        assert_eq!(timeouts.connect, Duration::from_secs(30));
        assert_eq!(timeouts.io, Duration::from_secs(60));
    }

    #[test]
    fn test_timeouts_builder() {
        let timeouts = Timeouts::default()
            .connect_timeout(Duration::from_secs(5))
            .io_timeout(Duration::from_millis(250));
        assert_eq!(timeouts.connect, Duration::from_secs(5));
        assert_eq!(timeouts.io, Duration::from_millis(250));
    }

    #[test]
    fn test_domain_accepts() {
        let v4: SocketAddr = "127.0.0.1:143".parse().unwrap();
        let v6: SocketAddr = "[::1]:143".parse().unwrap();
        assert!(Domain::Any.accepts(&v4) && Domain::Any.accepts(&v6));
        assert!(Domain::V4.accepts(&v4) && !Domain::V4.accepts(&v6));
        assert!(Domain::V6.accepts(&v6) && !Domain::V6.accepts(&v4));
    }

    #[test]
    fn test_domain_from_str() {
        assert_eq!("IPv6".parse::<Domain>().unwrap(), Domain::V6);
        assert_eq!("4".parse::<Domain>().unwrap(), Domain::V4);
        assert_eq!("".parse::<Domain>().unwrap(), Domain::Any);
        assert!("ipx".parse::<Domain>().is_err());
    }

    #[test]
    fn test_verify_level_bounds() {
        assert_eq!(VerifyLevel::new(0), Some(VerifyLevel::STRICT));
        assert_eq!(VerifyLevel::new(2), Some(VerifyLevel::MAX));
        assert_eq!(VerifyLevel::new(3), None);
        assert_eq!(VerifyLevel::default().get(), 0);
    }
}
