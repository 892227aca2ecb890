//! POP3 capabilities discovered from the CAPA response (RFC 2449).

/// One capability line.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// TOP - Header retrieval
    Top,
    /// USER - USER/PASS login
    User,
    /// UIDL - Unique-id listing
    Uidl,
    /// STLS - TLS upgrade (RFC 2595)
    Stls,
    /// SASL - Authentication mechanisms
    Sasl(Vec<String>),
    /// PIPELINING - Command pipelining
    Pipelining,
    /// IMPLEMENTATION - Server software description
    Implementation(String),
    /// Unknown capability
    Unknown(String),
}

impl Capability {
    /// Parses one line of a CAPA listing.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let Some(keyword) = parts.next() else {
            return Self::Unknown(line.to_string());
        };

        match keyword.to_ascii_uppercase().as_str() {
            "TOP" => Self::Top,
            "USER" => Self::User,
            "UIDL" => Self::Uidl,
            "STLS" => Self::Stls,
            "SASL" => Self::Sasl(parts.map(str::to_ascii_uppercase).collect()),
            "PIPELINING" => Self::Pipelining,
            "IMPLEMENTATION" => Self::Implementation(parts.collect::<Vec<_>>().join(" ")),
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// The capability set of a server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities(Vec<Capability>);

impl Capabilities {
    /// Builds a set from the lines of a CAPA listing.
    #[must_use]
    pub fn from_lines<S: AsRef<str>>(lines: &[S]) -> Self {
        Self(
            lines
                .iter()
                .map(|line| line.as_ref().trim())
                .filter(|line| !line.is_empty())
                .map(Capability::parse)
                .collect(),
        )
    }

    /// Returns true if the capability is present.
    #[must_use]
    pub fn contains(&self, capability: &Capability) -> bool {
        self.0.contains(capability)
    }

    /// Returns true if UIDL is supported.
    #[must_use]
    pub fn supports_uidl(&self) -> bool {
        self.contains(&Capability::Uidl)
    }

    /// Returns true if USER/PASS login is supported.
    #[must_use]
    pub fn supports_user(&self) -> bool {
        self.contains(&Capability::User)
    }

    /// Returns true if STLS is supported.
    #[must_use]
    pub fn supports_stls(&self) -> bool {
        self.contains(&Capability::Stls)
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

    #[test]
    fn parse_keywords_case_insensitive() {
        assert_eq!(Capability::parse("UIDL"), Capability::Uidl);
        assert_eq!(Capability::parse("stls"), Capability::Stls);
        assert_eq!(Capability::parse("Top"), Capability::Top);
    }

    #[test]
    fn parse_sasl_mechanisms() {
        assert_eq!(
            Capability::parse("SASL plain CRAM-MD5"),
            Capability::Sasl(vec!["PLAIN".to_string(), "CRAM-MD5".to_string()])
        );
    }

    #[test]
    fn parse_implementation_and_unknown() {
        assert_eq!(
            Capability::parse("IMPLEMENTATION Shlemazle Plus"),
            Capability::Implementation("Shlemazle Plus".to_string())
        );
        assert_eq!(
            Capability::parse("EXPIRE 60"),
            Capability::Unknown("EXPIRE 60".to_string())
        );
    }

    #[test]
    fn capabilities_from_listing() {
        let caps = Capabilities::from_lines(&["TOP", "USER", "", "UIDL", "STLS"]);
        assert!(caps.supports_uidl());
        assert!(caps.supports_user());
        assert!(caps.supports_stls());
        assert_eq!(caps.iter().count(), 4);

        let bare = Capabilities::from_lines(&["TOP"]);
        assert!(!bare.supports_uidl());
        assert!(!bare.supports_stls());
    }
}
