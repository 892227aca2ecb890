//! Session configuration types.

use mailwatch_net::VerifyLevel;

/// IMAP session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server hostname, used to verify the certificate after STARTTLS.
    pub host: String,
    /// Certificate verification strictness.
    pub verify: VerifyLevel,
    /// Upgrade a plaintext session with STARTTLS when the server offers it.
    pub starttls: bool,
}

impl Config {
    /// Creates a configuration with strict verification and opportunistic
    /// STARTTLS.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            verify: VerifyLevel::STRICT,
            starttls: true,
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(host)
    }
}

/// Builder for session configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            config: Config::new(host),
        }
    }

    /// Sets the certificate verification level.
    #[must_use]
    pub const fn verify(mut self, level: VerifyLevel) -> Self {
        self.config.verify = level;
        self
    }

    /// Enables or disables the STARTTLS upgrade.
    #[must_use]
    pub const fn starttls(mut self, enabled: bool) -> Self {
        self.config.starttls = enabled;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        self.config
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
    fn test_config_new() {
        let config = Config::new("imap.example.com");
        assert_eq!(config.host, "imap.example.com");
        assert_eq!(config.verify, VerifyLevel::STRICT);
        assert!(config.starttls);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder("imap.example.com")
            .verify(VerifyLevel::MAX)
            .starttls(false)
            .build();

        assert_eq!(config.verify, VerifyLevel::MAX);
        assert!(!config.starttls);
    }
}
