//! Session configuration types.

use mailwatch_net::VerifyLevel;

/// POP3 session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Server hostname, used to verify the certificate after STLS.
    pub host: String,
    /// Certificate verification strictness.
    pub verify: VerifyLevel,
    /// Upgrade a plaintext session with STLS when the server offers it.
    pub stls: bool,
}

impl Config {
    /// Creates a configuration with strict verification and opportunistic
    /// STLS.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            verify: VerifyLevel::STRICT,
            stls: true,
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder {
            config: Self::new(host),
        }
    }
}

/// Builder for session configuration.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Sets the certificate verification level.
    #[must_use]
    pub const fn verify(mut self, level: VerifyLevel) -> Self {
        self.config.verify = level;
        self
    }

    /// Enables or disables the STLS upgrade.
    #[must_use]
    pub const fn stls(mut self, enabled: bool) -> Self {
        self.config.stls = enabled;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }
}
