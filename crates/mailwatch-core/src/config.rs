//! Configuration file model.
//!
//! ```json
//! {
//!   "period_secs": 300,
//!   "tick_secs": 5,
//!   "mailboxes": [
//!     { "name": "work", "uri": "imap+ssl://alice@imap.example.com/INBOX",
//!       "password_env": "WORK_PASSWORD", "domain": "any", "verify": 0 }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use mailwatch_net::{Domain, VerifyLevel};
use serde::{Deserialize, Serialize};

use crate::mailbox::{DEFAULT_PERIOD, Mailbox, Password};
use crate::uri::{Uri, UriError};
use crate::{Error, Result};

/// Default scheduler tick in seconds.
pub const DEFAULT_TICK_SECS: u64 = 5;

const fn default_period_secs() -> u64 {
    DEFAULT_PERIOD.as_secs()
}

const fn default_tick_secs() -> u64 {
    DEFAULT_TICK_SECS
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Polling period applied to mailboxes that set none.
    #[serde(default = "default_period_secs")]
    pub period_secs: u64,
    /// How often the scheduler checks for due mailboxes.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    /// Accounts to watch.
    #[serde(default)]
    pub mailboxes: Vec<MailboxConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            period_secs: default_period_secs(),
            tick_secs: default_tick_secs(),
            mailboxes: Vec::new(),
        }
    }
}

/// One account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MailboxConfig {
    /// Account name, unique within the file.
    pub name: String,
    /// Connection URI.
    pub uri: String,
    /// Password in clear.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Environment variable holding the password.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,
    /// Address family: `any`, `ipv4` or `ipv6`.
    #[serde(default)]
    pub domain: String,
    /// Certificate verification level, 0 (strict) to 2.
    #[serde(default)]
    pub verify: u8,
    /// Polling period overriding the global one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_secs: Option<u64>,
}

// Manual Debug implementation to keep the password out of logs
impl fmt::Debug for MailboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxConfig")
            .field("name", &self.name)
            .field("uri", &self.uri)
            .field("password_env", &self.password_env)
            .field("domain", &self.domain)
            .field("verify", &self.verify)
            .field("period_secs", &self.period_secs)
            .finish_non_exhaustive()
    }
}

/// A problem found while validating the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The global period is zero.
    ZeroPeriod,
    /// The tick is zero.
    ZeroTick,
    /// A mailbox has no name.
    EmptyName,
    /// Two mailboxes share a name.
    DuplicateName(String),
    /// A mailbox URI does not parse.
    InvalidUri {
        /// Mailbox name.
        name: String,
        /// Parse failure.
        error: UriError,
    },
    /// Unknown address family.
    InvalidDomain {
        /// Mailbox name.
        name: String,
        /// The value given.
        domain: String,
    },
    /// Verification level above the maximum.
    InvalidVerify {
        /// Mailbox name.
        name: String,
        /// The value given.
        verify: u8,
    },
    /// Both `password` and `password_env` are set.
    AmbiguousPassword(String),
    /// A mailbox period is zero.
    ZeroMailboxPeriod(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ZeroPeriod => f.write_str("period_secs must be positive"),
            Self::ZeroTick => f.write_str("tick_secs must be positive"),
            Self::EmptyName => f.write_str("mailbox name is required"),
            Self::DuplicateName(name) => write!(f, "{name}: duplicate mailbox name"),
            Self::InvalidUri { name, error } => write!(f, "{name}: {error}"),
            Self::InvalidDomain { name, domain } => {
                write!(f, "{name}: unknown address family {domain:?}")
            }
            Self::InvalidVerify { name, verify } => write!(
                f,
                "{name}: verify must be 0-{}, got {verify}",
                VerifyLevel::MAX.get()
            ),
            Self::AmbiguousPassword(name) => {
                write!(f, "{name}: set either password or password_env, not both")
            }
            Self::ZeroMailboxPeriod(name) => write!(f, "{name}: period_secs must be positive"),
        }
    }
}

impl std::error::Error for ValidationError {}

impl Config {
    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::parse(&text)
    }

    /// Parses a JSON configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not a valid configuration.
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Returns the scheduler tick.
    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    /// Checks every setting and returns all problems found.
    ///
    /// # Errors
    ///
    /// Returns every [`ValidationError`] found.
    pub fn validate(&self) -> std::result::Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if self.period_secs == 0 {
            errors.push(ValidationError::ZeroPeriod);
        }
        if self.tick_secs == 0 {
            errors.push(ValidationError::ZeroTick);
        }

        let mut names = HashSet::new();
        for mailbox in &self.mailboxes {
            let name = mailbox.name.trim();
            if name.is_empty() {
                errors.push(ValidationError::EmptyName);
            } else if !names.insert(name) {
                errors.push(ValidationError::DuplicateName(name.to_string()));
            }

            if let Err(error) = mailbox.uri.parse::<Uri>() {
                errors.push(ValidationError::InvalidUri {
                    name: name.to_string(),
                    error,
                });
            }
            if mailbox.domain.parse::<Domain>().is_err() {
                errors.push(ValidationError::InvalidDomain {
                    name: name.to_string(),
                    domain: mailbox.domain.clone(),
                });
            }
            if VerifyLevel::new(mailbox.verify).is_none() {
                errors.push(ValidationError::InvalidVerify {
                    name: name.to_string(),
                    verify: mailbox.verify,
                });
            }
            if mailbox.password.is_some() && mailbox.password_env.is_some() {
                errors.push(ValidationError::AmbiguousPassword(name.to_string()));
            }
            if mailbox.period_secs == Some(0) {
                errors.push(ValidationError::ZeroMailboxPeriod(name.to_string()));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Validates the configuration and builds the mailboxes, reading
    /// passwords from the environment where configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every validation problem, or naming
    /// a password variable that is not set.
    pub fn into_mailboxes(self) -> Result<Vec<Arc<Mailbox>>> {
        if let Err(errors) = self.validate() {
            let list: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(Error::Config(list.join("; ")));
        }

        let period = self.period_secs;
        self.mailboxes
            .into_iter()
            .map(|config| config.into_mailbox(period).map(Arc::new))
            .collect()
    }
}

impl MailboxConfig {
    fn into_mailbox(self, default_period: u64) -> Result<Mailbox> {
        let password = match (self.password, &self.password_env) {
            (Some(password), _) => Password::new(password),
            (None, Some(var)) => std::env::var(var).map(Password::new).map_err(|_| {
                Error::Config(format!("{}: environment variable {var} is not set", self.name))
            })?,
            (None, None) => Password::default(),
        };
        let domain = self.domain.parse::<Domain>().map_err(Error::Config)?;
        let verify = VerifyLevel::new(self.verify)
            .ok_or_else(|| Error::Config(format!("{}: invalid verify level", self.name)))?;
        let period = Duration::from_secs(self.period_secs.unwrap_or(default_period));

        Ok(Mailbox::new(self.name.trim(), self.uri.parse()?, password)
            .with_domain(domain)
            .with_verify(verify)
            .with_period(period))
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

    const SAMPLE: &str = r#"{
        "period_secs": 120,
        "mailboxes": [
            { "name": "work", "uri": "imap+ssl://alice@imap.example.com/INBOX",
              "password": "hunter2", "domain": "ipv6", "verify": 1 },
            { "name": "home", "uri": "pop://bob@pop.example.com#recent",
              "period_secs": 600 }
        ]
    }"#;

    #[test]
    fn test_parse_defaults() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(config.period_secs, 120);
        assert_eq!(config.tick_secs, DEFAULT_TICK_SECS);
        assert_eq!(config.mailboxes.len(), 2);
        assert_eq!(config.mailboxes[1].domain, "");
        assert_eq!(config.mailboxes[1].verify, 0);
        assert!(config.validate().is_ok());
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn test_into_mailboxes() {
        let mailboxes = Config::parse(SAMPLE).unwrap().into_mailboxes().unwrap();
        let work = &mailboxes[0];
        assert_eq!(work.name(), "work");
        assert_eq!(work.password().expose(), "hunter2");
        assert_eq!(work.domain(), Domain::V6);
        assert_eq!(work.verify().get(), 1);
        assert_eq!(work.period(), Duration::from_secs(120));

        let home = &mailboxes[1];
        assert!(home.uri().is_recent_only());
        assert_eq!(home.password().expose(), "");
        assert_eq!(home.period(), Duration::from_secs(600));
    }

    #[test]
    fn test_validation_collects_all() {
        let config = Config::parse(
            r#"{
                "tick_secs": 0,
                "mailboxes": [
                    { "name": "a", "uri": "smtp://host" },
                    { "name": "a", "uri": "imap://host", "verify": 3, "domain": "ipx" },
                    { "name": " ", "uri": "pop://host", "password": "x", "password_env": "Y" }
                ]
            }"#,
        )
        .unwrap();

        let errors = config.validate().unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::ZeroTick,
                ValidationError::InvalidUri {
                    name: "a".into(),
                    error: UriError::UnknownScheme("smtp".into()),
                },
                ValidationError::DuplicateName("a".into()),
                ValidationError::InvalidDomain {
                    name: "a".into(),
                    domain: "ipx".into(),
                },
                ValidationError::InvalidVerify {
                    name: "a".into(),
                    verify: 3,
                },
                ValidationError::EmptyName,
                ValidationError::AmbiguousPassword(String::new()),
            ]
        );
        assert_eq!(errors[4].to_string(), "a: verify must be 0-2, got 3");
        assert!(matches!(config.into_mailboxes(), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(Config::parse(r#"{ "periodsecs": 1 }"#).is_err());
    }

    #[test]
    fn test_password_env() {
        let config = Config::parse(
            r#"{ "mailboxes": [ { "name": "m", "uri": "imap://h", "password_env": "PATH" } ] }"#,
        )
        .unwrap();
        let mailboxes = config.into_mailboxes().unwrap();
        assert_eq!(
            mailboxes[0].password().expose(),
            std::env::var("PATH").unwrap()
        );

        let config = Config::parse(
            r#"{ "mailboxes": [ { "name": "m", "uri": "imap://h",
                 "password_env": "MAILWATCH_SURELY_UNSET_VARIABLE" } ] }"#,
        )
        .unwrap();
        assert!(matches!(config.into_mailboxes(), Err(Error::Config(_))));
    }
}
