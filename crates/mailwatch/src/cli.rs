//! Command line arguments.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

/// Watches IMAP and POP3 mailboxes and reports new mail.
#[derive(Parser, Debug)]
#[command(name = "mailwatch", version, about)]
pub struct Cli {
    /// Configuration file (default: `<config dir>/mailwatch/config.json`).
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Fetch every mailbox once, print the results and exit.
    #[arg(long)]
    pub once: bool,

    /// Ignore-list file (default: `<data dir>/mailwatch/ignore.json`).
    #[arg(long, value_name = "PATH")]
    pub store: Option<PathBuf>,
}

impl Cli {
    /// Returns the configuration path, falling back to the platform default.
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => dirs::config_dir()
                .map(|dir| dir.join("mailwatch").join("config.json"))
                .context("no configuration directory; pass --config"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_args() {
        let cli = Cli::parse_from(["mailwatch", "--config", "/tmp/m.json", "--once"]);
        assert!(cli.once);
        assert_eq!(cli.config_path().unwrap(), PathBuf::from("/tmp/m.json"));
        assert!(cli.store.is_none());
    }
}
