//! Type-state POP3 client.

use std::marker::PhantomData;

use mailwatch_net::Transport;
use tracing::{debug, info, trace};

use super::Config;
use crate::command::Command;
use crate::error::{Error, Result};
use crate::parser::{is_terminator, parse_reply, parse_uidl_line, unstuff};
use crate::types::{Capabilities, Reply, UidEntry};

/// Maximum line length to prevent memory exhaustion.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024; // 1 MB

/// Maximum size of one multi-line response.
pub const MAX_RESPONSE_SIZE: usize = 16 * 1024 * 1024; // 16 MB

/// Type-state marker for the AUTHORIZATION state.
#[derive(Debug)]
pub struct Authorization;

/// Type-state marker for the TRANSACTION state.
#[derive(Debug)]
pub struct Transaction;

/// POP3 client with type-state pattern.
#[derive(Debug)]
pub struct Client<State> {
    transport: Transport,
    config: Config,
    capabilities: Option<Capabilities>,
    _state: PhantomData<State>,
}

impl<S> Client<S> {
    /// Returns the capabilities from CAPA, or `None` if the server does not
    /// implement it.
    #[must_use]
    pub const fn capabilities(&self) -> Option<&Capabilities> {
        self.capabilities.as_ref()
    }

    /// Returns true if the session runs over TLS.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.transport.is_secure()
    }

    /// Sends QUIT and closes the transport.
    ///
    /// # Errors
    ///
    /// Returns the QUIT failure; the transport is closed regardless.
    pub async fn quit(mut self) -> Result<()> {
        let result = self.send(&Command::Quit).await.map(|_| ());
        self.transport.shutdown().await;
        debug!(host = %self.config.host, "session closed");
        result
    }

    /// Closes the transport without QUIT.
    pub async fn shutdown(&mut self) {
        self.transport.shutdown().await;
    }

    /// Sends a command and reads its status line. A negative reply becomes
    /// [`Error::Negative`].
    async fn send(&mut self, command: &Command) -> Result<Reply> {
        debug!(command = %command.redacted(), "C:");
        self.transport.write_all(&command.serialize()).await?;
        self.read_reply().await?.into_result()
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        let line = self.read_line().await?;
        trace!(line = %String::from_utf8_lossy(&line), "S:");
        parse_reply(&line)
    }

    /// Reads data lines up to the terminating `.`, removing dot-stuffing.
    /// Nothing past the terminator is consumed.
    async fn read_multiline(&mut self) -> Result<Vec<Vec<u8>>> {
        let mut lines = Vec::new();
        let mut total = 0usize;
        loop {
            let line = self.read_line().await?;
            if is_terminator(&line) {
                trace!(lines = lines.len(), "S: <listing>");
                return Ok(lines);
            }
            total += line.len() + 2;
            if total > MAX_RESPONSE_SIZE {
                return Err(Error::Protocol(format!(
                    "response too large (max {MAX_RESPONSE_SIZE} bytes)"
                )));
            }
            lines.push(unstuff(&line).to_vec());
        }
    }

    async fn read_line(&mut self) -> Result<Vec<u8>> {
        match self.transport.read_line(MAX_LINE_LENGTH).await {
            Err(mailwatch_net::Error::LineTooLong(limit)) => Err(Error::Protocol(format!(
                "line too long (max {limit} bytes)"
            ))),
            other => Ok(other?),
        }
    }

    fn into_state<T>(self) -> Client<T> {
        Client {
            transport: self.transport,
            config: self.config,
            capabilities: self.capabilities,
            _state: PhantomData,
        }
    }
}

impl Client<Authorization> {
    /// Creates a client from a transport and reads the server greeting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Negative`] if the server greets with `-ERR`, or a
    /// transport error.
    pub async fn from_transport(transport: Transport, config: Config) -> Result<Self> {
        let mut client = Self {
            transport,
            config,
            capabilities: None,
            _state: PhantomData,
        };
        let greeting = client.read_reply().await?.into_result()?;
        debug!(host = %client.config.host, greeting = %greeting.text, "greeting received");
        Ok(client)
    }

    /// Authenticates with USER and PASS.
    ///
    /// CAPA is issued first; a server without CAPA is accepted as is. When
    /// CAPA answers, UIDL must be listed, STLS is negotiated if offered on a
    /// plaintext session, and USER must be listed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] for a missing required capability,
    /// [`Error::Negative`] with the server's text if USER or PASS is
    /// refused, or a transport/secure channel error.
    pub async fn login(mut self, username: &str, password: &str) -> Result<Client<Transaction>> {
        let capabilities = self.capa().await?;
        if let Some(caps) = &capabilities
            && !caps.supports_uidl()
        {
            return Err(Error::NotSupported("UIDL".into()));
        }
        let upgrade = capabilities
            .as_ref()
            .is_some_and(Capabilities::supports_stls)
            && self.config.stls
            && !self.is_secure();
        self.capabilities = capabilities;

        if upgrade {
            self = self.stls().await?;
        }
        if let Some(caps) = &self.capabilities
            && !caps.supports_user()
        {
            return Err(Error::NotSupported("USER".into()));
        }

        self.send(&Command::User {
            username: username.to_string(),
        })
        .await?;
        self.send(&Command::Pass {
            password: password.to_string(),
        })
        .await?;
        info!(host = %self.config.host, user = username, "logged in");
        Ok(self.into_state())
    }

    /// Issues CAPA. A negative reply means the server predates RFC 2449.
    async fn capa(&mut self) -> Result<Option<Capabilities>> {
        match self.send(&Command::Capa).await {
            Ok(_) => {}
            Err(Error::Negative(text)) => {
                debug!(reason = %text, "CAPA not supported");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        let lines: Vec<String> = self
            .read_multiline()
            .await?
            .iter()
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect();
        Ok(Some(Capabilities::from_lines(&lines)))
    }

    /// Negotiates STLS and re-reads the capabilities over the secure
    /// channel, keeping the plaintext ones if CAPA now fails.
    async fn stls(mut self) -> Result<Self> {
        self.send(&Command::Stls).await?;

        let Self {
            transport,
            config,
            capabilities,
            ..
        } = self;
        let transport = transport.upgrade(&config.host, config.verify).await?;
        debug!(host = %config.host, "STLS negotiated");

        let mut client = Self {
            transport,
            config,
            capabilities,
            _state: PhantomData,
        };
        if let Some(refreshed) = client.capa().await? {
            client.capabilities = Some(refreshed);
        }
        Ok(client)
    }
}

impl Client<Transaction> {
    /// Lists the unique id of every message in the maildrop.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Negative`] if refused, a protocol error for a
    /// malformed line, or a transport error.
    pub async fn uidl(&mut self) -> Result<Vec<UidEntry>> {
        self.send(&Command::Uidl).await?;
        self.read_multiline()
            .await?
            .iter()
            .map(|line| parse_uidl_line(line))
            .collect()
    }

    /// Retrieves the header block and the first `lines` body lines of a
    /// message, each line CRLF-terminated, dot-stuffing removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Negative`] if the message does not exist, or a
    /// transport error.
    pub async fn top(&mut self, message: u32, lines: u32) -> Result<Vec<u8>> {
        self.send(&Command::Top { message, lines }).await?;
        let mut text = Vec::new();
        for line in self.read_multiline().await? {
            text.extend_from_slice(&line);
            text.extend_from_slice(b"\r\n");
        }
        Ok(text)
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
    use mailwatch_net::{AbortSignal, Timeouts};
    use tokio_test::io::Builder;

    use super::*;

    async fn client(mock: tokio_test::io::Mock) -> Result<Client<Authorization>> {
        let transport = Transport::from_socket(mock, Timeouts::default(), AbortSignal::never());
        Client::from_transport(transport, Config::new("pop.example.com")).await
    }

    #[tokio::test]
    async fn test_login_without_capa() {
        let mock = Builder::new()
            .read(b"+OK POP3 ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"-ERR unknown command\r\n")
            .write(b"USER alice\r\n")
            .read(b"+OK\r\n")
            .write(b"PASS secret\r\n")
            .read(b"+OK maildrop locked\r\n")
            .build();
        let session = client(mock).await.unwrap().login("alice", "secret").await.unwrap();
        assert!(session.capabilities().is_none());
        assert!(!session.is_secure());
    }

    #[tokio::test]
    async fn test_login_with_capa() {
        let mock = Builder::new()
            .read(b"+OK POP3 ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"+OK Capability list follows\r\nTOP\r\nUSER\r\nUIDL\r\n.\r\n")
            .write(b"USER alice\r\n")
            .read(b"+OK\r\n")
            .write(b"PASS secret\r\n")
            .read(b"+OK\r\n")
            .build();
        let session = client(mock).await.unwrap().login("alice", "secret").await.unwrap();
        assert!(session.capabilities().unwrap().supports_uidl());
    }

    #[tokio::test]
    async fn test_uidl_required() {
        let mock = Builder::new()
            .read(b"+OK POP3 ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"+OK\r\nTOP\r\nUSER\r\n.\r\n")
            .build();
        let result = client(mock).await.unwrap().login("alice", "secret").await;
        assert!(matches!(result, Err(Error::NotSupported(what)) if what == "UIDL"));
    }

    #[tokio::test]
    async fn test_user_required() {
        let mock = Builder::new()
            .read(b"+OK POP3 ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"+OK\r\nUIDL\r\nSASL PLAIN\r\n.\r\n")
            .build();
        let result = client(mock).await.unwrap().login("alice", "secret").await;
        assert!(matches!(result, Err(Error::NotSupported(what)) if what == "USER"));
    }

    #[tokio::test]
    async fn test_bad_password_keeps_server_text() {
        let mock = Builder::new()
            .read(b"+OK POP3 ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"-ERR\r\n")
            .write(b"USER alice\r\n")
            .read(b"+OK\r\n")
            .write(b"PASS wrong\r\n")
            .read(b"-ERR [AUTH] invalid password\r\n")
            .build();
        let result = client(mock).await.unwrap().login("alice", "wrong").await;
        assert!(matches!(
            result,
            Err(Error::Negative(text)) if text == "[AUTH] invalid password"
        ));
    }

    #[tokio::test]
    async fn test_negative_greeting() {
        let mock = Builder::new().read(b"-ERR too many connections\r\n").build();
        assert!(matches!(
            client(mock).await,
            Err(Error::Negative(text)) if text == "too many connections"
        ));
    }

    #[tokio::test]
    async fn test_stls_refuses_early_plaintext() {
        let mock = Builder::new()
            .read(b"+OK POP3 ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"+OK\r\nUSER\r\nUIDL\r\nSTLS\r\n.\r\n")
            .write(b"STLS\r\n")
            .read(b"+OK begin TLS\r\n+OK injected\r\n")
            .build();
        let result = client(mock).await.unwrap().login("alice", "secret").await;
        assert!(matches!(
            result,
            Err(Error::Net(mailwatch_net::Error::InvalidState(_)))
        ));
    }

    #[tokio::test]
    async fn test_stls_disabled() {
        let mock = Builder::new()
            .read(b"+OK POP3 ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"+OK\r\nUSER\r\nUIDL\r\nSTLS\r\n.\r\n")
            .write(b"USER alice\r\n")
            .read(b"+OK\r\n")
            .write(b"PASS secret\r\n")
            .read(b"+OK\r\n")
            .build();
        let transport = Transport::from_socket(mock, Timeouts::default(), AbortSignal::never());
        let config = Config::builder("pop.example.com").stls(false).build();
        let session = Client::from_transport(transport, config)
            .await
            .unwrap()
            .login("alice", "secret")
            .await
            .unwrap();
        assert!(!session.is_secure());
    }

    async fn transaction(builder: &mut Builder) -> Client<Transaction> {
        let mock = builder.build();
        let transport = Transport::from_socket(mock, Timeouts::default(), AbortSignal::never());
        let config = Config::new("pop.example.com");
        let mut client = Client::<Authorization> {
            transport,
            config,
            capabilities: None,
            _state: PhantomData,
        };
        client.read_reply().await.unwrap();
        client.into_state()
    }

    #[tokio::test]
    async fn test_uidl_stops_at_terminator() {
        let mut builder = Builder::new();
        builder
            .read(b"+OK ready\r\n")
            .write(b"UIDL\r\n")
            .read(b"+OK\r\n1 whqtswO00WBw418f9t5JxYwZ\r\n2 QhdPYR:00WBw1Ph7x7\r\n.\r\n+OK bye\r\n")
            .write(b"QUIT\r\n");
        let mut session = transaction(&mut builder).await;

        let entries = session.uidl().await.unwrap();
        assert_eq!(
            entries,
            vec![
                UidEntry {
                    number: 1,
                    uid: "whqtswO00WBw418f9t5JxYwZ".to_string()
                },
                UidEntry {
                    number: 2,
                    uid: "QhdPYR:00WBw1Ph7x7".to_string()
                },
            ]
        );
        // the reply to QUIT was already buffered behind the terminator
        session.quit().await.unwrap();
    }

    #[tokio::test]
    async fn test_uidl_empty_maildrop() {
        let mut builder = Builder::new();
        builder
            .read(b"+OK ready\r\n")
            .write(b"UIDL\r\n")
            .read(b"+OK\r\n.\r\n");
        let mut session = transaction(&mut builder).await;
        assert!(session.uidl().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_top_unstuffs_lines() {
        let mut builder = Builder::new();
        builder
            .read(b"+OK ready\r\n")
            .write(b"TOP 2 0\r\n")
            .read(b"+OK top of message follows\r\nSubject: dots\r\n..hidden: x\r\n\r\n.\r\n");
        let mut session = transaction(&mut builder).await;
        assert_eq!(
            session.top(2, 0).await.unwrap(),
            b"Subject: dots\r\n.hidden: x\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn test_top_missing_message() {
        let mut builder = Builder::new();
        builder
            .read(b"+OK ready\r\n")
            .write(b"TOP 9 0\r\n")
            .read(b"-ERR no such message\r\n");
        let mut session = transaction(&mut builder).await;
        assert!(matches!(
            session.top(9, 0).await,
            Err(Error::Negative(text)) if text == "no such message"
        ));
    }

    #[tokio::test]
    async fn test_quit_negative_still_closes() {
        let mut builder = Builder::new();
        builder
            .read(b"+OK ready\r\n")
            .write(b"QUIT\r\n")
            .read(b"-ERR some deleted messages not removed\r\n");
        let session = transaction(&mut builder).await;
        assert!(matches!(session.quit().await, Err(Error::Negative(_))));
    }
}
