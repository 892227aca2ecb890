//! IMAP client session.
//!
//! The session moves through the RFC 9051 states at run time:
//!
//! ```text
//! NotAuthenticated ── login() ──→ Authenticated ── examine() ──→ Selected
//!        │  (PREAUTH greeting skips LOGIN)                          │
//!        └───────────────────── logout() ──→ Logout ←──────────────┘
//! ```
//!
//! Operations that need an earlier or later state fail with
//! [`Error::Protocol`] instead of sending a command the server would reject.

use mailwatch_net::Transport;
use tracing::{debug, info};

use super::config::Config;
use super::framed::FramedStream;
use crate::command::{Command, TagGenerator};
use crate::parser::{Response, parse_fetch, parse_search};
use crate::types::{Capabilities, Mailbox, MailboxStatus, Status};
use crate::{Error, Result};

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for credentials.
    NotAuthenticated,
    /// Logged in (or pre-authenticated).
    Authenticated,
    /// A mailbox is open read-only.
    Selected,
    /// LOGOUT has been sent.
    Logout,
}

/// IMAP client session over a [`Transport`].
pub struct Client {
    pub(crate) stream: FramedStream,
    pub(crate) tag_gen: TagGenerator,
    pub(crate) capabilities: Capabilities,
    pub(crate) state: SessionState,
    config: Config,
}

// Manual Debug implementation to keep the transport out of logs
impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.config.host)
            .field("state", &self.state)
            .field("capabilities", &self.capabilities)
            .field("secure", &self.stream.get_ref().is_secure())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a new client from a connected transport.
    ///
    /// Reads the server greeting: `* OK` leaves the session unauthenticated,
    /// `* PREAUTH` authenticates it, `* BYE` is an error. Capabilities in the
    /// greeting's response code are recorded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Bye`] if the server refuses the connection, a
    /// protocol error for any other greeting, or a transport error.
    pub async fn from_transport(transport: Transport, config: Config) -> Result<Self> {
        let mut stream = FramedStream::new(transport);
        let greeting = Response::parse(&stream.read_response().await?)?;

        let state = match (greeting.is_untagged(), greeting.status()) {
            (true, Some(Status::Ok)) => SessionState::NotAuthenticated,
            (true, Some(Status::PreAuth)) => SessionState::Authenticated,
            (true, Some(Status::Bye)) => return Err(Error::Bye(greeting.text())),
            _ => {
                return Err(Error::Protocol(format!(
                    "unexpected greeting: {} {}",
                    greeting.tag, greeting.kind
                )));
            }
        };

        let mut client = Self {
            stream,
            tag_gen: TagGenerator::new(),
            capabilities: Capabilities::default(),
            state,
            config,
        };
        client.note_capabilities(&greeting);
        debug!(host = %client.config.host, ?state, "greeting received");
        Ok(client)
    }

    /// Returns the session state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// Returns the server capabilities.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Returns true if the server supports IDLE (RFC 2177).
    #[must_use]
    pub fn supports_idle(&self) -> bool {
        self.capabilities.supports_idle()
    }

    /// Returns true if the session runs over TLS.
    #[must_use]
    pub const fn is_secure(&self) -> bool {
        self.stream.get_ref().is_secure()
    }

    /// Authenticates the session.
    ///
    /// Issues CAPABILITY and requires IMAP4. A plaintext, unauthenticated
    /// session is upgraded with STARTTLS when offered, after which
    /// CAPABILITY is issued again since the upgrade invalidates it. A
    /// pre-authenticated session skips LOGIN.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotCompliant`] without IMAP4, [`Error::LoginDisabled`]
    /// if the server refuses LOGIN, [`Error::No`] for bad credentials, or a
    /// transport/secure channel error.
    pub async fn login(mut self, username: &str, password: &str) -> Result<Self> {
        if self.state != SessionState::NotAuthenticated
            && self.state != SessionState::Authenticated
        {
            return Err(Error::Protocol(format!("login in {:?}", self.state)));
        }

        self.refresh_capabilities().await?;
        if !self.capabilities.supports_imap4() {
            return Err(Error::NotCompliant);
        }

        if self.state == SessionState::NotAuthenticated
            && !self.is_secure()
            && self.config.starttls
            && self.capabilities.supports_starttls()
        {
            self = self.starttls().await?;
        }

        if self.state == SessionState::Authenticated {
            return Ok(self);
        }
        if self.capabilities.login_disabled() {
            return Err(Error::LoginDisabled);
        }

        self.command(&Command::Login {
            username: username.to_string(),
            password: password.to_string(),
        })
        .await?;
        self.state = SessionState::Authenticated;
        info!(host = %self.config.host, user = username, "logged in");
        Ok(self)
    }

    async fn starttls(mut self) -> Result<Self> {
        self.command(&Command::StartTls).await?;

        let Self {
            stream,
            tag_gen,
            state,
            config,
            ..
        } = self;
        let transport = stream
            .into_inner()
            .upgrade(&config.host, config.verify)
            .await?;
        debug!(host = %config.host, "STARTTLS negotiated");

        let mut client = Self {
            stream: FramedStream::new(transport),
            tag_gen,
            capabilities: Capabilities::default(),
            state,
            config,
        };
        client.refresh_capabilities().await?;
        Ok(client)
    }

    async fn refresh_capabilities(&mut self) -> Result<()> {
        self.capabilities = Capabilities::default();
        self.command(&Command::Capability).await?;
        Ok(())
    }

    /// Opens a mailbox read-only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the mailbox cannot be opened, or a
    /// transport error.
    pub async fn examine(&mut self, mailbox: &Mailbox) -> Result<MailboxStatus> {
        self.require_authenticated("EXAMINE")?;
        let responses = self
            .command(&Command::Examine {
                mailbox: mailbox.encoded(),
            })
            .await?;
        self.state = SessionState::Selected;

        let mut status = MailboxStatus {
            read_only: true,
            ..MailboxStatus::default()
        };
        for response in &responses {
            match (response.kind.as_str(), response.number) {
                ("EXISTS", Some(n)) => status.exists = n,
                ("RECENT", Some(n)) => status.recent = n,
                _ => {}
            }
            if let Some(code) = response.code() {
                let code = String::from_utf8_lossy(code);
                let mut parts = code.split_ascii_whitespace();
                match parts.next().map(str::to_ascii_uppercase).as_deref() {
                    Some("UIDVALIDITY") => {
                        status.uid_validity = parts.next().and_then(|v| v.parse().ok());
                    }
                    Some("READ-WRITE") => status.read_only = false,
                    _ => {}
                }
            }
        }
        debug!(mailbox = %mailbox, exists = status.exists, "mailbox opened");
        Ok(status)
    }

    /// Returns the UIDs of unseen messages in the selected mailbox.
    ///
    /// # Errors
    ///
    /// Returns a protocol error outside the selected state, or the server's
    /// refusal.
    pub async fn search_unseen(&mut self) -> Result<Vec<u32>> {
        self.require_selected("SEARCH")?;
        let responses = self.command(&Command::SearchUnseen).await?;
        Ok(responses
            .iter()
            .filter(|r| r.is_untagged() && r.kind == "SEARCH")
            .flat_map(|r| parse_search(&r.data))
            .collect())
    }

    /// Fetches the Subject, From and Date header fields of one message
    /// without setting `\Seen`. Returns `None` if the message is gone.
    ///
    /// # Errors
    ///
    /// Returns a protocol error outside the selected state, or the server's
    /// refusal.
    pub async fn fetch_headers(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
        self.require_selected("FETCH")?;
        let responses = self.command(&Command::FetchHeaders { uid }).await?;

        let mut fallback = None;
        for response in responses
            .iter()
            .filter(|r| r.is_untagged() && r.kind == "FETCH")
        {
            let fetch = parse_fetch(&response.data);
            match fetch.uid {
                Some(found) if found == uid => return Ok(fetch.section),
                // unsolicited flag updates for other messages
                Some(_) => {}
                None => fallback = fallback.or(fetch.section),
            }
        }
        Ok(fallback)
    }

    /// Sends LOGOUT and closes the transport. A BYE from the server is
    /// expected here and not an error.
    ///
    /// # Errors
    ///
    /// Returns the LOGOUT failure; the transport is closed regardless.
    pub async fn logout(mut self) -> Result<()> {
        self.state = SessionState::Logout;
        let result = self.command(&Command::Logout).await.map(|_| ());
        self.stream.get_mut().shutdown().await;
        debug!(host = %self.config.host, "logged out");
        result
    }

    /// Closes the transport without LOGOUT.
    pub async fn shutdown(&mut self) {
        self.stream.get_mut().shutdown().await;
    }

    /// Sends a command and reads responses up to its tagged completion.
    ///
    /// Returns every untagged response followed by the tagged one.
    pub(crate) async fn command(&mut self, command: &Command) -> Result<Vec<Response>> {
        command.check()?;
        let tag = self.tag_gen.next();
        debug!(command = %command.redacted(&tag), "C:");
        self.stream.write_command(&command.serialize(&tag)).await?;

        let mut responses = Vec::new();
        loop {
            let response = Response::parse(&self.stream.read_response().await?)?;
            if response.is_continuation() {
                return Err(Error::Protocol(format!(
                    "unexpected continuation: {}",
                    response.text()
                )));
            }
            if response.is_untagged() {
                self.check_untagged(&response)?;
                responses.push(response);
                continue;
            }
            if response.tag != tag {
                return Err(Error::Protocol(format!(
                    "unexpected tag {} (expected {tag})",
                    response.tag
                )));
            }
            check_completion(&response)?;
            self.note_capabilities(&response);
            responses.push(response);
            return Ok(responses);
        }
    }

    /// Records capability data and rejects BYE outside LOGOUT.
    pub(crate) fn check_untagged(&mut self, response: &Response) -> Result<()> {
        if response.status() == Some(Status::Bye) && self.state != SessionState::Logout {
            return Err(Error::Bye(response.text()));
        }
        self.note_capabilities(response);
        Ok(())
    }

    fn note_capabilities(&mut self, response: &Response) {
        if response.kind == "CAPABILITY" {
            self.capabilities = Capabilities::parse(&response.text());
        } else if let Some(code) = response.code() {
            let code = String::from_utf8_lossy(code);
            if let Some((name, list)) = code.split_once(' ')
                && name.eq_ignore_ascii_case("CAPABILITY")
            {
                self.capabilities = Capabilities::parse(list);
            }
        }
    }

    fn require_authenticated(&self, what: &str) -> Result<()> {
        match self.state {
            SessionState::Authenticated | SessionState::Selected => Ok(()),
            state => Err(Error::Protocol(format!("{what} in {state:?}"))),
        }
    }

    pub(crate) fn require_selected(&self, what: &str) -> Result<()> {
        match self.state {
            SessionState::Selected => Ok(()),
            state => Err(Error::Protocol(format!("{what} in {state:?}"))),
        }
    }
}

/// Maps a tagged completion to an error unless it is OK.
pub(crate) fn check_completion(response: &Response) -> Result<()> {
    match response.status() {
        Some(Status::Ok) => Ok(()),
        Some(Status::No) => Err(Error::No(response.text())),
        Some(Status::Bad) => Err(Error::Bad(response.text())),
        Some(Status::Bye) => Err(Error::Bye(response.text())),
        _ => Err(Error::Protocol(format!(
            "{} {}",
            response.kind,
            response.text()
        ))),
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

    // TagGenerator::with_seed(0) yields AAAA, AAAB, AAAC, ...
    async fn client(mock: tokio_test::io::Mock) -> Result<Client> {
        let transport = Transport::from_socket(mock, Timeouts::default(), AbortSignal::never());
        let mut client = Client::from_transport(transport, Config::new("imap.example.com")).await?;
        client.tag_gen = TagGenerator::with_seed(0);
        Ok(client)
    }

    #[tokio::test]
    async fn test_login_plain() {
        let mock = Builder::new()
            .read(b"* OK [CAPABILITY IMAP4rev1] ready\r\n")
            .write(b"AAAA CAPABILITY\r\n")
            .read(b"* CAPABILITY IMAP4rev1 IDLE AUTH=PLAIN\r\nAAAA OK done\r\n")
            .write(b"AAAB LOGIN user \"pass word\"\r\n")
            .read(b"AAAB OK logged in\r\n")
            .build();
        let client = client(mock).await.unwrap();
        let client = client.login("user", "pass word").await.unwrap();
        assert_eq!(client.state(), SessionState::Authenticated);
        assert!(client.supports_idle());
    }

    #[tokio::test]
    async fn test_login_refuses_line_breaks() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"AAAA CAPABILITY\r\n")
            .read(b"* CAPABILITY IMAP4rev1\r\nAAAA OK done\r\n")
            .build();
        let client = client(mock).await.unwrap();
        let err = client
            .login("user", "pw\r\nAAAC DELETE INBOX")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument("password")), "{err}");
        assert!(!err.to_string().contains("DELETE"));
    }

    #[tokio::test]
    async fn test_preauth_skips_login() {
        let mock = Builder::new()
            .read(b"* PREAUTH welcome\r\n")
            .write(b"AAAA CAPABILITY\r\n")
            .read(b"* CAPABILITY IMAP4rev1\r\nAAAA OK done\r\n")
            .build();
        let client = client(mock).await.unwrap();
        let client = client.login("user", "pw").await.unwrap();
        assert_eq!(client.state(), SessionState::Authenticated);
        assert!(!client.supports_idle());
    }

    #[tokio::test]
    async fn test_not_compliant() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"AAAA CAPABILITY\r\n")
            .read(b"* CAPABILITY POP3ISH\r\nAAAA OK done\r\n")
            .build();
        let client = client(mock).await.unwrap();
        assert!(matches!(
            client.login("u", "p").await,
            Err(Error::NotCompliant)
        ));
    }

    #[tokio::test]
    async fn test_login_disabled() {
        let mut builder = Builder::new();
        builder
            .read(b"* OK ready\r\n")
            .write(b"AAAA CAPABILITY\r\n")
            .read(b"* CAPABILITY IMAP4rev1 LOGINDISABLED\r\nAAAA OK done\r\n");
        let transport = Transport::from_socket(
            builder.build(),
            Timeouts::default(),
            AbortSignal::never(),
        );
        let config = Config::builder("imap.example.com").starttls(false).build();
        let mut client = Client::from_transport(transport, config).await.unwrap();
        client.tag_gen = TagGenerator::with_seed(0);
        assert!(matches!(
            client.login("u", "p").await,
            Err(Error::LoginDisabled)
        ));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"AAAA CAPABILITY\r\n")
            .read(b"* CAPABILITY IMAP4\r\nAAAA OK done\r\n")
            .write(b"AAAB LOGIN u p\r\n")
            .read(b"AAAB NO [AUTHENTICATIONFAILED] Invalid credentials\r\n")
            .build();
        let client = client(mock).await.unwrap();
        match client.login("u", "p").await {
            Err(Error::No(text)) => {
                assert_eq!(text, "[AUTHENTICATIONFAILED] Invalid credentials");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_greeting_bye() {
        let mock = Builder::new().read(b"* BYE too many connections\r\n").build();
        assert!(matches!(client(mock).await, Err(Error::Bye(text)) if text == "too many connections"));
    }

    #[tokio::test]
    async fn test_bye_during_command_is_fatal() {
        let mock = Builder::new()
            .read(b"* OK ready\r\n")
            .write(b"AAAA CAPABILITY\r\n")
            .read(b"* BYE shutting down\r\n")
            .build();
        let client = client(mock).await.unwrap();
        assert!(matches!(client.login("u", "p").await, Err(Error::Bye(_))));
    }

    #[tokio::test]
    async fn test_examine_search_fetch() {
        let mock = Builder::new()
            .read(b"* PREAUTH ready\r\n")
            .write(b"AAAA EXAMINE INBOX\r\n")
            .read(b"* 4 EXISTS\r\n* 1 RECENT\r\n* OK [UIDVALIDITY 3857529045] UIDs valid\r\n")
            .read(b"AAAA OK [READ-ONLY] EXAMINE completed\r\n")
            .write(b"AAAB UID SEARCH UNSEEN\r\n")
            .read(b"* SEARCH 17 23\r\nAAAB OK SEARCH completed\r\n")
            .write(b"AAAC UID FETCH 23 BODY.PEEK[HEADER.FIELDS (SUBJECT FROM DATE)]\r\n")
            .read(b"* 4 FETCH (UID 23 BODY[HEADER.FIELDS (SUBJECT FROM DATE)] {16}\r\n")
            .read(b"Subject: Hello\r\n)\r\n")
            .read(b"AAAC OK FETCH completed\r\n")
            .build();
        let mut client = client(mock).await.unwrap();
        let status = client.examine(&Mailbox::inbox()).await.unwrap();
        assert_eq!(status.exists, 4);
        assert_eq!(status.recent, 1);
        assert_eq!(status.uid_validity, Some(3857529045));
        assert!(status.read_only);

        assert_eq!(client.search_unseen().await.unwrap(), vec![17, 23]);
        let header = client.fetch_headers(23).await.unwrap().unwrap();
        assert_eq!(header, b"Subject: Hello\r\n");
    }

    #[tokio::test]
    async fn test_examine_non_ascii_folder() {
        let mock = Builder::new()
            .read(b"* PREAUTH ready\r\n")
            .write(b"AAAA EXAMINE Entw&APw-rfe\r\n")
            .read(b"AAAA OK done\r\n")
            .build();
        let mut client = client(mock).await.unwrap();
        client.examine(&Mailbox::new("Entwürfe")).await.unwrap();
        assert_eq!(client.state(), SessionState::Selected);
    }

    #[tokio::test]
    async fn test_search_requires_selected() {
        let mock = Builder::new().read(b"* PREAUTH ready\r\n").build();
        let mut client = client(mock).await.unwrap();
        assert!(matches!(
            client.search_unseen().await,
            Err(Error::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn test_unexpected_tag() {
        let mock = Builder::new()
            .read(b"* PREAUTH ready\r\n")
            .write(b"AAAA EXAMINE INBOX\r\n")
            .read(b"ZZZZ OK what\r\n")
            .build();
        let mut client = client(mock).await.unwrap();
        assert!(matches!(
            client.examine(&Mailbox::inbox()).await,
            Err(Error::Protocol(msg)) if msg.contains("ZZZZ")
        ));
    }

    #[tokio::test]
    async fn test_logout_accepts_bye() {
        let mock = Builder::new()
            .read(b"* PREAUTH ready\r\n")
            .write(b"AAAA LOGOUT\r\n")
            .read(b"* BYE logging out\r\nAAAA OK LOGOUT completed\r\n")
            .build();
        let client = client(mock).await.unwrap();
        client.logout().await.unwrap();
    }
}
