//! Protocol dispatch.
//!
//! [`Backend`] is a logged-in session of either protocol. It offers the
//! three operations a worker needs (login, fetch, logout) plus IDLE, which
//! only IMAP sessions support.

use std::collections::BTreeSet;
use std::time::Duration;

use mailwatch_imap::{IdleOutcome, Mailbox as Folder};
use mailwatch_net::{Timeouts, Transport, punycode};
use mailwatch_pop3::Transaction;
use tracing::{debug, info};

use crate::mail::Mail;
use crate::mailbox::Mailbox;
use crate::uri::Uri;
use crate::{Error, Result};

/// Login name used when the URI names no user.
pub const ANONYMOUS_USER: &str = "ANONYMOUS";

/// A logged-in session.
#[derive(Debug)]
pub enum Backend {
    /// IMAP4 session.
    Imap(mailwatch_imap::Client),
    /// POP3 session in the transaction state.
    Pop3(mailwatch_pop3::Client<Transaction>),
}

impl Backend {
    /// Connects to the mailbox's server and logs in.
    ///
    /// The host is converted to its ASCII form first. `imap+ssl` and
    /// `pop+ssl` negotiate TLS right after connecting; the plain schemes
    /// upgrade with STARTTLS/STLS when the server offers it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a host that has no ASCII form, or the
    /// transport, secure channel or protocol error that ended the attempt.
    pub async fn connect(mailbox: &Mailbox) -> Result<Self> {
        let uri = mailbox.uri();
        let host = punycode::domain_to_ascii(uri.host())
            .ok_or_else(|| Error::Config(format!("invalid host name {:?}", uri.host())))?;

        debug!(mailbox = %mailbox.name(), %host, port = uri.port(), "connecting");
        let mut transport = Transport::connect(
            &host,
            uri.port(),
            mailbox.domain(),
            Timeouts::default(),
            mailbox.abort_signal(),
        )
        .await?;
        if uri.scheme().is_implicit_tls() {
            transport = transport.upgrade(&host, mailbox.verify()).await?;
        }

        Self::login(transport, &host, mailbox).await
    }

    /// Reads the greeting on an open transport and logs in with the
    /// mailbox's credentials.
    ///
    /// # Errors
    ///
    /// Returns the protocol or transport error that ended the login.
    pub async fn login(transport: Transport, host: &str, mailbox: &Mailbox) -> Result<Self> {
        let uri = mailbox.uri();
        let (user, password) = match uri.user() {
            Some(user) if !user.is_empty() => (user, mailbox.password().expose()),
            _ => (ANONYMOUS_USER, ""),
        };

        if uri.scheme().is_imap() {
            let config = mailwatch_imap::Config::builder(host)
                .verify(mailbox.verify())
                .build();
            let client = mailwatch_imap::Client::from_transport(transport, config).await?;
            Ok(Self::Imap(client.login(user, password).await?))
        } else {
            let config = mailwatch_pop3::Config::builder(host)
                .verify(mailbox.verify())
                .build();
            let client = mailwatch_pop3::Client::from_transport(transport, config).await?;
            Ok(Self::Pop3(client.login(user, password).await?))
        }
    }

    /// Returns true if the session can wait for changes with IDLE.
    #[must_use]
    pub fn supports_idle(&self) -> bool {
        match self {
            Self::Imap(client) => client.supports_idle(),
            Self::Pop3(_) => false,
        }
    }

    /// Polls the server and stores the new mail list, ignore list and
    /// recent count in `mailbox`. Returns the recent count.
    ///
    /// # Errors
    ///
    /// Returns the protocol or transport error that ended the poll; the
    /// mailbox is left untouched in that case.
    pub async fn fetch(&mut self, mailbox: &Mailbox) -> Result<usize> {
        let (known, ignore) = mailbox.snapshot();
        let poll = match self {
            Self::Imap(client) => fetch_imap(client, mailbox.uri(), &known, &ignore).await?,
            Self::Pop3(client) if mailbox.uri().is_recent_only() => {
                fetch_pop3_recent(client, &ignore).await?
            }
            Self::Pop3(client) => fetch_pop3(client, &known, &ignore).await?,
        };

        info!(
            mailbox = %mailbox.name(),
            recent = poll.recent,
            mails = poll.mails.len(),
            ignored = poll.ignore.len(),
            "fetched"
        );
        Ok(mailbox.update(&ignore, poll))
    }

    /// Waits up to `wait` for a change in the selected folder.
    ///
    /// # Errors
    ///
    /// POP3 sessions always fail with `NotSupported`; IMAP sessions return
    /// the error that ended the wait.
    pub async fn idle(&mut self, wait: Duration) -> Result<IdleOutcome> {
        match self {
            Self::Imap(client) => Ok(client.idle(wait).await?),
            Self::Pop3(_) => Err(mailwatch_pop3::Error::NotSupported("IDLE".into()).into()),
        }
    }

    /// Ends the session politely and closes the transport.
    ///
    /// # Errors
    ///
    /// Returns the LOGOUT/QUIT failure; the transport is closed regardless.
    pub async fn logout(self) -> Result<()> {
        match self {
            Self::Imap(client) => Ok(client.logout().await?),
            Self::Pop3(client) => Ok(client.quit().await?),
        }
    }
}

/// Outcome of one poll before it is stored.
#[derive(Debug, Default)]
pub(crate) struct Poll {
    pub(crate) mails: Vec<Mail>,
    pub(crate) ignore: BTreeSet<String>,
    /// Every uid the server listed.
    pub(crate) seen: BTreeSet<String>,
    pub(crate) recent: usize,
    /// Ignored uids are left out of `mails` (POP3 default mode).
    pub(crate) hides_ignored: bool,
}

impl Poll {
    /// Takes in uids ignored while the poll ran. Uids the server no longer
    /// listed are dropped.
    pub(crate) fn absorb_ignored<'a>(&mut self, late: impl IntoIterator<Item = &'a String>) {
        let late: BTreeSet<&String> = late
            .into_iter()
            .filter(|uid| self.seen.contains(*uid))
            .collect();
        if late.is_empty() {
            return;
        }
        if self.hides_ignored {
            self.mails.retain(|mail| !late.contains(&mail.uid));
        }
        self.ignore.extend(late.into_iter().cloned());
    }
}

fn find<'a>(known: &'a [Mail], uid: &str) -> Option<&'a Mail> {
    known.iter().find(|mail| mail.uid == uid)
}

/// EXAMINE the folder, list unseen uids and fetch the headers of those not
/// already known. Uids on the ignore list are listed but not counted; the
/// ignore list keeps only uids that are still unseen.
async fn fetch_imap(
    client: &mut mailwatch_imap::Client,
    uri: &Uri,
    known: &[Mail],
    ignore: &BTreeSet<String>,
) -> Result<Poll> {
    client.examine(&Folder::from_path(uri.path())).await?;
    let unseen = client.search_unseen().await?;

    let mut poll = Poll::default();
    for uid in unseen {
        let key = uid.to_string();
        poll.seen.insert(key.clone());
        if let Some(mail) = find(known, &key) {
            poll.mails.push(mail.clone());
        } else {
            let Some(header) = client.fetch_headers(uid).await? else {
                debug!(uid, "message vanished before FETCH");
                continue;
            };
            if !ignore.contains(&key) {
                poll.recent += 1;
            }
            poll.mails.push(Mail::from_header(key.clone(), &header));
        }
        if ignore.contains(&key) {
            poll.ignore.insert(key);
        }
    }
    Ok(poll)
}

/// UIDL, then `TOP n 0` for every uid neither ignored nor already known.
/// Messages whose `Status:` marks them read go to the ignore list.
async fn fetch_pop3(
    client: &mut mailwatch_pop3::Client<Transaction>,
    known: &[Mail],
    ignore: &BTreeSet<String>,
) -> Result<Poll> {
    let mut poll = Poll {
        hides_ignored: true,
        ..Poll::default()
    };
    for entry in client.uidl().await? {
        poll.seen.insert(entry.uid.clone());
        if ignore.contains(&entry.uid) {
            poll.ignore.insert(entry.uid);
            continue;
        }
        if let Some(mail) = find(known, &entry.uid) {
            poll.mails.push(mail.clone());
            continue;
        }
        let header = client.top(entry.number, 0).await?;
        let mail = Mail::from_header(entry.uid, &header);
        if mail.read {
            poll.ignore.insert(mail.uid);
        } else {
            poll.recent += 1;
            poll.mails.push(mail);
        }
    }
    Ok(poll)
}

/// "recent" mode: only uids absent from the previous ignore list are
/// fetched, and afterwards every uid on the server is ignored. History
/// older than one poll is not kept.
async fn fetch_pop3_recent(
    client: &mut mailwatch_pop3::Client<Transaction>,
    ignore: &BTreeSet<String>,
) -> Result<Poll> {
    let mut poll = Poll::default();
    for entry in client.uidl().await? {
        poll.seen.insert(entry.uid.clone());
        if !ignore.contains(&entry.uid) {
            let header = client.top(entry.number, 0).await?;
            let mail = Mail::from_header(entry.uid.clone(), &header);
            if !mail.read {
                poll.recent += 1;
                poll.mails.push(mail);
            }
        }
        poll.ignore.insert(entry.uid);
    }
    Ok(poll)
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
    use mailwatch_net::AbortSignal;
    use tokio_test::io::Builder;

    use super::*;
    use crate::mailbox::{Password, Recent};

    fn mailbox(uri: &str) -> Mailbox {
        Mailbox::new("test", uri.parse().unwrap(), Password::new("secret"))
    }

    fn pop3_login(builder: &mut Builder) -> &mut Builder {
        builder
            .read(b"+OK POP3 ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"-ERR unknown command\r\n")
            .write(b"USER alice\r\n")
            .read(b"+OK\r\n")
            .write(b"PASS secret\r\n")
            .read(b"+OK maildrop locked\r\n")
    }

    async fn pop3(mock: tokio_test::io::Mock, mailbox: &Mailbox) -> Backend {
        let transport = Transport::from_socket(mock, Timeouts::default(), AbortSignal::never());
        Backend::login(transport, "pop.example.com", mailbox)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_pop3_default_mode() {
        let mailbox = mailbox("pop://alice@pop.example.com");
        mailbox.set_ignored(["u9".to_string(), "gone".to_string()]);

        let mut builder = Builder::new();
        pop3_login(&mut builder)
            .write(b"UIDL\r\n")
            .read(b"+OK\r\n1 u1\r\n2 u2\r\n3 u9\r\n.\r\n")
            .write(b"TOP 1 0\r\n")
            .read(b"+OK\r\nSubject: hello\r\nFrom: bob@example.com\r\n\r\n.\r\n")
            .write(b"TOP 2 0\r\n")
            .read(b"+OK\r\nSubject: old\r\nStatus: RO\r\n\r\n.\r\n")
            .write(b"QUIT\r\n")
            .read(b"+OK bye\r\n");
        let mut backend = pop3(builder.build(), &mailbox).await;
        assert!(!backend.supports_idle());

        assert_eq!(backend.fetch(&mailbox).await.unwrap(), 1);
        let mails = mailbox.mails();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].uid, "u1");
        assert_eq!(mails[0].subject, "hello");
        assert_eq!(mailbox.ignored(), vec!["u2", "u9"]);
        assert_eq!(mailbox.recent(), Recent::Count(1));

        backend.logout().await.unwrap();
    }

    #[tokio::test]
    async fn test_pop3_known_mail_not_counted() {
        let mailbox = mailbox("pop://alice@pop.example.com");
        let mut builder = Builder::new();
        pop3_login(&mut builder)
            .write(b"UIDL\r\n")
            .read(b"+OK\r\n1 u1\r\n.\r\n")
            .write(b"TOP 1 0\r\n")
            .read(b"+OK\r\nSubject: hello\r\n\r\n.\r\n")
            .write(b"UIDL\r\n")
            .read(b"+OK\r\n1 u1\r\n.\r\n");
        let mut backend = pop3(builder.build(), &mailbox).await;

        assert_eq!(backend.fetch(&mailbox).await.unwrap(), 1);
        assert_eq!(backend.fetch(&mailbox).await.unwrap(), 0);
        assert_eq!(mailbox.mails().len(), 1);
        assert_eq!(mailbox.unseen(), 1);
    }

    #[tokio::test]
    async fn test_ignore_current_during_fetch_survives() {
        let mailbox = mailbox("pop://alice@pop.example.com");
        let mut builder = Builder::new();
        pop3_login(&mut builder)
            .write(b"UIDL\r\n")
            .read(b"+OK\r\n1 u1\r\n.\r\n")
            .write(b"TOP 1 0\r\n")
            .read(b"+OK\r\nSubject: hello\r\n\r\n.\r\n")
            .write(b"UIDL\r\n")
            .wait(Duration::from_millis(300))
            .read(b"+OK\r\n1 u1\r\n.\r\n");
        let mut backend = pop3(builder.build(), &mailbox).await;
        assert_eq!(backend.fetch(&mailbox).await.unwrap(), 1);

        let (recent, ()) = tokio::join!(backend.fetch(&mailbox), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            assert_eq!(mailbox.ignore_current(), vec!["u1"]);
        });
        assert_eq!(recent.unwrap(), 0);
        assert_eq!(mailbox.ignored(), vec!["u1"]);
        assert_eq!(mailbox.unseen(), 0);
    }

    #[tokio::test]
    async fn test_pop3_recent_mode() {
        let mailbox = mailbox("pop://alice@pop.example.com#recent");
        mailbox.set_ignored(["u1".to_string()]);

        let mut builder = Builder::new();
        pop3_login(&mut builder)
            .write(b"UIDL\r\n")
            .read(b"+OK\r\n1 u1\r\n2 u2\r\n3 u3\r\n.\r\n")
            .write(b"TOP 2 0\r\n")
            .read(b"+OK\r\nSubject: new\r\n\r\n.\r\n")
            .write(b"TOP 3 0\r\n")
            .read(b"+OK\r\nSubject: read\r\nStatus: R\r\n\r\n.\r\n")
            .write(b"UIDL\r\n")
            .read(b"+OK\r\n1 u1\r\n2 u2\r\n3 u3\r\n.\r\n");
        let mut backend = pop3(builder.build(), &mailbox).await;

        assert_eq!(backend.fetch(&mailbox).await.unwrap(), 1);
        assert_eq!(mailbox.mails()[0].subject, "new");
        assert_eq!(mailbox.ignored(), vec!["u1", "u2", "u3"]);

        // everything present is ignored after one poll
        assert_eq!(backend.fetch(&mailbox).await.unwrap(), 0);
        assert!(mailbox.mails().is_empty());
    }

    #[tokio::test]
    async fn test_pop3_anonymous_login() {
        let mailbox = mailbox("pop://pop.example.com");
        let mock = Builder::new()
            .read(b"+OK ready\r\n")
            .write(b"CAPA\r\n")
            .read(b"-ERR\r\n")
            .write(b"USER ANONYMOUS\r\n")
            .read(b"+OK\r\n")
            .write(b"PASS \r\n")
            .read(b"+OK\r\n")
            .build();
        pop3(mock, &mailbox).await;
    }

    #[tokio::test]
    async fn test_pop3_idle_not_supported() {
        let mailbox = mailbox("pop://alice@pop.example.com");
        let mut builder = Builder::new();
        pop3_login(&mut builder);
        let mut backend = pop3(builder.build(), &mailbox).await;
        assert!(matches!(
            backend.idle(Duration::from_secs(1)).await,
            Err(Error::Pop3(mailwatch_pop3::Error::NotSupported(_)))
        ));
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_mailbox() {
        let mailbox = mailbox("pop://alice@pop.example.com");
        mailbox.set_ignored(["u1".to_string()]);
        let mut builder = Builder::new();
        pop3_login(&mut builder)
            .write(b"UIDL\r\n")
            .read(b"-ERR mailbox locked\r\n");
        let mut backend = pop3(builder.build(), &mailbox).await;

        let err = backend.fetch(&mailbox).await.unwrap_err();
        assert!(err.to_string().contains("mailbox locked"), "{err}");
        assert_eq!(mailbox.ignored(), vec!["u1"]);
        assert_eq!(mailbox.recent(), Recent::Pending);
    }
}
