//! Per-account mailbox state.
//!
//! A [`Mailbox`] holds the account settings, the data produced by the last
//! fetch, and the worker state machine:
//!
//! ```text
//! Stopped ── try_start() ──→ Running ── finish() ──→ Stopped
//!                               │
//!                            exit()
//!                               ↓
//!                            Exiting ── finish() ──→ Stopped
//! ```
//!
//! At most one worker runs per mailbox: only the `Stopped → Running`
//! transition starts one, and it is made atomically. Data fields sit behind
//! a `std::sync::Mutex` that is never held across an `.await`.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mailwatch_net::{AbortHandle, AbortSignal, Domain, VerifyLevel};
use tokio::sync::watch;
use tracing::debug;

use crate::backend::Poll;
use crate::mail::Mail;
use crate::uri::Uri;

/// Default polling period.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(300);

/// A password held in memory only. `Debug` never shows it.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// Wraps a password.
    #[must_use]
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    /// Returns the password for the wire.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(<redacted>)")
    }
}

/// Worker life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// No worker is running.
    Stopped,
    /// A worker owns the mailbox.
    Running,
    /// The worker has been told to stop.
    Exiting,
}

/// Result of the most recent fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Recent {
    /// Nothing fetched yet.
    #[default]
    Pending,
    /// Number of new mails found.
    Count(usize),
    /// The fetch failed; carries the error text.
    Failed(String),
}

impl Recent {
    /// Returns the new-mail count of a successful fetch.
    #[must_use]
    pub const fn count(&self) -> Option<usize> {
        match self {
            Self::Count(n) => Some(*n),
            Self::Pending | Self::Failed(_) => None,
        }
    }

    /// Returns true if the last fetch failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[derive(Debug, Default)]
struct Data {
    mails: Vec<Mail>,
    ignore: BTreeSet<String>,
    recent: Recent,
    idle: bool,
}

/// One configured mailbox.
pub struct Mailbox {
    name: String,
    uri: Uri,
    password: Password,
    domain: Domain,
    verify: VerifyLevel,
    period: Duration,
    data: Mutex<Data>,
    state: watch::Sender<WorkerState>,
    abort: AbortHandle,
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("name", &self.name)
            .field("uri", &self.uri.to_string())
            .field("domain", &self.domain)
            .field("verify", &self.verify)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Mailbox {
    /// Creates a stopped mailbox with strict verification, any address
    /// family and the default period.
    #[must_use]
    pub fn new(name: impl Into<String>, uri: Uri, password: Password) -> Self {
        Self {
            name: name.into(),
            uri,
            password,
            domain: Domain::Any,
            verify: VerifyLevel::STRICT,
            period: DEFAULT_PERIOD,
            data: Mutex::new(Data::default()),
            state: watch::Sender::new(WorkerState::Stopped),
            abort: AbortHandle::new(),
        }
    }

    /// Sets the address family preference.
    #[must_use]
    pub const fn with_domain(mut self, domain: Domain) -> Self {
        self.domain = domain;
        self
    }

    /// Sets the certificate verification level.
    #[must_use]
    pub const fn with_verify(mut self, verify: VerifyLevel) -> Self {
        self.verify = verify;
        self
    }

    /// Sets the polling period.
    #[must_use]
    pub const fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Returns the account name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the connection URI.
    #[must_use]
    pub const fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the store key: the canonical URI string.
    #[must_use]
    pub fn key(&self) -> String {
        self.uri.to_string()
    }

    /// Returns the password.
    #[must_use]
    pub const fn password(&self) -> &Password {
        &self.password
    }

    /// Returns the address family preference.
    #[must_use]
    pub const fn domain(&self) -> Domain {
        self.domain
    }

    /// Returns the certificate verification level.
    #[must_use]
    pub const fn verify(&self) -> VerifyLevel {
        self.verify
    }

    /// Returns the polling period.
    #[must_use]
    pub const fn period(&self) -> Duration {
        self.period
    }

    // State machine

    /// Returns the worker state.
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Subscribes to worker state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Moves `Stopped → Running` and re-arms the abort signal. Returns
    /// false, changing nothing, in any other state.
    pub fn try_start(&self) -> bool {
        let started = self.state.send_if_modified(|state| {
            if *state == WorkerState::Stopped {
                *state = WorkerState::Running;
                true
            } else {
                false
            }
        });
        if started {
            self.abort.reset();
        }
        started
    }

    /// Returns the signal that unblocks this mailbox's transport.
    #[must_use]
    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.signal()
    }

    /// Returns true once [`Mailbox::exit`] has been requested.
    #[must_use]
    pub fn is_exiting(&self) -> bool {
        self.state() == WorkerState::Exiting
    }

    /// Marks the worker as gone.
    pub(crate) fn finish(&self) {
        self.lock().idle = false;
        self.state.send_replace(WorkerState::Stopped);
    }

    /// Stops the worker: moves `Running → Exiting`, forces the transport
    /// down, and waits until the worker reports `Stopped`.
    pub async fn exit(&self) {
        let exiting = self.state.send_if_modified(|state| {
            if *state == WorkerState::Running {
                *state = WorkerState::Exiting;
                true
            } else {
                false
            }
        });
        if exiting {
            debug!(mailbox = %self.name, "stopping worker");
            self.abort.abort();
        }
        let mut state = self.state.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = state.wait_for(|s| *s == WorkerState::Stopped).await;
    }

    // Data

    fn lock(&self) -> MutexGuard<'_, Data> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a copy of the current mail list.
    #[must_use]
    pub fn mails(&self) -> Vec<Mail> {
        self.lock().mails.clone()
    }

    /// Returns the ignore list in sorted order.
    #[must_use]
    pub fn ignored(&self) -> Vec<String> {
        self.lock().ignore.iter().cloned().collect()
    }

    /// Returns the result of the last fetch.
    #[must_use]
    pub fn recent(&self) -> Recent {
        self.lock().recent.clone()
    }

    /// Returns the number of unread mails in the list.
    #[must_use]
    pub fn unseen(&self) -> usize {
        self.lock().mails.iter().filter(|m| !m.read).count()
    }

    /// Returns true while the worker waits in IDLE.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.lock().idle
    }

    pub(crate) fn set_idle(&self, idle: bool) {
        self.lock().idle = idle;
    }

    /// Replaces the ignore list, typically with what the store holds.
    pub fn set_ignored(&self, uids: impl IntoIterator<Item = String>) {
        self.lock().ignore = uids.into_iter().collect();
    }

    /// Moves every uid of the mail list into the ignore list and returns the
    /// new ignore list, so nothing currently shown is reported again.
    pub fn ignore_current(&self) -> Vec<String> {
        let mut data = self.lock();
        let uids: Vec<String> = data.mails.iter().map(|m| m.uid.clone()).collect();
        data.ignore.extend(uids);
        data.ignore.iter().cloned().collect()
    }

    /// Returns copies of the mail list and ignore list for a fetch.
    pub(crate) fn snapshot(&self) -> (Vec<Mail>, BTreeSet<String>) {
        let data = self.lock();
        (data.mails.clone(), data.ignore.clone())
    }

    /// Stores the outcome of a successful fetch and returns its recent
    /// count. `base` is the ignore list the poll started from; uids ignored
    /// since then are kept if the server still lists them.
    pub(crate) fn update(&self, base: &BTreeSet<String>, mut poll: Poll) -> usize {
        let mut data = self.lock();
        poll.absorb_ignored(data.ignore.difference(base));
        data.mails = poll.mails;
        data.ignore = poll.ignore;
        data.recent = Recent::Count(poll.recent);
        poll.recent
    }

    /// Records a failed fetch; the lists are kept.
    pub(crate) fn fail(&self, reason: String) {
        self.lock().recent = Recent::Failed(reason);
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
    use std::sync::Arc;

    use super::*;

    fn mailbox() -> Mailbox {
        let uri: Uri = "imap://alice@imap.example.com".parse().unwrap();
        Mailbox::new("work", uri, Password::new("hunter2"))
    }

    #[test]
    fn test_password_redacted() {
        let mailbox = mailbox();
        assert_eq!(mailbox.password().expose(), "hunter2");
        assert!(!format!("{:?}", mailbox.password()).contains("hunter2"));
        assert!(!format!("{mailbox:?}").contains("hunter2"));
    }

    #[test]
    fn test_single_start() {
        let mailbox = mailbox();
        assert_eq!(mailbox.state(), WorkerState::Stopped);
        assert!(mailbox.try_start());
        assert!(!mailbox.try_start());
        assert_eq!(mailbox.state(), WorkerState::Running);
        mailbox.finish();
        assert!(mailbox.try_start());
    }

    #[test]
    fn test_concurrent_starts() {
        let mailbox = Arc::new(mailbox());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let mailbox = Arc::clone(&mailbox);
                std::thread::spawn(move || mailbox.try_start())
            })
            .collect();
        let started = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|&s| s)
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn test_exit_stopped_returns() {
        let mailbox = mailbox();
        mailbox.exit().await;
        assert_eq!(mailbox.state(), WorkerState::Stopped);
        assert!(!mailbox.abort_signal().is_aborted());
    }

    #[tokio::test]
    async fn test_exit_waits_for_worker() {
        let mailbox = Arc::new(mailbox());
        assert!(mailbox.try_start());
        let signal = mailbox.abort_signal();

        let worker = {
            let mailbox = Arc::clone(&mailbox);
            tokio::spawn(async move {
                let mut state = mailbox.watch_state();
                state
                    .wait_for(|s| *s == WorkerState::Exiting)
                    .await
                    .unwrap();
                mailbox.finish();
            })
        };

        mailbox.exit().await;
        assert_eq!(mailbox.state(), WorkerState::Stopped);
        assert!(signal.is_aborted());
        worker.await.unwrap();

        // the next run starts with a fresh signal
        assert!(mailbox.try_start());
        assert!(!mailbox.abort_signal().is_aborted());
    }

    #[test]
    fn test_ignore_current() {
        let mailbox = mailbox();
        mailbox.set_ignored(["9".to_string()]);
        let mails = vec![
            Mail::from_header("1", b"Subject: a\r\n\r\n"),
            Mail::from_header("2", b"Subject: b\r\nStatus: R\r\n\r\n"),
        ];
        let (_, base) = mailbox.snapshot();
        let poll = Poll {
            mails,
            ignore: base.clone(),
            recent: 2,
            ..Poll::default()
        };
        assert_eq!(mailbox.update(&base, poll), 2);
        assert_eq!(mailbox.unseen(), 1);
        assert_eq!(mailbox.recent(), Recent::Count(2));

        assert_eq!(mailbox.ignore_current(), vec!["1", "2", "9"]);
        assert_eq!(mailbox.ignored(), vec!["1", "2", "9"]);
    }

    #[test]
    fn test_update_keeps_uids_ignored_during_poll() {
        let mailbox = mailbox();
        let (_, base) = mailbox.snapshot();
        mailbox.set_ignored(["1".to_string(), "gone".to_string()]);

        let poll = Poll {
            mails: vec![Mail::from_header("1", b"Subject: a\r\n\r\n")],
            seen: ["1".to_string()].into(),
            ..Poll::default()
        };
        mailbox.update(&base, poll);
        assert_eq!(mailbox.ignored(), vec!["1"]);
        assert_eq!(mailbox.mails().len(), 1);

        // POP3 default mode leaves ignored uids out of the mail list
        let (_, base) = mailbox.snapshot();
        mailbox.set_ignored(["1".to_string(), "2".to_string()]);
        let poll = Poll {
            mails: vec![Mail::from_header("2", b"Subject: b\r\n\r\n")],
            ignore: base.clone(),
            seen: ["1".to_string(), "2".to_string()].into(),
            hides_ignored: true,
            ..Poll::default()
        };
        mailbox.update(&base, poll);
        assert_eq!(mailbox.ignored(), vec!["1", "2"]);
        assert!(mailbox.mails().is_empty());
        assert_eq!(mailbox.unseen(), 0);
    }

    #[test]
    fn test_fail_keeps_lists() {
        let mailbox = mailbox();
        let poll = Poll {
            mails: vec![Mail::from_header("1", b"\r\n")],
            recent: 1,
            ..Poll::default()
        };
        mailbox.update(&BTreeSet::new(), poll);
        mailbox.fail("connection refused".to_string());
        assert!(mailbox.recent().is_failed());
        assert_eq!(mailbox.mails().len(), 1);
    }
}
