//! Periodic fetch scheduling across mailboxes.
//!
//! The scheduler owns one slot per mailbox recording how long it has been
//! since the mailbox last completed a fetch and how long it should wait
//! before the next one. Every [`Scheduler::fetch`] call advances the slots
//! by the time since the previous call and dispatches each due, stopped
//! mailbox to its own tokio task.
//!
//! Polling delays:
//!
//! - a failed fetch backs off exponentially from one second up to the
//!   mailbox's period;
//! - a successful fetch without IDLE waits one full period;
//! - a successful fetch that moved on to IDLE halves the delay, so a
//!   dropped IDLE session is re-established quickly.
//!
//! Once every dispatched worker has reported back, the aggregate counts are
//! published on a `watch` channel.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::mailbox::{Mailbox, Recent};
use crate::store::IgnoreStore;
use crate::{Result, worker};

/// Delay after the first failure; doubled for each further one.
pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// How long [`Scheduler::run`] waits before retrying a deferred fetch.
pub const RETRY_DEFERRED: Duration = Duration::from_millis(250);

/// Aggregate counts over all mailboxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Summary {
    /// New mails found by the last fetch of every mailbox.
    pub recent: usize,
    /// Unread mails currently listed.
    pub unseen: usize,
    /// Mailboxes whose last fetch failed.
    pub failed: usize,
}

/// Result of a [`Scheduler::fetch`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    /// This many workers were started.
    Dispatched(usize),
    /// Another fetch call held the scheduler; try again shortly.
    Deferred,
}

/// How a worker's fetch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    /// The poll succeeded; `idle` is set when the worker now waits in IDLE.
    Fetched {
        /// Whether the session moved on to IDLE.
        idle: bool,
    },
    /// The poll failed.
    Failed,
    /// The worker was stopped.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct Slot {
    elapsed: Duration,
    delay: Duration,
    failures: u32,
}

impl Slot {
    fn record(&mut self, outcome: Outcome, period: Duration) {
        self.elapsed = Duration::ZERO;
        match outcome {
            Outcome::Fetched { idle: false } => {
                self.failures = 0;
                self.delay = period;
            }
            Outcome::Fetched { idle: true } => {
                self.failures = 0;
                self.delay /= 2;
            }
            Outcome::Failed => {
                self.failures = self.failures.saturating_add(1);
                self.delay = backoff(self.failures, period);
            }
            Outcome::Cancelled => {}
        }
    }
}

/// Delay after `failures` consecutive failures: 1s, 2s, 4s, ... capped at
/// `period`.
fn backoff(failures: u32, period: Duration) -> Duration {
    let factor = 1u32
        .checked_shl(failures.saturating_sub(1))
        .unwrap_or(u32::MAX);
    INITIAL_BACKOFF.saturating_mul(factor).min(period)
}

#[derive(Debug)]
struct State {
    slots: Vec<Slot>,
    pending: usize,
    last_tick: Option<Instant>,
}

struct Shared {
    mailboxes: Vec<Arc<Mailbox>>,
    store: Arc<dyn IgnoreStore>,
    state: Mutex<State>,
    summary: watch::Sender<Summary>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn summarize(&self) -> Summary {
        let mut summary = Summary::default();
        for mailbox in &self.mailboxes {
            match mailbox.recent() {
                Recent::Count(n) => summary.recent += n,
                Recent::Failed(_) => summary.failed += 1,
                Recent::Pending => {}
            }
            summary.unseen += mailbox.unseen();
        }
        summary
    }

    /// Publishes the counts if no dispatched worker is still polling.
    /// Called with the state lock held.
    fn publish_if_settled(&self, state: &State) {
        if state.pending == 0 {
            let summary = self.summarize();
            debug!(?summary, "fetch cycle complete");
            self.summary.send_replace(summary);
        }
    }
}

/// Handle a worker uses to report back to the scheduler.
///
/// A worker that never reports (it panicked, or its task was dropped) is
/// counted as cancelled when the handle is dropped.
pub(crate) struct Reporter {
    shared: Arc<Shared>,
    index: usize,
    reported: bool,
}

impl Reporter {
    pub(crate) fn report(&mut self, outcome: Outcome) {
        let shared = &self.shared;
        let mut state = shared.lock();
        let period = shared.mailboxes[self.index].period();
        state.slots[self.index].record(outcome, period);
        if !self.reported {
            self.reported = true;
            state.pending = state.pending.saturating_sub(1);
        }
        shared.publish_if_settled(&state);
    }
}

impl Drop for Reporter {
    fn drop(&mut self) {
        if !self.reported {
            self.report(Outcome::Cancelled);
        }
    }
}

/// Schedules fetches for a fixed set of mailboxes.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("mailboxes", &self.shared.mailboxes)
            .field("state", &*self.shared.lock())
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    /// Creates a scheduler. Every mailbox is due on the first fetch.
    #[must_use]
    pub fn new(mailboxes: Vec<Arc<Mailbox>>, store: Arc<dyn IgnoreStore>) -> Self {
        let slots = vec![Slot::default(); mailboxes.len()];
        Self {
            shared: Arc::new(Shared {
                mailboxes,
                store,
                state: Mutex::new(State {
                    slots,
                    pending: 0,
                    last_tick: None,
                }),
                summary: watch::Sender::new(Summary::default()),
            }),
        }
    }

    /// Returns the scheduled mailboxes.
    #[must_use]
    pub fn mailboxes(&self) -> &[Arc<Mailbox>] {
        &self.shared.mailboxes
    }

    /// Subscribes to the aggregate counts published after each cycle.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Summary> {
        self.shared.summary.subscribe()
    }

    /// Computes the aggregate counts now.
    #[must_use]
    pub fn summary(&self) -> Summary {
        self.shared.summarize()
    }

    /// Dispatches every mailbox that is due (or every mailbox, if `force`)
    /// and currently stopped. Mailboxes waiting in IDLE are skipped.
    ///
    /// Never blocks: if another call is dispatching right now the result is
    /// [`FetchStatus::Deferred`] and nothing changes.
    ///
    /// Must be called from within a tokio runtime.
    pub fn fetch(&self, force: bool) -> FetchStatus {
        let mut state = match self.shared.state.try_lock() {
            Ok(state) => state,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return FetchStatus::Deferred,
        };

        let now = Instant::now();
        let elapsed = state
            .last_tick
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        state.last_tick = Some(now);

        let mut dispatched = 0;
        for (index, mailbox) in self.shared.mailboxes.iter().enumerate() {
            let slot = &mut state.slots[index];
            slot.elapsed = slot.elapsed.saturating_add(elapsed);
            if mailbox.is_idle() || (!force && slot.elapsed < slot.delay) {
                continue;
            }
            if !mailbox.try_start() {
                continue;
            }

            state.pending += 1;
            dispatched += 1;
            debug!(mailbox = %mailbox.name(), force, "dispatching");
            let reporter = Reporter {
                shared: Arc::clone(&self.shared),
                index,
                reported: false,
            };
            tokio::spawn(worker::run(
                Arc::clone(mailbox),
                Arc::clone(&self.shared.store),
                reporter,
            ));
        }
        FetchStatus::Dispatched(dispatched)
    }

    /// Calls [`Scheduler::fetch`] every `tick`, forever. A deferred fetch
    /// is retried after [`RETRY_DEFERRED`].
    pub async fn run(&self, tick: Duration) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            while self.fetch(false) == FetchStatus::Deferred {
                tokio::time::sleep(RETRY_DEFERRED).await;
            }
        }
    }

    /// Waits until no dispatched worker is still on its first poll and
    /// returns the counts.
    pub async fn settled(&self) -> Summary {
        let mut summary = self.subscribe();
        summary.mark_unchanged();
        if self.shared.lock().pending == 0 {
            return self.summary();
        }
        // The sender lives in `self.shared`, so the channel cannot close.
        let _ = summary.changed().await;
        *summary.borrow_and_update()
    }

    /// Moves the listed mails of `mailbox` into its ignore list and
    /// persists the list.
    ///
    /// # Errors
    ///
    /// Returns the store error if the list cannot be saved.
    pub fn ignore_current(&self, mailbox: &Mailbox) -> Result<()> {
        let uids = mailbox.ignore_current();
        self.shared.store.save_ignore(&mailbox.key(), &uids)?;
        info!(mailbox = %mailbox.name(), ignored = uids.len(), "marked current mails as seen");
        Ok(())
    }

    /// Stops every worker, forcing blocked transports down, and waits for
    /// all of them.
    pub async fn shutdown(&self) {
        for mailbox in &self.shared.mailboxes {
            mailbox.exit().await;
        }
        let pending = self.shared.lock().pending;
        if pending > 0 {
            warn!(pending, "workers still unreported after shutdown");
        }
        info!("scheduler stopped");
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
    use std::collections::BTreeSet;

    use super::*;
    use crate::backend::Poll;
    use crate::mailbox::Password;
    use crate::store::MemoryStore;

    const PERIOD: Duration = Duration::from_secs(300);

    fn scheduler(count: usize) -> Scheduler {
        let mailboxes = (0..count)
            .map(|i| {
                let uri = format!("imap://user{i}@127.0.0.1:1/").parse().unwrap();
                Arc::new(Mailbox::new(format!("m{i}"), uri, Password::default()).with_period(PERIOD))
            })
            .collect();
        Scheduler::new(mailboxes, Arc::new(MemoryStore::new()))
    }

    fn reporter(scheduler: &Scheduler, index: usize) -> Reporter {
        scheduler.shared.lock().pending += 1;
        Reporter {
            shared: Arc::clone(&scheduler.shared),
            index,
            reported: false,
        }
    }

    fn slot(scheduler: &Scheduler, index: usize) -> Slot {
        scheduler.shared.lock().slots[index]
    }

    #[test]
    fn test_backoff() {
        assert_eq!(backoff(1, PERIOD), Duration::from_secs(1));
        assert_eq!(backoff(2, PERIOD), Duration::from_secs(2));
        assert_eq!(backoff(5, PERIOD), Duration::from_secs(16));
        assert_eq!(backoff(9, PERIOD), Duration::from_secs(256));
        assert_eq!(backoff(10, PERIOD), PERIOD);
        assert_eq!(backoff(u32::MAX, PERIOD), PERIOD);
    }

    #[test]
    fn test_slot_delays() {
        let mut slot = Slot {
            elapsed: Duration::from_secs(7),
            ..Slot::default()
        };
        slot.record(Outcome::Failed, PERIOD);
        slot.record(Outcome::Failed, PERIOD);
        assert_eq!(slot.delay, Duration::from_secs(2));
        assert_eq!(slot.elapsed, Duration::ZERO);

        slot.record(Outcome::Fetched { idle: false }, PERIOD);
        assert_eq!(slot.delay, PERIOD);
        assert_eq!(slot.failures, 0);

        slot.record(Outcome::Fetched { idle: true }, PERIOD);
        assert_eq!(slot.delay, PERIOD / 2);

        slot.record(Outcome::Cancelled, PERIOD);
        assert_eq!(slot.delay, PERIOD / 2);

        slot.record(Outcome::Failed, PERIOD);
        assert_eq!(slot.delay, Duration::from_secs(1));
    }

    #[test]
    fn test_fetch_deferred_while_locked() {
        let scheduler = scheduler(1);
        let _held = scheduler.shared.lock();
        assert_eq!(scheduler.fetch(true), FetchStatus::Deferred);
    }

    #[test]
    fn test_fetch_skips_running_and_idle() {
        let scheduler = scheduler(2);
        assert!(scheduler.mailboxes()[0].try_start());
        scheduler.mailboxes()[1].set_idle(true);
        assert_eq!(scheduler.fetch(true), FetchStatus::Dispatched(0));
        assert_eq!(scheduler.shared.lock().pending, 0);
    }

    #[test]
    fn test_summary_published_when_settled() {
        let scheduler = scheduler(2);
        let mut summary = scheduler.subscribe();
        let mut first = reporter(&scheduler, 0);
        let mut second = reporter(&scheduler, 1);

        scheduler.mailboxes()[0].fail("refused".into());
        first.report(Outcome::Failed);
        assert!(!summary.has_changed().unwrap());
        assert_eq!(slot(&scheduler, 0).delay, INITIAL_BACKOFF);

        let poll = Poll {
            recent: 3,
            ..Poll::default()
        };
        scheduler.mailboxes()[1].update(&BTreeSet::new(), poll);
        second.report(Outcome::Fetched { idle: false });
        assert!(summary.has_changed().unwrap());
        assert_eq!(
            *summary.borrow_and_update(),
            Summary {
                recent: 3,
                unseen: 0,
                failed: 1
            }
        );
        assert_eq!(slot(&scheduler, 1).delay, PERIOD);
    }

    #[test]
    fn test_idle_polls_republish_and_halve_delay() {
        let scheduler = scheduler(1);
        let mut summary = scheduler.subscribe();
        let mut reporter = reporter(&scheduler, 0);

        reporter.report(Outcome::Fetched { idle: false });
        assert_eq!(slot(&scheduler, 0).delay, PERIOD);
        assert_eq!(summary.borrow_and_update().recent, 0);

        reporter.report(Outcome::Fetched { idle: true });
        assert_eq!(slot(&scheduler, 0).delay, PERIOD / 2);
        assert_eq!(scheduler.shared.lock().pending, 0);

        let poll = Poll {
            recent: 2,
            ..Poll::default()
        };
        scheduler.mailboxes()[0].update(&BTreeSet::new(), poll);
        reporter.report(Outcome::Fetched { idle: true });
        assert_eq!(slot(&scheduler, 0).delay, PERIOD / 4);
        assert!(summary.has_changed().unwrap());
        assert_eq!(summary.borrow_and_update().recent, 2);
    }

    #[test]
    fn test_dropped_reporter_counts_as_cancelled() {
        let scheduler = scheduler(1);
        drop(reporter(&scheduler, 0));
        assert_eq!(scheduler.shared.lock().pending, 0);
        assert_eq!(slot(&scheduler, 0), Slot::default());
    }

    #[tokio::test]
    async fn test_settled_without_workers() {
        let scheduler = scheduler(1);
        assert_eq!(scheduler.settled().await, Summary::default());
    }

    #[test]
    fn test_ignore_current_persists() {
        let scheduler = scheduler(1);
        let mailbox = &scheduler.mailboxes()[0];
        let poll = Poll {
            mails: vec![crate::Mail::from_header("5", b"Subject: x\r\n\r\n")],
            recent: 1,
            ..Poll::default()
        };
        mailbox.update(&BTreeSet::new(), poll);
        scheduler.ignore_current(mailbox).unwrap();
        assert_eq!(
            scheduler.shared.store.load_ignore(&mailbox.key()).unwrap(),
            vec!["5"]
        );
    }
}
