//! One fetch cycle for one mailbox.
//!
//! A worker loads the ignore list, logs in, polls once, saves the ignore
//! list and reports to the scheduler. If the session supports IDLE it then
//! stays connected, polling again after every change, until the mailbox is
//! told to exit or the session fails. The mailbox returns to `Stopped` when
//! the worker ends, however it ends.

use std::sync::Arc;

use mailwatch_imap::{IDLE_TIMEOUT, IdleOutcome};
use tracing::{debug, warn};

use crate::backend::Backend;
use crate::mailbox::Mailbox;
use crate::scheduler::{Outcome, Reporter};
use crate::store::IgnoreStore;
use crate::{Error, Result};

/// Returns the mailbox to `Stopped` on drop.
struct Finish(Arc<Mailbox>);

impl Drop for Finish {
    fn drop(&mut self) {
        self.0.finish();
    }
}

pub(crate) async fn run(mailbox: Arc<Mailbox>, store: Arc<dyn IgnoreStore>, mut reporter: Reporter) {
    let _finish = Finish(Arc::clone(&mailbox));

    let mut session = None;
    match cycle(&mailbox, store.as_ref(), &mut reporter, &mut session).await {
        Ok(()) => {}
        Err(e) if e.is_cancelled() => {
            debug!(mailbox = %mailbox.name(), "worker cancelled");
            reporter.report(Outcome::Cancelled);
        }
        Err(e) => {
            warn!(mailbox = %mailbox.name(), error = %e, "fetch failed");
            mailbox.fail(e.to_string());
            reporter.report(Outcome::Failed);
        }
    }

    if let Some(backend) = session
        && let Err(e) = backend.logout().await
    {
        debug!(mailbox = %mailbox.name(), error = %e, "logout failed");
    }
}

fn check_exit(mailbox: &Mailbox) -> Result<()> {
    if mailbox.is_exiting() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

async fn poll(backend: &mut Backend, mailbox: &Mailbox, store: &dyn IgnoreStore) -> Result<usize> {
    let recent = backend.fetch(mailbox).await?;
    store.save_ignore(&mailbox.key(), &mailbox.ignored())?;
    Ok(recent)
}

async fn cycle(
    mailbox: &Mailbox,
    store: &dyn IgnoreStore,
    reporter: &mut Reporter,
    session: &mut Option<Backend>,
) -> Result<()> {
    mailbox.set_ignored(store.load_ignore(&mailbox.key())?);
    check_exit(mailbox)?;

    let backend = session.insert(Backend::connect(mailbox).await?);
    poll(backend, mailbox, store).await?;

    let idle = backend.supports_idle();
    if idle {
        mailbox.set_idle(true);
    }
    reporter.report(Outcome::Fetched { idle });
    if !idle {
        return Ok(());
    }

    debug!(mailbox = %mailbox.name(), "waiting in IDLE");
    loop {
        check_exit(mailbox)?;
        match backend.idle(IDLE_TIMEOUT).await? {
            IdleOutcome::Event(event) => {
                debug!(mailbox = %mailbox.name(), ?event, "mailbox changed");
                check_exit(mailbox)?;
                poll(backend, mailbox, store).await?;
                reporter.report(Outcome::Fetched { idle: true });
            }
            IdleOutcome::Timeout => {}
        }
    }
}
