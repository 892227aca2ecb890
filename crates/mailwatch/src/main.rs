//! `mailwatch` - watches IMAP and POP3 mailboxes for new mail.
//!
//! Runs the fetch scheduler over the mailboxes of a JSON configuration file
//! and logs the aggregate counts after every cycle.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use mailwatch_core::{Config, FetchStatus, JsonFileStore, Recent, Scheduler, Summary};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mailwatch=info,mailwatch_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config_path = cli.config_path()?;
    let config = Config::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let tick = config.tick();

    let store_path = match cli.store {
        Some(path) => path,
        None => JsonFileStore::default_path()?,
    };
    let mailboxes = config.into_mailboxes()?;
    if mailboxes.is_empty() {
        bail!("{} lists no mailboxes", config_path.display());
    }
    info!(
        mailboxes = mailboxes.len(),
        store = %store_path.display(),
        "starting mailwatch"
    );
    let scheduler = Scheduler::new(mailboxes, Arc::new(JsonFileStore::new(store_path)));

    if cli.once {
        while scheduler.fetch(true) == FetchStatus::Deferred {
            tokio::time::sleep(mailwatch_core::scheduler::RETRY_DEFERRED).await;
        }
        let summary = scheduler.settled().await;
        print_mailboxes(&scheduler, summary);
        scheduler.shutdown().await;
        return Ok(());
    }

    let logger = tokio::spawn(log_summaries(scheduler.clone()));
    tokio::select! {
        () = scheduler.run(tick) => {}
        result = tokio::signal::ctrl_c() => {
            result.context("waiting for Ctrl-C")?;
            info!("interrupted, stopping workers");
        }
    }
    logger.abort();
    scheduler.shutdown().await;
    Ok(())
}

/// Logs every published summary, plus the new mail of each mailbox.
async fn log_summaries(scheduler: Scheduler) {
    let mut summaries = scheduler.subscribe();
    while summaries.changed().await.is_ok() {
        let summary = *summaries.borrow_and_update();
        info!(
            recent = summary.recent,
            unseen = summary.unseen,
            failed = summary.failed,
            "fetch cycle complete"
        );
        for mailbox in scheduler.mailboxes() {
            match mailbox.recent() {
                Recent::Count(0) | Recent::Pending => {}
                Recent::Count(n) => {
                    for mail in mailbox.mails().iter().filter(|m| !m.read) {
                        info!(
                            mailbox = %mailbox.name(),
                            from = %mail.from_display(),
                            subject = %mail.subject,
                            "unread"
                        );
                    }
                    info!(mailbox = %mailbox.name(), recent = n, "new mail");
                }
                Recent::Failed(reason) => warn!(mailbox = %mailbox.name(), %reason, "fetch failed"),
            }
        }
    }
}

fn print_mailboxes(scheduler: &Scheduler, summary: Summary) {
    for mailbox in scheduler.mailboxes() {
        match mailbox.recent() {
            Recent::Failed(reason) => println!("{}: failed: {reason}", mailbox.name()),
            recent => println!(
                "{}: {} new, {} unread",
                mailbox.name(),
                recent.count().unwrap_or(0),
                mailbox.unseen()
            ),
        }
        for mail in mailbox.mails() {
            let date = mail
                .timestamp()
                .map(|date| date.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!("  {date:16}  {:30}  {}", mail.from_display(), mail.subject);
        }
    }
    println!(
        "total: {} new, {} unread, {} failed",
        summary.recent, summary.unseen, summary.failed
    );
}
