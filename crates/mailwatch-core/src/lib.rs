//! # mailwatch-core
//!
//! Mailbox model and fetch scheduling for `mailwatch`.
//!
//! This crate provides:
//! - [`Uri`]: `scheme://[user@]host[:port][/path][#fragment]` connection strings
//! - [`Mail`]: new-mail records built from header blocks
//! - [`Mailbox`]: per-account state with a single-worker state machine
//! - [`Backend`]: IMAP4/POP3 dispatch over the protocol crates
//! - [`Scheduler`]: periodic polling, IDLE push, backoff and aggregate counts
//! - [`IgnoreStore`]: persistence of already-notified uids
//! - [`Config`]: the JSON configuration file
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use mailwatch_core::{Config, JsonFileStore, Scheduler};
//!
//! let config = Config::load("mailwatch.json".as_ref())?;
//! let tick = config.tick();
//! let store = Arc::new(JsonFileStore::new(JsonFileStore::default_path()?));
//! let scheduler = Scheduler::new(config.into_mailboxes()?, store);
//!
//! let mut summary = scheduler.subscribe();
//! tokio::spawn({
//!     let scheduler = scheduler.clone();
//!     async move { scheduler.run(tick).await }
//! });
//! while summary.changed().await.is_ok() {
//!     println!("{:?}", *summary.borrow());
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod backend;
pub mod config;
mod error;
pub mod mail;
pub mod mailbox;
pub mod scheduler;
pub mod store;
pub mod uri;
mod worker;

pub use backend::Backend;
pub use config::{Config, MailboxConfig, ValidationError};
pub use error::{Error, Result};
pub use mail::Mail;
pub use mailbox::{Mailbox, Password, Recent, WorkerState};
pub use scheduler::{FetchStatus, Scheduler, Summary};
pub use store::{IgnoreStore, JsonFileStore, MemoryStore, StoreError};
pub use uri::{Scheme, Uri, UriError};
