//! # mailwatch-imap
//!
//! IMAP4 client for new-mail checks (RFC 9051 `IMAP4rev2`, RFC 3501
//! `IMAP4rev1`), running over a [`mailwatch_net::Transport`].
//!
//! ## Features
//!
//! - **Session state machine**: `NotAuthenticated` → `Authenticated` →
//!   `Selected`, with PREAUTH and LOGOUT handled
//! - **Opportunistic STARTTLS**: plaintext sessions are upgraded when the
//!   server offers it, and capabilities are re-read afterwards
//! - **Read-only access**: EXAMINE, `UID SEARCH UNSEEN` and
//!   `BODY.PEEK` header fetches never change message flags
//! - **IDLE support**: Real-time push notifications via RFC 2177
//! - **Literal-aware reader**: `{n}` literals are spliced into the logical
//!   response line, with size limits
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailwatch_imap::{Client, Config, IdleOutcome, Mailbox, IDLE_TIMEOUT};
//! use mailwatch_net::{AbortSignal, Domain, Timeouts, Transport};
//!
//! let transport = Transport::connect(
//!     "imap.example.com", 143, Domain::Any, Timeouts::default(), AbortSignal::never(),
//! ).await?;
//! let client = Client::from_transport(transport, Config::new("imap.example.com")).await?;
//! let mut client = client.login("user@example.com", "password").await?;
//!
//! client.examine(&Mailbox::inbox()).await?;
//! for uid in client.search_unseen().await? {
//!     let header = client.fetch_headers(uid).await?;
//! }
//!
//! if client.supports_idle() {
//!     if let IdleOutcome::Event(event) = client.idle(IDLE_TIMEOUT).await? {
//!         println!("mailbox changed: {event:?}");
//!     }
//! }
//! client.logout().await?;
//! ```
//!
//! ## Modules
//!
//! - [`command`]: IMAP command builders and tags
//! - [`connection`]: Session, framing and IDLE
//! - [`parser`]: Sans-I/O response parser
//! - [`types`]: Capabilities, status and mailbox names

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::{Command, TagGenerator};
pub use connection::{
    Client, Config, ConfigBuilder, FramedStream, IDLE_TIMEOUT, IdleEvent, IdleOutcome,
    SessionState,
};
pub use error::{Error, Result};
pub use parser::Response;
pub use types::{Capabilities, Capability, Mailbox, MailboxStatus, Status};
