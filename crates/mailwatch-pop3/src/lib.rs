//! # mailwatch-pop3
//!
//! POP3 client for new-mail checks (RFC 1939, with CAPA from RFC 2449 and
//! STLS from RFC 2595), running over a [`mailwatch_net::Transport`].
//!
//! ## Features
//!
//! - **Type-state connection management**: UIDL and TOP only exist once
//!   the session is authenticated
//! - **Capability negotiation**: CAPA is optional; when present, UIDL and
//!   USER are required and STLS is used if offered
//! - **Header-only retrieval**: `TOP n 0` with dot-stuffing removed
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailwatch_net::{AbortSignal, Domain, Timeouts, Transport};
//! use mailwatch_pop3::{Client, Config};
//!
//! let transport = Transport::connect(
//!     "pop.example.com", 110, Domain::Any, Timeouts::default(), AbortSignal::never(),
//! ).await?;
//! let client = Client::from_transport(transport, Config::new("pop.example.com")).await?;
//! let mut client = client.login("user", "password").await?;
//!
//! for entry in client.uidl().await? {
//!     let header = client.top(entry.number, 0).await?;
//! }
//! client.quit().await?;
//! ```
//!
//! ## Connection States
//!
//! ```text
//! ┌───────────────┐
//! │ Authorization │ ─── login() ───→ Transaction ─── quit() ───→ closed
//! └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`command`]: POP3 command builders
//! - [`connection`]: Connection management and type-state client
//! - [`parser`]: Status line and listing parser
//! - [`types`]: Core POP3 types (capabilities, replies, UIDL entries)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod parser;
pub mod types;

pub use command::Command;
pub use connection::{Authorization, Client, Config, ConfigBuilder, Transaction};
pub use error::{Error, Result};
pub use types::{Capabilities, Capability, Reply, Status, UidEntry};
