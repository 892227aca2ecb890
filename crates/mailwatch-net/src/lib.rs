//! # mailwatch-net
//!
//! Transport layer for the mailwatch retrieval engine.
//!
//! ## Features
//!
//! - **Transport**: TCP connect with address family preference, line and
//!   exact-length reads, per-call timeouts and abort
//! - **Secure channel**: TLS client over any byte stream (implicit TLS or
//!   STARTTLS/STLS upgrade) built on `rustls`
//! - **Certificate policy**: verification levels that tolerate selected
//!   chain failures but never a host name mismatch
//! - **IDN**: punycode host name conversion
//!
//! ## Example
//!
//! ```ignore
//! use mailwatch_net::{AbortHandle, Domain, Timeouts, Transport, VerifyLevel};
//!
//! let abort = AbortHandle::new();
//! let transport = Transport::connect(
//!     "imap.example.com",
//!     993,
//!     Domain::Any,
//!     Timeouts::default(),
//!     abort.signal(),
//! )
//! .await?;
//! let mut transport = transport.upgrade("imap.example.com", VerifyLevel::STRICT).await?;
//! let greeting = transport.read_line(1024).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod abort;
mod config;
mod error;

pub mod punycode;
pub mod tls;
pub mod transport;
pub mod verify;

pub use abort::{AbortHandle, AbortSignal};
pub use config::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_IO_TIMEOUT, Domain, Timeouts, VerifyLevel};
pub use error::{Error, Result};
pub use tls::SecureChannel;
pub use transport::{Socket, Transport};
