//! IMAP connection management.
//!
//! This module provides session handling for IMAP servers, including:
//! - Configuration (host, certificate policy, STARTTLS)
//! - Framed I/O for IMAP protocol
//! - Run-time session state machine
//! - IDLE support for real-time notifications

mod client;
mod config;
mod framed;
mod idle;

pub use client::{Client, SessionState};
pub use config::{Config, ConfigBuilder};
pub use framed::{FramedStream, MAX_LINE_LENGTH, MAX_LITERAL_SIZE};
pub use idle::{IDLE_TIMEOUT, IdleEvent, IdleOutcome};
