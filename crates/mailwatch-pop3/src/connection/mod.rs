//! POP3 connection management with type-state pattern.

mod client;
mod config;

pub use client::{Authorization, Client, MAX_LINE_LENGTH, MAX_RESPONSE_SIZE, Transaction};
pub use config::{Config, ConfigBuilder};
