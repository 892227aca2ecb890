//! Core IMAP types.

mod capability;
mod mailbox;

pub use capability::{Capabilities, Capability, Status};
pub use mailbox::{Mailbox, MailboxStatus};
