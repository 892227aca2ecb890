//! Core POP3 types.

mod capability;
mod reply;

pub use capability::{Capabilities, Capability};
pub use reply::{Reply, Status, UidEntry};
