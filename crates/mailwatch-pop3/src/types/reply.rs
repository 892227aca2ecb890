//! POP3 reply types.

use crate::{Error, Result};

/// Status indicator of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// `+OK`
    Ok,
    /// `-ERR`
    Err,
}

/// POP3 status reply (the first line of every response).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Positive or negative.
    pub status: Status,
    /// Text following the status indicator.
    pub text: String,
}

impl Reply {
    /// Returns true for `+OK`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self.status, Status::Ok)
    }

    /// Converts a negative reply into [`Error::Negative`].
    ///
    /// # Errors
    ///
    /// Returns the server's text for `-ERR`.
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            Status::Ok => Ok(self),
            Status::Err => Err(Error::Negative(self.text)),
        }
    }
}

/// One line of a UIDL listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidEntry {
    /// Message number, valid for this session only.
    pub number: u32,
    /// Server-assigned unique id, stable across sessions.
    pub uid: String,
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_into_result() {
        let ok = Reply {
            status: Status::Ok,
            text: "2 messages".to_string(),
        };
        assert!(ok.is_ok());
        assert_eq!(ok.clone().into_result().unwrap(), ok);

        let err = Reply {
            status: Status::Err,
            text: "no such message".to_string(),
        };
        assert!(matches!(
            err.into_result(),
            Err(Error::Negative(text)) if text == "no such message"
        ));
    }
}
