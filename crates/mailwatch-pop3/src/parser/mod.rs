//! POP3 response parser.
//!
//! Every response starts with a status line, `+OK text` or `-ERR text`.
//! Multi-line responses (CAPA, UIDL, TOP) follow it with data lines ended by
//! a line holding a single `.`; data lines that begin with `.` carry an
//! extra stuffed dot.

use crate::error::{Error, Result};
use crate::types::{Reply, Status, UidEntry};

/// Parses a status line.
///
/// # Errors
///
/// Returns a protocol error if the line starts with neither `+OK` nor
/// `-ERR`.
pub fn parse_reply(line: &[u8]) -> Result<Reply> {
    let (status, rest) = if let Some(rest) = strip_indicator(line, b"+OK") {
        (Status::Ok, rest)
    } else if let Some(rest) = strip_indicator(line, b"-ERR") {
        (Status::Err, rest)
    } else {
        return Err(Error::Protocol(format!(
            "Invalid status line: {}",
            String::from_utf8_lossy(line)
        )));
    };

    Ok(Reply {
        status,
        text: String::from_utf8_lossy(rest).trim().to_string(),
    })
}

/// Strips a status indicator that is followed by a space or ends the line.
fn strip_indicator<'a>(line: &'a [u8], indicator: &[u8]) -> Option<&'a [u8]> {
    let head = line.get(..indicator.len())?;
    if !head.eq_ignore_ascii_case(indicator) {
        return None;
    }
    let rest = &line[indicator.len()..];
    match rest.first() {
        None | Some(b' ') => Some(rest),
        Some(_) => None,
    }
}

/// Returns true for the line that ends a multi-line response.
#[must_use]
pub fn is_terminator(line: &[u8]) -> bool {
    line == b"."
}

/// Removes the stuffed leading dot from a data line.
#[must_use]
pub fn unstuff(line: &[u8]) -> &[u8] {
    line.strip_prefix(b".").unwrap_or(line)
}

/// Parses one UIDL data line: `<number> <uid>`.
///
/// # Errors
///
/// Returns a protocol error for a missing or non-numeric message number or
/// a missing uid.
pub fn parse_uidl_line(line: &[u8]) -> Result<UidEntry> {
    let text = String::from_utf8_lossy(line);
    let mut parts = text.split_ascii_whitespace();
    let number = parts
        .next()
        .and_then(|n| n.parse().ok())
        .ok_or_else(|| Error::Protocol(format!("Invalid UIDL line: {text}")))?;
    let uid = parts
        .next()
        .ok_or_else(|| Error::Protocol(format!("UIDL line without uid: {text}")))?;
    Ok(UidEntry {
        number,
        uid: uid.to_string(),
    })
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
    fn test_parse_ok_reply() {
        let reply = parse_reply(b"+OK POP3 server ready <1896.697170952@dbc.mtview.ca.us>").unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.text, "POP3 server ready <1896.697170952@dbc.mtview.ca.us>");
    }

    #[test]
    fn test_parse_bare_and_lowercase() {
        let reply = parse_reply(b"+OK").unwrap();
        assert!(reply.is_ok());
        assert_eq!(reply.text, "");

        let reply = parse_reply(b"-err invalid password").unwrap();
        assert_eq!(reply.status, Status::Err);
        assert_eq!(reply.text, "invalid password");
    }

    #[test]
    fn test_parse_invalid_status() {
        assert!(parse_reply(b"").is_err());
        assert!(parse_reply(b"OK fine").is_err());
        assert!(parse_reply(b"+OKAY").is_err());
        assert!(parse_reply(b"* OK imap").is_err());
    }

    #[test]
    fn test_terminator_and_unstuff() {
        assert!(is_terminator(b"."));
        assert!(!is_terminator(b".."));
        assert!(!is_terminator(b""));
        assert_eq!(unstuff(b"..hidden"), b".hidden");
        assert_eq!(unstuff(b".."), b".");
        assert_eq!(unstuff(b"Subject: x"), b"Subject: x");
    }

    #[test]
    fn test_parse_uidl_line() {
        let entry = parse_uidl_line(b"1 whqtswO00WBw418f9t5JxYwZ").unwrap();
        assert_eq!(entry.number, 1);
        assert_eq!(entry.uid, "whqtswO00WBw418f9t5JxYwZ");

        assert!(parse_uidl_line(b"x abc").is_err());
        assert!(parse_uidl_line(b"2").is_err());
    }
}
