//! IMAP response parser.
//!
//! A logical response line (literals already spliced in by the reader) is
//! split into a tag, a kind and the remaining data:
//!
//! ```text
//! A001 OK [READ-ONLY] EXAMINE completed   tag "A001", kind "OK"
//! * 12 EXISTS                             tag "*", number 12, kind "EXISTS"
//! + idling                                tag "+", kind "", data "idling"
//! ```
//!
//! A bare number after the tag is taken as the response's data and the next
//! token becomes its kind. Parsing is sans-I/O.
//!
//! # Example
//!
//! ```
//! use mailwatch_imap::parser::Response;
//!
//! let response = Response::parse(b"* 3 EXISTS").unwrap();
//! assert_eq!(response.kind, "EXISTS");
//! assert_eq!(response.number, Some(3));
//! ```

mod fetch;

use mailwatch_mime::{Token, Tokenizer};

pub use fetch::{FetchData, parse_fetch, parse_search};

use crate::types::Status;
use crate::{Error, Result};

/// One logical server response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// `*` for untagged data, `+` for continuations, else a command tag.
    pub tag: String,
    /// Upper-cased response kind (`OK`, `EXISTS`, `FETCH`, ...). Empty for
    /// continuations.
    pub kind: String,
    /// Numeric data preceding the kind (`* 12 EXISTS`).
    pub number: Option<u32>,
    /// Everything after the kind, literals included verbatim.
    pub data: Vec<u8>,
}

impl Response {
    /// Parses one logical response line.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the line has no tag or, for a tagged or
    /// untagged response, no kind.
    pub fn parse(line: &[u8]) -> Result<Self> {
        let mut tokenizer = Tokenizer::imap(line);

        let tag = match tokenizer.next_token(&[]) {
            Some(Token::Atom(tag)) => String::from_utf8_lossy(tag).into_owned(),
            _ => {
                return Err(Error::Parse {
                    position: tokenizer.position(),
                    message: "missing tag".to_string(),
                });
            }
        };

        if tag == "+" {
            tokenizer.skip_whitespace();
            return Ok(Self {
                tag,
                kind: String::new(),
                number: None,
                data: tokenizer.remaining().to_vec(),
            });
        }

        let mut number = None;
        let mut kind = next_atom(&mut tokenizer)?;
        if let Ok(n) = kind.parse::<u32>() {
            number = Some(n);
            kind = next_atom(&mut tokenizer)?;
        }

        tokenizer.skip_whitespace();
        Ok(Self {
            tag,
            kind: kind.to_ascii_uppercase(),
            number,
            data: tokenizer.remaining().to_vec(),
        })
    }

    /// Returns true for untagged (`*`) responses.
    #[must_use]
    pub fn is_untagged(&self) -> bool {
        self.tag == "*"
    }

    /// Returns true for continuation requests.
    #[must_use]
    pub fn is_continuation(&self) -> bool {
        self.tag == "+"
    }

    /// Returns the status if the kind is a status response.
    #[must_use]
    pub fn status(&self) -> Option<Status> {
        Status::parse(&self.kind)
    }

    /// Returns the bracketed response code (`[CAPABILITY ...]`) without the
    /// brackets.
    #[must_use]
    pub fn code(&self) -> Option<&[u8]> {
        let rest = self.data.strip_prefix(b"[")?;
        let close = rest.iter().position(|&b| b == b']')?;
        Some(&rest[..close])
    }

    /// Returns the data as text, lossily decoded.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

fn next_atom(tokenizer: &mut Tokenizer<'_>) -> Result<String> {
    match tokenizer.next_token(&[]) {
        Some(Token::Atom(atom)) => Ok(String::from_utf8_lossy(atom).into_owned()),
        _ => Err(Error::Parse {
            position: tokenizer.position(),
            message: "missing response kind".to_string(),
        }),
    }
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
    fn test_tagged_ok() {
        let response = Response::parse(b"A001 OK [READ-ONLY] EXAMINE completed").unwrap();
        assert_eq!(response.tag, "A001");
        assert_eq!(response.kind, "OK");
        assert_eq!(response.number, None);
        assert_eq!(response.status(), Some(Status::Ok));
        assert_eq!(response.code(), Some(&b"READ-ONLY"[..]));
        assert_eq!(response.text(), "[READ-ONLY] EXAMINE completed");
    }

    #[test]
    fn test_numeric_promotion() {
        let response = Response::parse(b"* 12 EXISTS").unwrap();
        assert!(response.is_untagged());
        assert_eq!(response.kind, "EXISTS");
        assert_eq!(response.number, Some(12));
        assert!(response.data.is_empty());
        assert_eq!(response.status(), None);
    }

    #[test]
    fn test_lowercase_kind() {
        let response = Response::parse(b"* search 4 9").unwrap();
        assert_eq!(response.kind, "SEARCH");
        assert_eq!(response.data, b"4 9");
    }

    #[test]
    fn test_capability_code() {
        let response =
            Response::parse(b"* OK [CAPABILITY IMAP4rev1 STARTTLS] Dovecot ready.").unwrap();
        assert_eq!(response.code(), Some(&b"CAPABILITY IMAP4rev1 STARTTLS"[..]));
    }

    #[test]
    fn test_continuation() {
        let response = Response::parse(b"+ idling").unwrap();
        assert!(response.is_continuation());
        assert_eq!(response.kind, "");
        assert_eq!(response.data, b"idling");

        let bare = Response::parse(b"+").unwrap();
        assert!(bare.is_continuation());
        assert!(bare.data.is_empty());
    }

    #[test]
    fn test_literal_kept_in_data() {
        let line = b"* 1 FETCH (UID 7 BODY[HEADER.FIELDS (SUBJECT)] {11}\r\nSubject: x\n)";
        let response = Response::parse(line).unwrap();
        assert_eq!(response.kind, "FETCH");
        assert_eq!(response.number, Some(1));
        assert!(response.data.ends_with(b"Subject: x\n)"));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(Response::parse(b""), Err(Error::Parse { .. })));
        assert!(matches!(Response::parse(b"A001"), Err(Error::Parse { .. })));
        assert!(matches!(Response::parse(b"* 5"), Err(Error::Parse { .. })));
    }

    proptest::proptest! {
        #[test]
        fn parse_never_panics(line in proptest::collection::vec(proptest::prelude::any::<u8>(), 0..200)) {
            let _ = Response::parse(&line);
        }
    }
}
