//! FETCH and SEARCH response data.

use mailwatch_mime::{Token, Tokenizer};

/// Items of interest in a FETCH response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchData {
    /// The message UID, if present.
    pub uid: Option<u32>,
    /// The body section payload (a literal or quoted string), if present.
    pub section: Option<Vec<u8>>,
}

/// Parses the parenthesised attribute list of a FETCH response.
///
/// Unknown attributes and their values are skipped. A `NIL` section is
/// reported as absent.
#[must_use]
pub fn parse_fetch(data: &[u8]) -> FetchData {
    let mut tokenizer = Tokenizer::imap(data);
    let mut fetch = FetchData::default();

    while let Some(token) = tokenizer.next_token(b"()") {
        let Token::Atom(name) = token else {
            continue;
        };
        if name.eq_ignore_ascii_case(b"UID") {
            if let Some(Token::Atom(value)) = tokenizer.next_token(b"()") {
                fetch.uid = std::str::from_utf8(value).ok().and_then(|v| v.parse().ok());
            }
        } else if is_section(name) {
            fetch.section = match tokenizer.next_token(b"()") {
                Some(Token::Literal(bytes)) => Some(bytes.to_vec()),
                Some(Token::Quoted(bytes)) => Some(bytes),
                _ => None,
            };
        }
    }

    fetch
}

/// `BODY[...]`, `BODY.PEEK[...]` or `RFC822.HEADER`, with an optional
/// `<origin>` suffix.
fn is_section(name: &[u8]) -> bool {
    let upper = name.to_ascii_uppercase();
    upper.starts_with(b"BODY[") || upper.starts_with(b"BODY.PEEK[") || upper == b"RFC822.HEADER"
}

/// Parses the message numbers of a SEARCH response, ignoring anything that
/// is not a number (such as a trailing `(MODSEQ n)`).
#[must_use]
pub fn parse_search(data: &[u8]) -> Vec<u32> {
    let mut tokenizer = Tokenizer::imap(data);
    let mut numbers = Vec::new();
    let mut depth = 0usize;

    while let Some(token) = tokenizer.next_token(b"()") {
        match token {
            Token::Delimiter(b'(') => depth += 1,
            Token::Delimiter(_) => depth = depth.saturating_sub(1),
            Token::Atom(atom) if depth == 0 => {
                if let Some(n) = std::str::from_utf8(atom).ok().and_then(|a| a.parse().ok()) {
                    numbers.push(n);
                }
            }
            _ => {}
        }
    }

    numbers
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
    fn test_fetch_with_literal() {
        let data = b"(UID 42 BODY[HEADER.FIELDS (SUBJECT FROM DATE)] {21}\r\nSubject: Hi there\r\n\r\n)";
        let fetch = parse_fetch(data);
        assert_eq!(fetch.uid, Some(42));
        assert_eq!(fetch.section.unwrap(), b"Subject: Hi there\r\n\r\n");
    }

    #[test]
    fn test_fetch_uid_after_section() {
        let data = b"(BODY[HEADER.FIELDS (SUBJECT)] {4}\r\n(x)) UID 9 FLAGS (\\Seen))";
        let fetch = parse_fetch(data);
        assert_eq!(fetch.section.unwrap(), b"(x))");
        assert_eq!(fetch.uid, Some(9));
    }

    #[test]
    fn test_fetch_quoted_and_nil() {
        let fetch = parse_fetch(b"(UID 3 BODY[HEADER] \"Subject: q\")");
        assert_eq!(fetch.section.unwrap(), b"Subject: q");

        let fetch = parse_fetch(b"(UID 3 BODY[HEADER] NIL)");
        assert_eq!(fetch.section, None);
    }

    #[test]
    fn test_fetch_flags_only() {
        let fetch = parse_fetch(b"(FLAGS (\\Seen \\Answered))");
        assert_eq!(fetch, FetchData::default());
    }

    #[test]
    fn test_search() {
        assert_eq!(parse_search(b"4 9 1201"), vec![4, 9, 1201]);
        assert_eq!(parse_search(b""), Vec::<u32>::new());
        assert_eq!(parse_search(b"2 84 (MODSEQ 917162500)"), vec![2, 84]);
    }
}
