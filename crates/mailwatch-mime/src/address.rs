//! Address field parsing.
//!
//! Only the first address of a list is kept. Within it four slots are
//! collected: the bare address, the angle-bracketed address, the last
//! comment, and the quoted display name.

use crate::encoded_word;
use crate::tokenizer::{Token, Tokenizer};

/// A mailbox address with its display name, both decoded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Address {
    /// Display name, empty if none.
    pub name: String,
    /// Address (`local@domain`), empty if none.
    pub address: String,
}

impl Address {
    /// Parses the first address of a raw address field value.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        let mut list = Tokenizer::new(raw);
        let first = list.until(b",");

        let mut bare: Vec<&[u8]> = Vec::new();
        let mut angle: Option<Vec<u8>> = None;
        let mut comment = Vec::new();
        let mut quoted = Vec::new();

        let mut tokens = Tokenizer::new(first);
        while let Some(token) = tokens.next_token(b"<>") {
            match token {
                Token::Delimiter(b'<') => {
                    let inner = tokens.until(b">");
                    angle = Some(inner.iter().copied().filter(|b| !b.is_ascii_whitespace()).collect());
                    tokens.next_token(b">");
                }
                Token::Atom(atom) => bare.push(atom),
                Token::Quoted(text) => {
                    if quoted.is_empty() {
                        quoted = text;
                    }
                }
                Token::Comment(text) => comment = text,
                Token::Literal(_) | Token::Delimiter(_) => {}
            }
        }

        let phrase = bare.join(&b' ');
        let (address, name) = match angle {
            Some(angle) if !angle.is_empty() => {
                let name = [quoted, phrase, comment]
                    .into_iter()
                    .find(|slot| !slot.is_empty())
                    .unwrap_or_default();
                (angle, name)
            }
            _ if !phrase.is_empty() => {
                let name = if comment.is_empty() { quoted } else { comment };
                (phrase, name)
            }
            _ => {
                let name = if quoted.is_empty() { comment } else { quoted };
                (Vec::new(), name)
            }
        };

        Self {
            name: clean(&encoded_word::decode(&name)),
            address: encoded_word::decode(&address),
        }
    }

    /// Returns the display name, falling back to the address.
    #[must_use]
    pub fn display(&self) -> &str {
        if self.name.is_empty() {
            &self.address
        } else {
            &self.name
        }
    }

    /// Returns true if neither slot holds anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.address.is_empty()
    }
}

fn clean(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ")
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

    fn parse(raw: &str) -> (String, String) {
        let addr = Address::parse(raw.as_bytes());
        (addr.name, addr.address)
    }

    #[test]
    fn test_angle_with_quoted_name() {
        assert_eq!(
            parse("\"Doe, John\" <john@example.com>"),
            ("Doe, John".into(), "john@example.com".into())
        );
    }

    #[test]
    fn test_angle_with_phrase() {
        assert_eq!(
            parse("John Q. Public <jqp@example.com>"),
            ("John Q. Public".into(), "jqp@example.com".into())
        );
    }

    #[test]
    fn test_angle_with_comment_name() {
        assert_eq!(
            parse("<root@example.com> (Super User)"),
            ("Super User".into(), "root@example.com".into())
        );
    }

    #[test]
    fn test_bare_with_comment() {
        assert_eq!(
            parse("jdoe@example.com (John Doe)"),
            ("John Doe".into(), "jdoe@example.com".into())
        );
    }

    #[test]
    fn test_bare_only() {
        assert_eq!(parse("jdoe@example.com"), (String::new(), "jdoe@example.com".into()));
    }

    #[test]
    fn test_name_only() {
        assert_eq!(parse("\"Undisclosed\""), ("Undisclosed".into(), String::new()));
        assert_eq!(parse("(just a comment)"), ("just a comment".into(), String::new()));
    }

    #[test]
    fn test_first_of_list_only() {
        assert_eq!(
            parse("a@example.com, \"B\" <b@example.com>"),
            (String::new(), "a@example.com".into())
        );
        assert_eq!(
            parse("\"Smith, A\" <a@x.org>, b@x.org"),
            ("Smith, A".into(), "a@x.org".into())
        );
    }

    #[test]
    fn test_encoded_name() {
        assert_eq!(
            parse("=?UTF-8?Q?Ren=C3=A9?= <rene@example.fr>"),
            ("René".into(), "rene@example.fr".into())
        );
        assert_eq!(
            parse("\"=?ISO-8859-1?Q?J=F6rg?=\" <j@example.de>"),
            ("Jörg".into(), "j@example.de".into())
        );
    }

    #[test]
    fn test_display() {
        let addr = Address::parse(b"jdoe@example.com");
        assert_eq!(addr.display(), "jdoe@example.com");
        let addr = Address::parse(b"Jane <jane@example.com>");
        assert_eq!(addr.display(), "Jane");
        assert!(Address::parse(b"").is_empty());
    }
}
