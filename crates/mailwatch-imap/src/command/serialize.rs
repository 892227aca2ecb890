//! Command argument serialization.

/// Writes a command argument preceded by a space.
///
/// Arguments made only of atom characters go out bare; anything else,
/// including the empty string and non-ASCII text, becomes a quoted string
/// with `"` and `\` escaped.
pub fn write_astring(buf: &mut Vec<u8>, s: &str) {
    buf.push(b' ');
    if s.is_empty() || !s.bytes().all(is_atom_char) {
        buf.push(b'"');
        for b in s.bytes() {
            if b == b'"' || b == b'\\' {
                buf.push(b'\\');
            }
            buf.push(b);
        }
        buf.push(b'"');
    } else {
        buf.extend_from_slice(s.as_bytes());
    }
}

/// Returns false for text no quoted string can carry: CR, LF or NUL.
#[must_use]
pub fn is_quotable(s: &str) -> bool {
    !s.bytes().any(|b| matches!(b, b'\r' | b'\n' | 0))
}

/// Printable ASCII other than the IMAP atom specials.
const fn is_atom_char(b: u8) -> bool {
    matches!(b, 0x21..=0x7E)
        && !matches!(b, b'(' | b')' | b'{' | b'%' | b'*' | b'"' | b'\\' | b']')
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

    fn astring(s: &str) -> String {
        let mut buf = Vec::new();
        write_astring(&mut buf, s);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_atom_is_bare() {
        assert_eq!(astring("user@example.com"), " user@example.com");
        assert_eq!(astring("INBOX"), " INBOX");
    }

    #[test]
    fn test_specials_are_quoted() {
        assert_eq!(astring("pass word"), " \"pass word\"");
        assert_eq!(astring("a*b"), " \"a*b\"");
        assert_eq!(astring("x]"), " \"x]\"");
    }

    #[test]
    fn test_escapes() {
        assert_eq!(astring(r#"say "hi"\"#), r#" "say \"hi\"\\""#);
    }

    #[test]
    fn test_line_breaks_not_quotable() {
        assert!(is_quotable("pass word"));
        assert!(!is_quotable("pw\r\nA1 LOGOUT"));
        assert!(!is_quotable("a\nb"));
        assert!(!is_quotable("nul\0"));
    }

    #[test]
    fn test_empty_and_non_ascii() {
        assert_eq!(astring(""), " \"\"");
        assert_eq!(astring("pässword"), " \"pässword\"");
    }

    proptest::proptest! {
        #[test]
        fn quoted_round_trips_through_tokenizer(s in "[ -~]{0,40}") {
            let mut buf = Vec::new();
            write_astring(&mut buf, &s);
            let mut tokenizer = mailwatch_mime::Tokenizer::imap(&buf[1..]);
            let text = match tokenizer.next_token(b"") {
                Some(mailwatch_mime::Token::Atom(atom)) => atom.to_vec(),
                Some(mailwatch_mime::Token::Quoted(q)) => q,
                other => panic!("unexpected token {other:?}"),
            };
            proptest::prop_assert_eq!(text, s.as_bytes().to_vec());
        }
    }
}
