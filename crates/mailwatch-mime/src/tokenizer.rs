//! Lexical scanner shared by header decoding and IMAP response parsing.
//!
//! The scanner walks a byte string left to right and understands the
//! constructs that must never be split on a delimiter:
//!
//! - quoted strings (`"..."`, backslash escapes)
//! - comments (`(...)`, nestable, header syntax only)
//! - bracketed domains and IMAP section specs (`[...]`)
//! - IMAP literals (`{n}\r\n` followed by `n` raw bytes, IMAP syntax only)
//!
//! Everything else is collected into atoms (dot-atoms included) that stop at
//! whitespace or at one of the caller's delimiters.

/// Grammar flavour the tokenizer follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    /// RFC 5322 header text: parentheses open comments.
    Header,
    /// IMAP response data: parentheses are list delimiters and `{n}`
    /// introduces a literal.
    Imap,
}

/// Tokens produced by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    /// A run of non-special bytes, brackets included.
    Atom(&'a [u8]),
    /// Content of a quoted string with escapes removed.
    Quoted(Vec<u8>),
    /// Content of a comment with the outer parentheses and escapes removed.
    Comment(Vec<u8>),
    /// Raw literal payload.
    Literal(&'a [u8]),
    /// One of the caller-supplied delimiter bytes.
    Delimiter(u8),
}

impl Token<'_> {
    /// Returns the token text for atoms, quoted strings and literals.
    #[must_use]
    pub fn text(&self) -> Option<&[u8]> {
        match self {
            Self::Atom(s) | Self::Literal(s) => Some(s),
            Self::Quoted(s) => Some(s),
            Self::Comment(_) | Self::Delimiter(_) => None,
        }
    }
}

/// Left-to-right scanner over a byte string.
#[derive(Debug, Clone)]
pub struct Tokenizer<'a> {
    input: &'a [u8],
    pos: usize,
    syntax: Syntax,
}

impl<'a> Tokenizer<'a> {
    /// Creates a scanner for header text.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            syntax: Syntax::Header,
        }
    }

    /// Creates a scanner for IMAP response data.
    #[must_use]
    pub const fn imap(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            syntax: Syntax::Imap,
        }
    }

    /// Returns the current position in the input.
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Returns the unconsumed input.
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.pos..]
    }

    /// Returns true if the whole input has been consumed.
    #[must_use]
    pub const fn is_eof(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Peeks at the current byte without consuming it.
    #[must_use]
    pub fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }

    /// Skips spaces, tabs and line breaks.
    pub fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(is_whitespace) {
            self.pos += 1;
        }
    }

    /// Reads the next token, skipping leading whitespace.
    ///
    /// Returns `None` at end of input. Malformed constructs (an unterminated
    /// quote or comment, a short literal) are closed at end of input rather
    /// than rejected.
    pub fn next_token(&mut self, delimiters: &[u8]) -> Option<Token<'a>> {
        self.skip_whitespace();
        let byte = self.peek()?;

        if delimiters.contains(&byte) {
            self.pos += 1;
            return Some(Token::Delimiter(byte));
        }

        match byte {
            b'"' => Some(Token::Quoted(self.read_quoted())),
            b'(' if self.syntax == Syntax::Header => Some(Token::Comment(self.read_comment())),
            b'{' if self.syntax == Syntax::Imap => {
                Some(self.read_literal().unwrap_or_else(|| self.read_atom(delimiters)))
            }
            _ => Some(self.read_atom(delimiters)),
        }
    }

    /// Consumes raw text up to (not including) the first delimiter that is
    /// outside any quoted string, comment or bracket.
    pub fn until(&mut self, delimiters: &[u8]) -> &'a [u8] {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if delimiters.contains(&byte) {
                break;
            }
            match byte {
                b'"' => {
                    self.read_quoted();
                }
                b'(' if self.syntax == Syntax::Header => {
                    self.read_comment();
                }
                b'[' => self.skip_bracket(),
                _ => self.pos += 1,
            }
        }
        &self.input[start..self.pos]
    }

    fn read_quoted(&mut self) -> Vec<u8> {
        self.advance(); // opening quote
        let mut result = Vec::new();
        while let Some(byte) = self.advance() {
            match byte {
                b'"' => break,
                b'\\' => {
                    if let Some(escaped) = self.advance() {
                        result.push(escaped);
                    }
                }
                _ => result.push(byte),
            }
        }
        result
    }

    fn read_comment(&mut self) -> Vec<u8> {
        self.advance(); // opening parenthesis
        let mut depth = 1usize;
        let mut result = Vec::new();
        while let Some(byte) = self.advance() {
            match byte {
                b'\\' => {
                    if let Some(escaped) = self.advance() {
                        result.push(escaped);
                    }
                    continue;
                }
                b'(' => depth += 1,
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                }
                _ => {}
            }
            result.push(byte);
        }
        result
    }

    fn skip_bracket(&mut self) {
        self.advance(); // opening bracket
        while let Some(byte) = self.advance() {
            match byte {
                b']' => break,
                b'\\' => {
                    self.advance();
                }
                _ => {}
            }
        }
    }

    /// Reads `{n}\r\n` plus `n` bytes. Returns `None` (without consuming)
    /// if the prefix is not a well-formed literal header.
    fn read_literal(&mut self) -> Option<Token<'a>> {
        let rest = self.remaining();
        let close = rest.iter().position(|&b| b == b'}')?;
        let digits = std::str::from_utf8(&rest[1..close]).ok()?;
        let size: usize = digits.trim_end_matches('+').parse().ok()?;

        let mut start = self.pos + close + 1;
        if self.input.get(start..start + 2) == Some(b"\r\n") {
            start += 2;
        } else if self.input.get(start) == Some(&b'\n') {
            start += 1;
        }
        let end = start.saturating_add(size).min(self.input.len());
        self.pos = end;
        Some(Token::Literal(&self.input[start..end]))
    }

    fn read_atom(&mut self, delimiters: &[u8]) -> Token<'a> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if is_whitespace(byte) || byte == b'"' || delimiters.contains(&byte) {
                break;
            }
            match byte {
                b'(' if self.syntax == Syntax::Header => break,
                b'[' => self.skip_bracket(),
                _ => self.pos += 1,
            }
        }
        if self.pos == start {
            // A lone special byte that is not a caller delimiter.
            self.pos += 1;
        }
        Token::Atom(&self.input[start..self.pos])
    }
}

const fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\r' | b'\n')
}

/// Removes comments from header text, collapsing them to a single space.
#[must_use]
pub fn strip_comments(input: &[u8]) -> Vec<u8> {
    let mut tokenizer = Tokenizer::new(input);
    let mut out = Vec::with_capacity(input.len());
    loop {
        let raw = tokenizer.until(b"(");
        out.extend_from_slice(raw);
        if tokenizer.is_eof() {
            break;
        }
        tokenizer.read_comment();
        out.push(b' ');
    }
    out
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
    use proptest::prelude::*;

    #[test]
    fn test_atoms_and_quoted() {
        let mut t = Tokenizer::new(b"John \"Q. Public\" <john@example.com>");
        assert_eq!(t.next_token(b"<>"), Some(Token::Atom(b"John")));
        assert_eq!(
            t.next_token(b"<>"),
            Some(Token::Quoted(b"Q. Public".to_vec()))
        );
        assert_eq!(t.next_token(b"<>"), Some(Token::Delimiter(b'<')));
        assert_eq!(t.next_token(b"<>"), Some(Token::Atom(b"john@example.com")));
        assert_eq!(t.next_token(b"<>"), Some(Token::Delimiter(b'>')));
        assert_eq!(t.next_token(b"<>"), None);
    }

    #[test]
    fn test_quoted_escapes() {
        let mut t = Tokenizer::new(br#""say \"hi\" \\ now""#);
        assert_eq!(
            t.next_token(b""),
            Some(Token::Quoted(br#"say "hi" \ now"#.to_vec()))
        );
    }

    #[test]
    fn test_nested_comment() {
        let mut t = Tokenizer::new(b"a (outer (inner) text) b");
        assert_eq!(t.next_token(b""), Some(Token::Atom(b"a")));
        assert_eq!(
            t.next_token(b""),
            Some(Token::Comment(b"outer (inner) text".to_vec()))
        );
        assert_eq!(t.next_token(b""), Some(Token::Atom(b"b")));
    }

    #[test]
    fn test_bracketed_domain_is_one_atom() {
        let mut t = Tokenizer::new(b"user@[10.0.0.1, x] next");
        assert_eq!(t.next_token(b","), Some(Token::Atom(b"user@[10.0.0.1, x]")));
        assert_eq!(t.next_token(b","), Some(Token::Atom(b"next")));
    }

    #[test]
    fn test_until_respects_quotes_and_comments() {
        let mut t = Tokenizer::new(b"\"Doe, John\" <j@x> (a, b), second@x");
        assert_eq!(t.until(b","), b"\"Doe, John\" <j@x> (a, b)");
        assert_eq!(t.next_token(b","), Some(Token::Delimiter(b',')));
        assert_eq!(t.next_token(b","), Some(Token::Atom(b"second@x")));
    }

    #[test]
    fn test_imap_section_and_lists() {
        let mut t = Tokenizer::imap(b"(UID 7 BODY[HEADER.FIELDS (SUBJECT DATE)] NIL)");
        assert_eq!(t.next_token(b"()"), Some(Token::Delimiter(b'(')));
        assert_eq!(t.next_token(b"()"), Some(Token::Atom(b"UID")));
        assert_eq!(t.next_token(b"()"), Some(Token::Atom(b"7")));
        assert_eq!(
            t.next_token(b"()"),
            Some(Token::Atom(b"BODY[HEADER.FIELDS (SUBJECT DATE)]"))
        );
        assert_eq!(t.next_token(b"()"), Some(Token::Atom(b"NIL")));
        assert_eq!(t.next_token(b"()"), Some(Token::Delimiter(b')')));
    }

    #[test]
    fn test_imap_literal() {
        let mut t = Tokenizer::imap(b"{5}\r\nhello)");
        assert_eq!(t.next_token(b"()"), Some(Token::Literal(b"hello")));
        assert_eq!(t.next_token(b"()"), Some(Token::Delimiter(b')')));
    }

    #[test]
    fn test_imap_literal_contains_delimiters() {
        let mut t = Tokenizer::imap(b"{7}\r\n(a) \"b ok");
        assert_eq!(t.next_token(b"()"), Some(Token::Literal(b"(a) \"b ")));
        assert_eq!(t.next_token(b"()"), Some(Token::Atom(b"ok")));
    }

    #[test]
    fn test_unterminated_constructs_close_at_eof() {
        let mut t = Tokenizer::new(b"\"open");
        assert_eq!(t.next_token(b""), Some(Token::Quoted(b"open".to_vec())));
        let mut t = Tokenizer::new(b"(open");
        assert_eq!(t.next_token(b""), Some(Token::Comment(b"open".to_vec())));
    }

    #[test]
    fn test_strip_comments() {
        assert_eq!(
            strip_comments(b"Tue, 1 Jul 2003 10:52:37 +0200 (CEST)"),
            b"Tue, 1 Jul 2003 10:52:37 +0200  ".to_vec()
        );
    }

    proptest! {
        #[test]
        fn tokenizer_always_terminates(input in proptest::collection::vec(any::<u8>(), 0..256)) {
            let mut t = Tokenizer::new(&input);
            let mut steps = 0;
            while t.next_token(b",<>").is_some() {
                steps += 1;
                prop_assert!(steps <= input.len());
            }
            let mut t = Tokenizer::imap(&input);
            while t.next_token(b"()").is_some() {}
            prop_assert!(t.is_eof());
        }
    }
}
