//! Header field splitting.
//!
//! Walks raw header text (`Name: value` lines, CRLF or bare LF) and unfolds
//! continuation lines that start with a space or tab. Scanning stops at the
//! blank line that ends the header block.

/// Cursor over the fields of a raw header block.
#[derive(Debug, Clone)]
pub struct HeaderFields<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> HeaderFields<'a> {
    /// Creates a cursor at the start of `input`.
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self { input, pos: 0 }
    }

    /// Reads the next field as `(name, unfolded value)`.
    ///
    /// Lines without a colon are skipped. Returns `None` at the end of the
    /// header block.
    pub fn next_field(&mut self) -> Option<(&'a [u8], Vec<u8>)> {
        loop {
            let line = self.next_line()?;
            if line.is_empty() {
                // end of header block
                self.pos = self.input.len();
                return None;
            }
            if line[0] == b' ' || line[0] == b'\t' {
                // stray continuation without a field
                continue;
            }
            let Some(colon) = line.iter().position(|&b| b == b':') else {
                continue;
            };

            let name = trim(&line[..colon]);
            let mut value = line[colon + 1..].to_vec();
            while matches!(self.input.get(self.pos), Some(b' ' | b'\t')) {
                if let Some(continuation) = self.next_line() {
                    value.extend_from_slice(continuation);
                }
            }
            return Some((name, trim(&value).to_vec()));
        }
    }

    /// Advances to the next field whose name matches one of `names`
    /// (case-insensitive).
    ///
    /// Returns the index into `names` and the raw unfolded value, or `None`
    /// once the header block is exhausted.
    pub fn field(&mut self, names: &[&str]) -> Option<(usize, Vec<u8>)> {
        while let Some((name, value)) = self.next_field() {
            if let Some(index) = names
                .iter()
                .position(|candidate| candidate.as_bytes().eq_ignore_ascii_case(name))
            {
                return Some((index, value));
            }
        }
        None
    }

    fn next_line(&mut self) -> Option<&'a [u8]> {
        if self.pos >= self.input.len() {
            return None;
        }
        let rest = &self.input[self.pos..];
        let (line, consumed) = match rest.iter().position(|&b| b == b'\n') {
            Some(nl) => (&rest[..nl], nl + 1),
            None => (rest, rest.len()),
        };
        self.pos += consumed;
        Some(line.strip_suffix(b"\r").unwrap_or(line))
    }
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |i| i + 1);
    &bytes[start..end]
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

    const HEADER: &[u8] = b"Received: from a\r\n\
        \tby b\r\n\
        Subject: Weekly\r\n \
        report\r\n\
        From: Alice <alice@example.com>\r\n\
        Date: Tue, 1 Jul 2003 10:52:37 +0200\r\n\
        \r\n\
        Subject: body text\r\n";

    #[test]
    fn test_next_field_unfolds() {
        let mut fields = HeaderFields::new(HEADER);
        let (name, value) = fields.next_field().unwrap();
        assert_eq!(name, b"Received");
        assert_eq!(value, b"from a\tby b");
        let (name, value) = fields.next_field().unwrap();
        assert_eq!(name, b"Subject");
        assert_eq!(value, b"Weekly report");
    }

    #[test]
    fn test_field_matches_names_case_insensitively() {
        let mut fields = HeaderFields::new(HEADER);
        let names = ["date", "FROM"];
        assert_eq!(
            fields.field(&names),
            Some((1, b"Alice <alice@example.com>".to_vec()))
        );
        assert_eq!(
            fields.field(&names),
            Some((0, b"Tue, 1 Jul 2003 10:52:37 +0200".to_vec()))
        );
        assert_eq!(fields.field(&names), None);
    }

    #[test]
    fn test_stops_at_blank_line() {
        let mut fields = HeaderFields::new(HEADER);
        assert_eq!(fields.field(&["Subject"]).unwrap().1, b"Weekly report");
        assert_eq!(fields.field(&["Subject"]), None);
    }

    #[test]
    fn test_bare_lf_and_missing_colon() {
        let mut fields = HeaderFields::new(b"garbage line\nSubject:hi\n");
        assert_eq!(fields.field(&["subject"]), Some((0, b"hi".to_vec())));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(HeaderFields::new(b"").next_field(), None);
    }
}
