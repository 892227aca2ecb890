//! RFC 2047 encoded-word decoding.
//!
//! Adjacent encoded words separated only by whitespace form a run: the
//! whitespace between them is dropped and the decoded bytes of consecutive
//! words in the same charset are joined before charset conversion, so a
//! multi-byte character split across two words survives. Any word that
//! fails to decode is emitted unmodified and ends the current run.

use crate::charset;
use crate::encoding::TransferEncoding;
use crate::error::Result;

/// A parsed (not yet decoded) encoded word.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EncodedWord<'a> {
    charset: &'a str,
    encoding: &'a str,
    text: &'a str,
}

impl<'a> EncodedWord<'a> {
    /// Parses an encoded word at the start of `input`, returning it with its
    /// byte length.
    fn parse(input: &'a str) -> Option<(Self, usize)> {
        let body = input.strip_prefix("=?")?;
        let (charset, rest) = body.split_once('?')?;
        let (encoding, rest) = rest.split_once('?')?;
        let end = rest.find("?=")?;
        let text = &rest[..end];

        if charset.is_empty()
            || encoding.len() != 1
            || text.contains(char::is_whitespace)
            || charset.contains(char::is_whitespace)
        {
            return None;
        }

        let len = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;
        Some((
            Self {
                charset,
                encoding,
                text,
            },
            len,
        ))
    }

    fn decode(&self) -> Result<Vec<u8>> {
        TransferEncoding::from_marker(self.encoding)?.decode(self.text)
    }
}

/// Decoded bytes of the current run, pending charset conversion.
#[derive(Default)]
struct Run {
    charset: String,
    bytes: Vec<u8>,
}

impl Run {
    fn push(&mut self, charset: &str, bytes: &[u8], out: &mut String) {
        if !self.charset.eq_ignore_ascii_case(charset) {
            self.flush(out);
            charset.clone_into(&mut self.charset);
        }
        self.bytes.extend_from_slice(bytes);
    }

    fn flush(&mut self, out: &mut String) {
        if !self.bytes.is_empty() {
            out.push_str(&charset::decode(&self.charset, &self.bytes));
            self.bytes.clear();
        }
        self.charset.clear();
    }
}

/// Decodes every encoded word in raw header text.
///
/// Raw bytes outside encoded words are read as UTF-8, falling back to
/// windows-1252. Decoding never fails.
#[must_use]
pub fn decode(raw: &[u8]) -> String {
    decode_str(&charset::decode_raw(raw))
}

/// Decodes every encoded word in header text.
#[must_use]
pub fn decode_str(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = Run::default();
    // Whitespace seen since the last successfully decoded word.
    let mut held_space: Option<&str> = None;
    let mut rest = text;

    while !rest.is_empty() {
        if let Some((word, len)) = EncodedWord::parse(rest) {
            match word.decode() {
                Ok(bytes) => {
                    // whitespace between two encoded words is dropped
                    held_space = None;
                    run.push(word.charset, &bytes, &mut out);
                }
                Err(_) => {
                    run.flush(&mut out);
                    if let Some(space) = held_space.take() {
                        out.push_str(space);
                    }
                    out.push_str(&rest[..len]);
                }
            }
            rest = &rest[len..];
            if !run.bytes.is_empty() {
                let space_len = rest.len() - rest.trim_start().len();
                if space_len > 0 {
                    held_space = Some(&rest[..space_len]);
                    rest = &rest[space_len..];
                }
            }
            continue;
        }

        run.flush(&mut out);
        if let Some(space) = held_space.take() {
            out.push_str(space);
        }

        // Copy through to the next possible encoded word.
        let skip = rest.chars().next().map_or(1, char::len_utf8);
        let next = rest[skip..].find("=?").map_or(rest.len(), |i| i + skip);
        out.push_str(&rest[..next]);
        rest = &rest[next..];
    }

    run.flush(&mut out);
    if let Some(space) = held_space {
        out.push_str(space);
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

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(decode_str("Hello World"), "Hello World");
        assert_eq!(decode_str(""), "");
        assert_eq!(decode_str("a =? b"), "a =? b");
    }

    #[test]
    fn test_base64_word() {
        assert_eq!(decode_str("=?UTF-8?B?SGVsbG8=?="), "Hello");
    }

    #[test]
    fn test_q_word() {
        assert_eq!(decode_str("=?iso-8859-1?q?caf=E9_cr=E8me?="), "café crème");
    }

    #[test]
    fn test_whitespace_between_words_dropped() {
        assert_eq!(
            decode_str("=?UTF-8?Q?Hello?=  \r\n =?UTF-8?Q?_World?="),
            "Hello World"
        );
    }

    #[test]
    fn test_text_around_words_kept() {
        assert_eq!(
            decode_str("Re: =?UTF-8?Q?caf=C3=A9?= tomorrow"),
            "Re: café tomorrow"
        );
        assert_eq!(decode_str("[list] =?UTF-8?B?SGk=?=!"), "[list] Hi!");
    }

    #[test]
    fn test_multibyte_split_across_words() {
        // "é" is C3 A9, split between the two words
        assert_eq!(decode_str("=?UTF-8?Q?caf=C3?= =?UTF-8?Q?=A9?="), "café");
        assert_eq!(decode_str("=?UTF-8?B?w6k=?=\t=?UTF-8?B?w6k=?="), "éé");
    }

    #[test]
    fn test_charset_change_flushes_run() {
        assert_eq!(
            decode_str("=?ISO-8859-1?Q?=E9?= =?UTF-8?Q?=C3=A9?="),
            "éé"
        );
    }

    #[test]
    fn test_invalid_word_passed_through() {
        assert_eq!(
            decode_str("=?UTF-8?B?SGVsbG8?= there"),
            "=?UTF-8?B?SGVsbG8?= there"
        );
        assert_eq!(
            decode_str("=?UTF-8?Q?ok?= =?UTF-8?Q?bad=4?= =?UTF-8?Q?fine?="),
            "ok =?UTF-8?Q?bad=4?= fine"
        );
        assert_eq!(decode_str("=?UTF-8?X?abc?="), "=?UTF-8?X?abc?=");
    }

    #[test]
    fn test_unknown_charset_passes_through() {
        assert_eq!(decode_str("=?x-unknown?Q?plain_text?="), "plain text");
    }

    #[test]
    fn test_raw_bytes_fallback() {
        assert_eq!(decode(b"caf\xe9 =?UTF-8?Q?ok?="), "café ok");
    }

    #[test]
    fn test_language_suffix() {
        assert_eq!(decode_str("=?UTF-8*en?Q?hi?="), "hi");
    }
}
