//! UTF-7 (RFC 2152) and the IMAP modified UTF-7 used for mailbox names
//! (RFC 3501 section 5.1.3).

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

const UNPADDED: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_encode_padding(false)
    .with_decode_padding_mode(DecodePaddingMode::RequireNone)
    .with_decode_allow_trailing_bits(true);

const STANDARD_ENGINE: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, UNPADDED);
const IMAP_ENGINE: GeneralPurpose = GeneralPurpose::new(&alphabet::IMAP_MUTF7, UNPADDED);

/// Decodes RFC 2152 UTF-7 bytes.
///
/// Shifted sequences that do not decode are kept verbatim.
#[must_use]
pub fn decode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        let byte = bytes[i];
        if byte != b'+' {
            out.push(if byte.is_ascii() {
                char::from(byte)
            } else {
                char::REPLACEMENT_CHARACTER
            });
            i += 1;
            continue;
        }

        let start = i + 1;
        let end = start
            + bytes[start..]
                .iter()
                .take_while(|&&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/')
                .count();

        if start == end {
            // "+-" is a literal plus sign
            out.push('+');
        } else if let Some(text) = decode_shifted(&STANDARD_ENGINE, &bytes[start..end]) {
            out.push_str(&text);
        } else {
            out.push_str(&String::from_utf8_lossy(&bytes[i..end]));
        }

        i = end;
        if bytes.get(i) == Some(&b'-') {
            i += 1;
        }
    }

    out
}

/// Encodes a mailbox name in IMAP modified UTF-7.
///
/// Printable ASCII is kept, `&` becomes `&-` and every other run of
/// characters is shifted into `&...-` base64 of its UTF-16 form.
#[must_use]
pub fn encode_imap(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending: Vec<u16> = Vec::new();

    for c in name.chars() {
        if (' '..='~').contains(&c) {
            flush_shifted(&mut pending, &mut out);
            if c == '&' {
                out.push_str("&-");
            } else {
                out.push(c);
            }
        } else {
            let mut units = [0u16; 2];
            pending.extend_from_slice(c.encode_utf16(&mut units));
        }
    }
    flush_shifted(&mut pending, &mut out);

    out
}

/// Decodes an IMAP modified UTF-7 mailbox name.
///
/// Returns `None` if a shifted sequence is malformed.
#[must_use]
pub fn decode_imap(name: &str) -> Option<String> {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let shifted = &rest[amp + 1..];
        let close = shifted.find('-')?;
        if close == 0 {
            out.push('&');
        } else {
            out.push_str(&decode_shifted(&IMAP_ENGINE, shifted[..close].as_bytes())?);
        }
        rest = &shifted[close + 1..];
    }
    out.push_str(rest);

    Some(out)
}

fn flush_shifted(pending: &mut Vec<u16>, out: &mut String) {
    if pending.is_empty() {
        return;
    }
    let bytes: Vec<u8> = pending.iter().flat_map(|unit| unit.to_be_bytes()).collect();
    out.push('&');
    out.push_str(&IMAP_ENGINE.encode(bytes));
    out.push('-');
    pending.clear();
}

fn decode_shifted(engine: &GeneralPurpose, encoded: &[u8]) -> Option<String> {
    let bytes = engine.decode(encoded).ok()?;
    let units = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .ok()
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
    fn test_decode_rfc2152_examples() {
        assert_eq!(decode(b"A+ImIDkQ."), "A\u{2262}\u{391}.");
        assert_eq!(decode(b"Hi Mom -+Jjo--!"), "Hi Mom -\u{263a}-!");
        assert_eq!(decode(b"+ZeVnLIqe-"), "\u{65e5}\u{672c}\u{8a9e}");
        assert_eq!(decode(b"1 +- 1"), "1 + 1");
    }

    #[test]
    fn test_encode_imap() {
        assert_eq!(encode_imap("INBOX"), "INBOX");
        assert_eq!(encode_imap("Tom & Jerry"), "Tom &- Jerry");
        assert_eq!(encode_imap("日本語"), "&ZeVnLIqe-");
        assert_eq!(encode_imap("Entwürfe"), "Entw&APw-rfe");
    }

    #[test]
    fn test_encode_imap_astral_plane() {
        // U+1F600 encodes as a surrogate pair
        assert_eq!(encode_imap("\u{1f600}"), "&2D3eAA-");
    }

    #[test]
    fn test_decode_imap() {
        assert_eq!(decode_imap("Entw&APw-rfe").unwrap(), "Entwürfe");
        assert_eq!(decode_imap("Tom &- Jerry").unwrap(), "Tom & Jerry");
        assert!(decode_imap("&APw").is_none());
    }

    proptest! {
        #[test]
        fn imap_encoding_is_reversible(name in "\\PC{0,24}") {
            let encoded = encode_imap(&name);
            prop_assert!(encoded.is_ascii());
            prop_assert_eq!(decode_imap(&encoded), Some(name));
        }
    }
}
