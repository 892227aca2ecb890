//! Transfer decodings used inside RFC 2047 encoded words.
//!
//! Both decoders are strict: anything that is not exactly well formed is an
//! error, and the caller falls back to the undecoded text.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Encoded-word transfer encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferEncoding {
    /// `B`: Base64.
    Base64,
    /// `Q`: the header variant of Quoted-Printable.
    Q,
}

impl TransferEncoding {
    /// Resolves the single-letter encoding marker (case-insensitive).
    ///
    /// # Errors
    ///
    /// Returns an error for anything other than `B` or `Q`.
    pub fn from_marker(marker: &str) -> Result<Self> {
        match marker {
            "B" | "b" => Ok(Self::Base64),
            "Q" | "q" => Ok(Self::Q),
            other => Err(Error::UnknownEncoding(other.to_string())),
        }
    }

    /// Decodes `text` with this encoding.
    ///
    /// # Errors
    ///
    /// Returns the decoder's error for malformed input.
    pub fn decode(self, text: &str) -> Result<Vec<u8>> {
        match self {
            Self::Base64 => decode_base64(text),
            Self::Q => decode_q(text),
        }
    }
}

/// Decodes Base64 data.
///
/// The input length must be a multiple of four and padding may only appear
/// at the very end.
///
/// # Errors
///
/// Returns an error if the length, alphabet or padding is invalid.
pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    if data.len() % 4 != 0 {
        return Err(Error::Base64(format!(
            "length {} is not a multiple of 4",
            data.len()
        )));
    }
    STANDARD.decode(data).map_err(Into::into)
}

/// Decodes the `Q` encoding: `_` is a space and `=XX` is a hex byte.
///
/// # Errors
///
/// Returns an error for a truncated or non-hex escape.
pub fn decode_q(text: &str) -> Result<Vec<u8>> {
    let bytes = text.as_bytes();
    let mut result = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'_' => {
                result.push(b' ');
                i += 1;
            }
            b'=' => {
                let hex = bytes.get(i + 1..i + 3).ok_or_else(|| {
                    Error::QuotedPrintable(format!("incomplete escape at offset {i}"))
                })?;
                let byte = hex_value(hex[0])
                    .zip(hex_value(hex[1]))
                    .map(|(hi, lo)| (hi << 4) | lo)
                    .ok_or_else(|| {
                        Error::QuotedPrintable(format!("invalid hex escape at offset {i}"))
                    })?;
                result.push(byte);
                i += 3;
            }
            other => {
                result.push(other);
                i += 1;
            }
        }
    }

    Ok(result)
}

const fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        _ => None,
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
    use proptest::prelude::*;

    #[test]
    fn test_base64_decode() {
        assert_eq!(decode_base64("SGVsbG8=").unwrap(), b"Hello");
        assert_eq!(decode_base64("").unwrap(), b"");
    }

    #[test]
    fn test_base64_rejects_bad_length() {
        assert!(matches!(decode_base64("SGVsbG8"), Err(Error::Base64(_))));
        assert!(decode_base64("SGV").is_err());
    }

    #[test]
    fn test_base64_rejects_misplaced_padding() {
        assert!(decode_base64("SG=sbG8=").is_err());
        assert!(decode_base64("=GVsbG8A").is_err());
        assert!(decode_base64("SGVs*G8=").is_err());
    }

    #[test]
    fn test_q_decode() {
        assert_eq!(decode_q("a_b").unwrap(), b"a b");
        assert_eq!(decode_q("=3D").unwrap(), b"=");
        assert_eq!(decode_q("caf=C3=A9").unwrap(), "café".as_bytes());
        assert_eq!(decode_q("caf=c3=a9").unwrap(), "café".as_bytes());
    }

    #[test]
    fn test_q_rejects_truncated_escape() {
        assert!(matches!(decode_q("abc=4"), Err(Error::QuotedPrintable(_))));
        assert!(decode_q("abc=").is_err());
        assert!(decode_q("=ZZ").is_err());
    }

    #[test]
    fn test_marker() {
        assert_eq!(
            TransferEncoding::from_marker("b").unwrap(),
            TransferEncoding::Base64
        );
        assert_eq!(TransferEncoding::from_marker("Q").unwrap(), TransferEncoding::Q);
        assert!(TransferEncoding::from_marker("X").is_err());
    }

    proptest! {
        #[test]
        fn base64_decodes_canonical_encoding(data in proptest::collection::vec(any::<u8>(), 0..128)) {
            let encoded = STANDARD.encode(&data);
            prop_assert_eq!(decode_base64(&encoded).unwrap(), data);
        }

        #[test]
        fn base64_rejects_non_multiple_of_four(data in "[A-Za-z0-9+/]{1,64}") {
            prop_assume!(data.len() % 4 != 0);
            prop_assert!(decode_base64(&data).is_err());
        }
    }
}
