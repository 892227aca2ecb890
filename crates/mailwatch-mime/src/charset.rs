//! Charset name resolution.
//!
//! Names are upper-cased and looked up in a fixed table of code pages. Names
//! not in the table may still carry the code page number directly
//! (`WINDOWS-1251`, `CP1251`, `X-CP1251`). Code pages then map onto an
//! `encoding_rs` encoding; an unresolved charset converts nothing and the
//! bytes are taken as (lossy) UTF-8.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::LazyLock;

use encoding_rs::Encoding;

use crate::utf7;

/// Numeric code page identifiers.
pub type CodePage = u16;

/// The UTF-8 code page.
pub const UTF8: CodePage = 65001;
/// The UTF-7 code page.
pub const UTF7: CodePage = 65000;

static CHARSETS: LazyLock<HashMap<&'static str, CodePage>> = LazyLock::new(|| {
    HashMap::from([
        ("US-ASCII", 20127),
        ("ASCII", 20127),
        ("ANSI_X3.4-1968", 20127),
        ("UTF-8", UTF8),
        ("UTF8", UTF8),
        ("UTF-7", UTF7),
        ("UTF-16", 1200),
        ("UTF-16LE", 1200),
        ("UTF-16BE", 1201),
        ("ISO-8859-1", 28591),
        ("LATIN1", 28591),
        ("ISO-8859-2", 28592),
        ("LATIN2", 28592),
        ("ISO-8859-3", 28593),
        ("ISO-8859-4", 28594),
        ("ISO-8859-5", 28595),
        ("ISO-8859-6", 28596),
        ("ISO-8859-7", 28597),
        ("ISO-8859-8", 28598),
        ("ISO-8859-8-I", 38598),
        ("ISO-8859-9", 28599),
        ("ISO-8859-10", 28600),
        ("ISO-8859-13", 28603),
        ("ISO-8859-14", 28604),
        ("ISO-8859-15", 28605),
        ("ISO-8859-16", 28606),
        ("KOI8-R", 20866),
        ("KOI8-U", 21866),
        ("SHIFT_JIS", 932),
        ("SHIFT-JIS", 932),
        ("SJIS", 932),
        ("X-SJIS", 932),
        ("MS_KANJI", 932),
        ("ISO-2022-JP", 50220),
        ("CSISO2022JP", 50221),
        ("EUC-JP", 51932),
        ("KS_C_5601-1987", 949),
        ("EUC-KR", 51949),
        ("GB2312", 936),
        ("GBK", 936),
        ("X-GBK", 936),
        ("GB18030", 54936),
        ("BIG5", 950),
        ("BIG5-HKSCS", 950),
        ("TIS-620", 874),
        ("MACINTOSH", 10000),
        ("IBM866", 866),
    ])
});

/// Resolves a charset name to its code page.
///
/// A `*language` suffix (RFC 2231) is ignored.
#[must_use]
pub fn resolve(name: &str) -> Option<CodePage> {
    let name = name.split_once('*').map_or(name, |(charset, _)| charset);
    let upper = name.trim().to_ascii_uppercase();

    if let Some(&page) = CHARSETS.get(upper.as_str()) {
        return Some(page);
    }

    ["WINDOWS-", "X-CP", "CP"]
        .iter()
        .find_map(|prefix| upper.strip_prefix(prefix))
        .and_then(|digits| digits.parse().ok())
}

/// Maps a code page onto a decoder.
#[must_use]
pub fn encoding_for(page: CodePage) -> Option<&'static Encoding> {
    let encoding = match page {
        // encoding_rs folds US-ASCII and ISO-8859-1 into windows-1252
        20127 | 28591 | 1252 => encoding_rs::WINDOWS_1252,
        UTF8 => encoding_rs::UTF_8,
        1200 => encoding_rs::UTF_16LE,
        1201 => encoding_rs::UTF_16BE,
        28592 => encoding_rs::ISO_8859_2,
        28593 => encoding_rs::ISO_8859_3,
        28594 => encoding_rs::ISO_8859_4,
        28595 => encoding_rs::ISO_8859_5,
        28596 => encoding_rs::ISO_8859_6,
        28597 => encoding_rs::ISO_8859_7,
        28598 => encoding_rs::ISO_8859_8,
        38598 => encoding_rs::ISO_8859_8_I,
        28599 | 1254 => encoding_rs::WINDOWS_1254,
        28600 => encoding_rs::ISO_8859_10,
        28603 => encoding_rs::ISO_8859_13,
        28604 => encoding_rs::ISO_8859_14,
        28605 => encoding_rs::ISO_8859_15,
        28606 => encoding_rs::ISO_8859_16,
        20866 => encoding_rs::KOI8_R,
        21866 => encoding_rs::KOI8_U,
        932 => encoding_rs::SHIFT_JIS,
        50220..=50222 => encoding_rs::ISO_2022_JP,
        20932 | 51932 => encoding_rs::EUC_JP,
        949 | 51949 => encoding_rs::EUC_KR,
        936 => encoding_rs::GBK,
        54936 => encoding_rs::GB18030,
        950 => encoding_rs::BIG5,
        874 => encoding_rs::WINDOWS_874,
        866 => encoding_rs::IBM866,
        10000 => encoding_rs::MACINTOSH,
        1250 => encoding_rs::WINDOWS_1250,
        1251 => encoding_rs::WINDOWS_1251,
        1253 => encoding_rs::WINDOWS_1253,
        1255 => encoding_rs::WINDOWS_1255,
        1256 => encoding_rs::WINDOWS_1256,
        1257 => encoding_rs::WINDOWS_1257,
        1258 => encoding_rs::WINDOWS_1258,
        _ => return None,
    };
    Some(encoding)
}

/// Converts `bytes` in the named charset to text.
///
/// Unknown charsets are passed through as UTF-8, replacing invalid
/// sequences.
#[must_use]
pub fn decode<'a>(charset: &str, bytes: &'a [u8]) -> Cow<'a, str> {
    match resolve(charset) {
        Some(UTF7) => Cow::Owned(utf7::decode(bytes)),
        Some(page) => match encoding_for(page) {
            Some(encoding) => encoding.decode_without_bom_handling(bytes).0,
            None => String::from_utf8_lossy(bytes),
        },
        None => String::from_utf8_lossy(bytes),
    }
}

/// Converts raw (unencoded) header bytes to text.
///
/// Well-formed UTF-8 is taken as is; anything else is read as windows-1252.
#[must_use]
pub fn decode_raw(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => encoding_rs::WINDOWS_1252.decode_without_bom_handling(bytes).0,
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
    fn test_resolve_table() {
        assert_eq!(resolve("utf-8"), Some(UTF8));
        assert_eq!(resolve("Iso-8859-1"), Some(28591));
        assert_eq!(resolve("koi8-r"), Some(20866));
        assert_eq!(resolve("UTF-8*en"), Some(UTF8));
    }

    #[test]
    fn test_resolve_numeric_suffix() {
        assert_eq!(resolve("windows-1251"), Some(1251));
        assert_eq!(resolve("cp1250"), Some(1250));
        assert_eq!(resolve("x-cp1252"), Some(1252));
        assert_eq!(resolve("windows-abc"), None);
    }

    #[test]
    fn test_resolve_unknown() {
        assert_eq!(resolve("x-unknown"), None);
        assert_eq!(resolve(""), None);
    }

    #[test]
    fn test_decode_known_charsets() {
        assert_eq!(decode("ISO-8859-1", b"caf\xe9"), "café");
        assert_eq!(decode("windows-1251", b"\xcf\xf0\xe8"), "При");
        assert_eq!(decode("koi8-r", b"\xf0\xd2\xc9"), "При");
    }

    #[test]
    fn test_decode_unknown_charset_passes_through() {
        assert_eq!(decode("x-bogus", b"plain"), "plain");
        assert_eq!(decode("cp99999", b"plain"), "plain");
    }

    #[test]
    fn test_decode_utf7() {
        assert_eq!(decode("utf-7", b"Hi Mom -+Jjo--!"), "Hi Mom -\u{263a}-!");
    }

    #[test]
    fn test_decode_raw_fallback() {
        assert_eq!(decode_raw("café".as_bytes()), "café");
        assert_eq!(decode_raw(b"caf\xe9"), "café");
    }
}
