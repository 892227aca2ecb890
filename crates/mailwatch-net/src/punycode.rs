//! Punycode (RFC 3492) and the IDNA `xn--` label form.
//!
//! Host names are converted label by label before TLS server-name
//! validation: ASCII labels are left alone, any other label is lower-cased
//! and encoded behind the `xn--` prefix.

const BASE: u32 = 36;
const TMIN: u32 = 1;
const TMAX: u32 = 26;
const SKEW: u32 = 38;
const DAMP: u32 = 700;
const INITIAL_BIAS: u32 = 72;
const INITIAL_N: u32 = 128;

/// ACE prefix marking an encoded label.
pub const ACE_PREFIX: &str = "xn--";

/// Encodes a single label. Returns `None` on arithmetic overflow.
#[must_use]
pub fn encode(input: &str) -> Option<String> {
    let code_points: Vec<u32> = input.chars().map(u32::from).collect();
    let mut output: String = input.chars().filter(char::is_ascii).collect();

    let basic = u32::try_from(output.len()).ok()?;
    let total = u32::try_from(code_points.len()).ok()?;
    let mut handled = basic;
    if basic > 0 {
        output.push('-');
    }

    let mut n = INITIAL_N;
    let mut delta = 0u32;
    let mut bias = INITIAL_BIAS;

    while handled < total {
        let m = code_points.iter().copied().filter(|&c| c >= n).min()?;
        delta = delta.checked_add((m - n).checked_mul(handled + 1)?)?;
        n = m;

        for &c in &code_points {
            if c < n {
                delta = delta.checked_add(1)?;
            }
            if c == n {
                let mut q = delta;
                let mut k = BASE;
                loop {
                    let t = threshold(k, bias);
                    if q < t {
                        break;
                    }
                    output.push(encode_digit(t + (q - t) % (BASE - t)));
                    q = (q - t) / (BASE - t);
                    k += BASE;
                }
                output.push(encode_digit(q));
                bias = adapt(delta, handled + 1, handled == basic);
                delta = 0;
                handled += 1;
            }
        }

        delta = delta.checked_add(1)?;
        n = n.checked_add(1)?;
    }

    Some(output)
}

/// Decodes a single label (without the ACE prefix). Returns `None` if the
/// input is not valid punycode.
#[must_use]
pub fn decode(input: &str) -> Option<String> {
    let (basic, extended) = input
        .rfind('-')
        .map_or(("", input), |i| (&input[..i], &input[i + 1..]));
    if !basic.is_ascii() {
        return None;
    }

    let mut output: Vec<char> = basic.chars().collect();
    let mut n = INITIAL_N;
    let mut i = 0u32;
    let mut bias = INITIAL_BIAS;
    let mut digits = extended.bytes().peekable();

    while digits.peek().is_some() {
        let old_i = i;
        let mut weight = 1u32;
        let mut k = BASE;
        loop {
            let digit = decode_digit(digits.next()?)?;
            i = i.checked_add(digit.checked_mul(weight)?)?;
            let t = threshold(k, bias);
            if digit < t {
                break;
            }
            weight = weight.checked_mul(BASE - t)?;
            k += BASE;
        }

        let len = u32::try_from(output.len()).ok()? + 1;
        bias = adapt(i - old_i, len, old_i == 0);
        n = n.checked_add(i / len)?;
        i %= len;
        output.insert(usize::try_from(i).ok()?, char::from_u32(n)?);
        i += 1;
    }

    Some(output.into_iter().collect())
}

/// Converts a host name to its ASCII form.
///
/// Returns `None` if a label cannot be encoded.
#[must_use]
pub fn domain_to_ascii(domain: &str) -> Option<String> {
    let labels = domain
        .split('.')
        .map(|label| {
            if label.is_ascii() {
                Some(label.to_string())
            } else {
                encode(&label.to_lowercase()).map(|encoded| format!("{ACE_PREFIX}{encoded}"))
            }
        })
        .collect::<Option<Vec<_>>>()?;
    Some(labels.join("."))
}

/// Converts `xn--` labels of a host name back to Unicode, leaving labels
/// that fail to decode untouched.
#[must_use]
pub fn domain_to_unicode(domain: &str) -> String {
    domain
        .split('.')
        .map(|label| {
            label
                .get(..ACE_PREFIX.len())
                .filter(|prefix| prefix.eq_ignore_ascii_case(ACE_PREFIX))
                .and_then(|_| decode(&label[ACE_PREFIX.len()..]))
                .unwrap_or_else(|| label.to_string())
        })
        .collect::<Vec<_>>()
        .join(".")
}

const fn threshold(k: u32, bias: u32) -> u32 {
    if k <= bias {
        TMIN
    } else if k >= bias + TMAX {
        TMAX
    } else {
        k - bias
    }
}

const fn adapt(delta: u32, num_points: u32, first_time: bool) -> u32 {
    let mut delta = if first_time { delta / DAMP } else { delta / 2 };
    delta += delta / num_points;
    let mut k = 0;
    while delta > ((BASE - TMIN) * TMAX) / 2 {
        delta /= BASE - TMIN;
        k += BASE;
    }
    k + (BASE - TMIN + 1) * delta / (delta + SKEW)
}

fn encode_digit(digit: u32) -> char {
    const DIGITS: &[u8; 36] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    char::from(DIGITS[digit as usize])
}

fn decode_digit(byte: u8) -> Option<u32> {
    match byte {
        b'a'..=b'z' => Some(u32::from(byte - b'a')),
        b'A'..=b'Z' => Some(u32::from(byte - b'A')),
        b'0'..=b'9' => Some(u32::from(byte - b'0') + 26),
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
    fn test_encode_known_labels() {
        assert_eq!(encode("bücher").unwrap(), "bcher-kva");
        assert_eq!(encode("münchen").unwrap(), "mnchen-3ya");
        assert_eq!(encode("ü").unwrap(), "tda");
        assert_eq!(
            encode("他们为什么不说中文").unwrap(),
            "ihqwcrb4cv8a8dqg056pqjye"
        );
    }

    #[test]
    fn test_decode_known_labels() {
        assert_eq!(decode("bcher-kva").unwrap(), "bücher");
        assert_eq!(decode("ihqwcrb4cv8a8dqg056pqjye").unwrap(), "他们为什么不说中文");
        assert!(decode("bcher-k!a").is_none());
    }

    #[test]
    fn test_domain_to_ascii() {
        assert_eq!(domain_to_ascii("mail.example.com").unwrap(), "mail.example.com");
        assert_eq!(
            domain_to_ascii("imap.Bücher.example").unwrap(),
            "imap.xn--bcher-kva.example"
        );
        assert_eq!(domain_to_ascii("127.0.0.1").unwrap(), "127.0.0.1");
    }

    #[test]
    fn test_domain_to_unicode() {
        assert_eq!(
            domain_to_unicode("imap.xn--bcher-kva.example"),
            "imap.bücher.example"
        );
        assert_eq!(domain_to_unicode("XN--tda.de"), "ü.de");
        assert_eq!(domain_to_unicode("plain.org"), "plain.org");
    }

    proptest! {
        #[test]
        fn ascii_domains_are_unchanged(domain in "[a-z0-9-]{1,20}(\\.[a-z0-9-]{1,20}){0,3}") {
            prop_assert_eq!(domain_to_ascii(&domain), Some(domain.clone()));
        }

        #[test]
        fn non_ascii_labels_round_trip(label in "[a-z]{0,5}[à-ÿα-ω一-龥]{1,6}[a-z0-9]{0,5}") {
            let encoded = encode(&label).unwrap();
            prop_assert!(encoded.is_ascii());
            prop_assert_eq!(decode(&encoded), Some(label));
        }
    }
}
