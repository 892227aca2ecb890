//! RFC 822 / RFC 2822 date parsing.
//!
//! Accepts `[day ,] DD Mon YYYY HH:MM[:SS] zone` where the zone is a numeric
//! offset or one of the RFC 822 names. Comments are ignored. Anything that
//! does not fit yields [`MailDate::Invalid`].

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone};

use crate::error::{Error, Result};
use crate::tokenizer::{Token, Tokenizer};

/// A message date, or the marker for one that could not be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailDate {
    /// A parsed timestamp with its original offset.
    Valid(DateTime<FixedOffset>),
    /// The field was missing or malformed.
    Invalid,
}

impl MailDate {
    /// Parses a raw `Date:` field value, never failing.
    #[must_use]
    pub fn parse(raw: &[u8]) -> Self {
        parse_date(raw).map_or(Self::Invalid, Self::Valid)
    }

    /// Returns the timestamp if valid.
    #[must_use]
    pub const fn valid(&self) -> Option<&DateTime<FixedOffset>> {
        match self {
            Self::Valid(date) => Some(date),
            Self::Invalid => None,
        }
    }
}

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Zone names from RFC 822 with their offsets in minutes.
const ZONES: [(&str, i32); 11] = [
    ("UT", 0),
    ("UTC", 0),
    ("GMT", 0),
    ("EST", -5 * 60),
    ("EDT", -4 * 60),
    ("CST", -6 * 60),
    ("CDT", -5 * 60),
    ("MST", -7 * 60),
    ("MDT", -6 * 60),
    ("PST", -8 * 60),
    ("PDT", -7 * 60),
];

/// Parses a raw `Date:` field value.
///
/// # Errors
///
/// Returns [`Error::Date`] describing the first malformed component.
pub fn parse_date(raw: &[u8]) -> Result<DateTime<FixedOffset>> {
    let mut tokenizer = Tokenizer::new(raw);
    let mut words: Vec<String> = Vec::new();
    while let Some(token) = tokenizer.next_token(b",") {
        match token {
            Token::Atom(atom) => words.push(String::from_utf8_lossy(atom).to_ascii_uppercase()),
            Token::Delimiter(_) => {
                // the day of week, if any, precedes the only comma
                words.clear();
            }
            Token::Comment(_) | Token::Quoted(_) | Token::Literal(_) => {}
        }
    }

    let mut words = words.iter().map(String::as_str);
    let mut next = |what: &str| {
        words
            .next()
            .ok_or_else(|| Error::Date(format!("missing {what}")))
    };

    let mut day_word = next("day")?;
    if day_word.starts_with(|c: char| c.is_ascii_alphabetic()) {
        // weekday without the comma
        day_word = next("day")?;
    }
    let day: u32 = number(day_word, "day")?;
    let month_word = next("month")?;
    let month = MONTHS
        .iter()
        .position(|m| month_word.starts_with(m))
        .ok_or_else(|| Error::Date(format!("unknown month {month_word:?}")))?;
    let year = expand_year(number(next("year")?, "year")?);
    let time = parse_time(next("time")?)?;
    let offset = match next("zone") {
        Ok(zone) => zone_offset(zone)?,
        Err(_) => 0,
    };

    #[allow(clippy::cast_possible_truncation)]
    let date = NaiveDate::from_ymd_opt(year, month as u32 + 1, day)
        .ok_or_else(|| Error::Date(format!("no such day {year}-{}-{day}", month + 1)))?;
    let offset = FixedOffset::east_opt(offset * 60)
        .ok_or_else(|| Error::Date(format!("offset out of range: {offset}")))?;

    offset
        .from_local_datetime(&date.and_time(time))
        .single()
        .ok_or_else(|| Error::Date("ambiguous local time".to_string()))
}

/// Parses an unsigned decimal field; signs are rejected.
fn number<T: std::str::FromStr>(word: &str, what: &str) -> Result<T> {
    let invalid = || Error::Date(format!("invalid {what} {word:?}"));
    if word.is_empty() || !word.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    word.parse().map_err(|_| invalid())
}

/// Two-digit years: 00-49 are 20xx and 50-99 are 19xx; three-digit years
/// are offset from 1900.
const fn expand_year(year: i32) -> i32 {
    match year {
        0..=49 => year + 2000,
        50..=999 => year + 1900,
        _ => year,
    }
}

fn parse_time(word: &str) -> Result<NaiveTime> {
    let mut parts = word.split(':');
    let hour: u32 = number(parts.next().unwrap_or_default(), "hour")?;
    let minute: u32 = number(parts.next().unwrap_or_default(), "minute")?;
    let second: u32 = match parts.next() {
        Some(second) => number(second, "second")?,
        None => 0,
    };
    if parts.next().is_some() {
        return Err(Error::Date(format!("invalid time {word:?}")));
    }
    // leap seconds are clamped
    NaiveTime::from_hms_opt(hour, minute, second.min(59))
        .ok_or_else(|| Error::Date(format!("invalid time {word:?}")))
}

/// Returns the zone offset in minutes east of UTC.
fn zone_offset(zone: &str) -> Result<i32> {
    if let Some(digits) = zone.strip_prefix('+').or_else(|| zone.strip_prefix('-')) {
        if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Date(format!("invalid zone {zone:?}")));
        }
        let hours: i32 = number(&digits[..2], "zone")?;
        let minutes: i32 = number(&digits[2..], "zone")?;
        let total = hours * 60 + minutes;
        return Ok(if zone.starts_with('-') { -total } else { total });
    }

    if let Some(&(_, minutes)) = ZONES.iter().find(|(name, _)| *name == zone) {
        return Ok(minutes);
    }
    // RFC 822 military zones
    match zone.as_bytes() {
        [b'Z'] => Ok(0),
        [c @ b'A'..=b'I'] => Ok(i32::from(c - b'A' + 1) * 60),
        [c @ b'K'..=b'M'] => Ok(i32::from(c - b'K' + 10) * 60),
        [c @ b'N'..=b'Y'] => Ok(-i32::from(c - b'N' + 1) * 60),
        _ => Err(Error::Date(format!("unknown zone {zone:?}"))),
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

    fn rfc3339(raw: &str) -> String {
        parse_date(raw.as_bytes()).unwrap().to_rfc3339()
    }

    #[test]
    fn test_full_date() {
        assert_eq!(
            rfc3339("Tue, 1 Jul 2003 10:52:37 +0200"),
            "2003-07-01T10:52:37+02:00"
        );
    }

    #[test]
    fn test_without_weekday_and_seconds() {
        assert_eq!(rfc3339("01 Jan 2024 08:05 -0500"), "2024-01-01T08:05:00-05:00");
    }

    #[test]
    fn test_weekday_without_comma() {
        assert_eq!(
            rfc3339("Fri 21 Nov 1997 09:55:06 -0600"),
            "1997-11-21T09:55:06-06:00"
        );
    }

    #[test]
    fn test_named_zones() {
        assert_eq!(rfc3339("1 Jul 2003 10:00 GMT"), "2003-07-01T10:00:00+00:00");
        assert_eq!(rfc3339("1 Jul 2003 10:00 EDT"), "2003-07-01T10:00:00-04:00");
        assert_eq!(rfc3339("1 Jul 2003 10:00 PST"), "2003-07-01T10:00:00-08:00");
        assert_eq!(rfc3339("1 Jul 2003 10:00 pdt"), "2003-07-01T10:00:00-07:00");
        assert_eq!(rfc3339("1 Jul 2003 10:00 Z"), "2003-07-01T10:00:00+00:00");
        assert_eq!(rfc3339("1 Jul 2003 10:00 A"), "2003-07-01T10:00:00+01:00");
        assert_eq!(rfc3339("1 Jul 2003 10:00 M"), "2003-07-01T10:00:00+12:00");
        assert_eq!(rfc3339("1 Jul 2003 10:00 Y"), "2003-07-01T10:00:00-12:00");
    }

    #[test]
    fn test_comments_and_two_digit_years() {
        assert_eq!(
            rfc3339("Thu, 13 Feb 69 23:32:54 -0330 (Newfoundland Time)"),
            "1969-02-13T23:32:54-03:30"
        );
        assert_eq!(rfc3339("5 Mar 07 01:02:03 +0000"), "2007-03-05T01:02:03+00:00");
    }

    #[test]
    fn test_missing_zone_is_utc() {
        assert_eq!(rfc3339("5 Mar 2007 01:02:03"), "2007-03-05T01:02:03+00:00");
    }

    #[test]
    fn test_invalid_dates() {
        for raw in [
            "",
            "garbage",
            "32 Jan 2024 10:00 +0000",
            "1 Foo 2024 10:00 +0000",
            "1 Jan 2024 25:00 +0000",
            "1 Jan 2024 10:00 +02",
            "1 Jan 2024 10:00 J",
            "1 Jan 2024 10:xx +0000",
        ] {
            assert_eq!(MailDate::parse(raw.as_bytes()), MailDate::Invalid, "{raw}");
        }
    }

    #[test]
    fn test_signed_fields_rejected() {
        for raw in [
            "+1 Jul 2003 10:00 +0000",
            "1 Jul -5 10:00 +0000",
            "1 Jul +2003 10:00 +0000",
            "1 Jul 2003 +10:00 +0000",
            "1 Jul 2003 10:-5 +0000",
        ] {
            assert_eq!(MailDate::parse(raw.as_bytes()), MailDate::Invalid, "{raw}");
        }
    }

    #[test]
    fn test_mail_date_valid() {
        let date = MailDate::parse(b"Tue, 1 Jul 2003 10:52:37 +0200");
        assert!(date.valid().is_some());
        assert!(MailDate::Invalid.valid().is_none());
    }
}
