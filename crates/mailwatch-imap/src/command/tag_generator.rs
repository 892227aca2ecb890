//! IMAP command tag generator.
//!
//! Tags are used to match commands with their responses. Each tag is four
//! characters from `[A-Z0-9]`, taken from a per-connection counter whose
//! start is seeded from the clock and a process-wide connection number, so
//! two sessions rarely share a tag sequence and one session never repeats a
//! tag before 36^4 commands.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const ALPHABET: &[u8; 36] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const TAG_LEN: usize = 4;
/// Number of distinct tags.
pub const TAG_SPACE: u32 = 36 * 36 * 36 * 36;

static CONNECTIONS: AtomicU32 = AtomicU32::new(0);

/// Tag generator for IMAP commands.
#[derive(Debug, Clone)]
pub struct TagGenerator {
    counter: u32,
}

impl TagGenerator {
    /// Creates a generator seeded from the current time and a connection
    /// number.
    #[must_use]
    pub fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.subsec_nanos());
        let identity = CONNECTIONS
            .fetch_add(1, Ordering::Relaxed)
            .wrapping_mul(7919);
        Self::with_seed(nanos ^ std::process::id() ^ identity)
    }

    /// Creates a generator starting at a fixed seed.
    #[must_use]
    pub const fn with_seed(seed: u32) -> Self {
        Self {
            counter: seed % TAG_SPACE,
        }
    }

    /// Generates the next tag.
    pub fn next(&mut self) -> String {
        let mut value = self.counter;
        self.counter = (self.counter + 1) % TAG_SPACE;

        let mut tag = [0u8; TAG_LEN];
        for slot in tag.iter_mut().rev() {
            *slot = ALPHABET[(value % 36) as usize];
            value /= 36;
        }
        tag.iter().map(|&b| char::from(b)).collect()
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new()
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
    fn test_tag_generation() {
        let mut generator = TagGenerator::with_seed(0);
        assert_eq!(generator.next(), "AAAA");
        assert_eq!(generator.next(), "AAAB");
        assert_eq!(generator.next(), "AAAC");
    }

    #[test]
    fn test_digit_carry() {
        let mut generator = TagGenerator::with_seed(35);
        assert_eq!(generator.next(), "AAA9");
        assert_eq!(generator.next(), "AABA");
    }

    #[test]
    fn test_wraps_at_end_of_space() {
        let mut generator = TagGenerator::with_seed(TAG_SPACE - 1);
        assert_eq!(generator.next(), "9999");
        assert_eq!(generator.next(), "AAAA");
    }

    #[test]
    fn test_format() {
        let mut generator = TagGenerator::new();
        for _ in 0..100 {
            let tag = generator.next();
            assert_eq!(tag.len(), 4);
            assert!(tag.bytes().all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_uniqueness() {
        let mut generator = TagGenerator::new();
        let mut seen = std::collections::HashSet::new();

        for _ in 0..10000 {
            let tag = generator.next();
            assert!(seen.insert(tag), "duplicate tag generated");
        }
    }
}
