//! Command tags and their generation.
//!
//! Tags correlate an IMAP command with its terminal response.

use std::sync::atomic::{AtomicU32, Ordering};

/// A command tag (e.g. `A0001`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Tag(String);

impl Tag {
    /// Creates a tag from its wire text.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Returns the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tag generator for IMAP commands.
///
/// Generates unique sequential tags in the format "A0001", "A0002",
/// etc. The counter is per-session and monotonic.
#[derive(Debug)]
pub struct TagGenerator {
    counter: AtomicU32,
    prefix: char,
}

impl TagGenerator {
    /// Creates a new tag generator with the given prefix.
    #[must_use]
    pub const fn new(prefix: char) -> Self {
        Self {
            counter: AtomicU32::new(0),
            prefix,
        }
    }

    /// Generates the next tag.
    #[must_use]
    pub fn next(&self) -> Tag {
        let n = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        Tag(format!("{}{:04}", self.prefix, n))
    }

    /// Returns how many tags have been generated.
    #[must_use]
    pub fn issued(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }
}

impl Default for TagGenerator {
    fn default() -> Self {
        Self::new('A')
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
    fn test_tag_generation_is_sequential() {
        let generator = TagGenerator::default();
        assert_eq!(generator.next().as_str(), "A0001");
        assert_eq!(generator.next().as_str(), "A0002");
        assert_eq!(generator.next().as_str(), "A0003");
        assert_eq!(generator.issued(), 3);
    }

    #[test]
    fn test_custom_prefix() {
        let generator = TagGenerator::new('T');
        assert_eq!(generator.next().as_str(), "T0001");
    }

    #[test]
    fn test_uniqueness() {
        let generator = TagGenerator::default();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..10_000 {
            assert!(seen.insert(generator.next()), "duplicate tag generated");
        }
    }
}
