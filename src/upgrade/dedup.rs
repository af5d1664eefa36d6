use std::collections::HashSet;

use super::{short_uid, truncate_chars};

/// Tracks seen identifiers and produces unused variants of colliding ones.
///
/// With `case_insensitive` set, uniqueness ignores ASCII and Unicode case, as
/// needed on backends whose collation does. With a non-zero `max_len`, values
/// are compared after truncation and generated values never exceed it.
#[derive(Debug, Clone, Default)]
pub struct Deduplicator {
    set: HashSet<String>,
    case_insensitive: bool,
    max_len: usize,
}

impl Deduplicator {
    pub fn new(case_insensitive: bool, max_len: usize) -> Self {
        Self {
            set: HashSet::new(),
            case_insensitive,
            max_len,
        }
    }

    fn normalize(&self, value: &str) -> String {
        let value = if self.case_insensitive {
            value.to_lowercase()
        } else {
            value.to_string()
        };
        if self.max_len > 0 {
            truncate_chars(&value, self.max_len)
        } else {
            value
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.set.contains(&self.normalize(value))
    }

    pub fn add(&mut self, value: &str) {
        let normalized = self.normalize(value);
        self.set.insert(normalized);
    }

    /// Returns `value` with a random `_<uid>` suffix. The result is not added.
    pub fn deduplicate(&self, value: &str) -> String {
        loop {
            let uid = short_uid();
            let suffix_len = 1 + uid.chars().count();
            let base = if self.max_len > 0 && value.chars().count() + suffix_len > self.max_len {
                truncate_chars(value, self.max_len.saturating_sub(suffix_len))
            } else {
                value.to_string()
            };
            let candidate = format!("{base}_{uid}");
            if !self.contains(&candidate) {
                return candidate;
            }
        }
    }
}
