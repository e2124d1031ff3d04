//! Ordered scope sets.
//!
//! Scopes keep first-seen order everywhere. Stored scope strings are the
//! comma-joined form, and the token reuse lookup compares them by string
//! equality, so `read,write` and `write,read` are different keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered, duplicate-free set of scope names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(Vec<String>);

fn is_delimiter(c: char) -> bool {
    c == ',' || c.is_whitespace()
}

impl ScopeSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Builds a set from a sequence of items. Each item may itself hold
    /// several space- or comma-delimited names.
    pub fn normalize<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for item in items {
            for name in item.as_ref().split(is_delimiter) {
                set.insert(name);
            }
        }
        set
    }

    /// Parses a space- or comma-delimited scope string.
    pub fn parse(raw: &str) -> Self {
        Self::normalize([raw])
    }

    /// Adds `name` unless it is blank or already present. Returns whether it
    /// was added.
    pub fn insert(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() || self.contains(name) {
            return false;
        }
        self.0.push(name.to_string());
        true
    }

    /// Elements of `self` that `allowed` also holds, in `self`'s order.
    pub fn intersect(&self, allowed: &ScopeSet) -> ScopeSet {
        ScopeSet(
            self.0
                .iter()
                .filter(|name| allowed.contains(name))
                .cloned()
                .collect(),
        )
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|s| s == name)
    }

    pub fn is_subset_of(&self, other: &ScopeSet) -> bool {
        self.0.iter().all(|s| other.contains(s))
    }

    /// Storage form: comma-joined in order.
    pub fn join(&self) -> String {
        self.0.join(",")
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl FromStr for ScopeSet {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Space-separated, the form OAuth2 responses use.
impl fmt::Display for ScopeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(" "))
    }
}

impl From<Vec<String>> for ScopeSet {
    fn from(value: Vec<String>) -> Self {
        Self::normalize(value)
    }
}

impl From<&[&str]> for ScopeSet {
    fn from(value: &[&str]) -> Self {
        Self::normalize(value.iter())
    }
}

impl<const N: usize> From<[&str; N]> for ScopeSet {
    fn from(value: [&str; N]) -> Self {
        Self::normalize(value)
    }
}

impl From<&str> for ScopeSet {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl<'a> IntoIterator for &'a ScopeSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(set: &ScopeSet) -> Vec<&str> {
        set.iter().collect()
    }

    #[test]
    fn test_parse_mixed_delimiters() {
        let set = ScopeSet::parse("read, write  admin,,profile");
        assert_eq!(names(&set), vec!["read", "write", "admin", "profile"]);
    }

    #[test]
    fn test_normalize_keeps_first_seen_order() {
        let set = ScopeSet::normalize(["write", "read", "write", "admin read"]);
        assert_eq!(names(&set), vec!["write", "read", "admin"]);
    }

    #[test]
    fn test_normalize_drops_blank_names() {
        let set = ScopeSet::normalize(["", "   ", "read", "\t"]);
        assert_eq!(names(&set), vec!["read"]);

        assert!(ScopeSet::parse("  ,  ").is_empty());
    }

    #[test]
    fn test_intersect_uses_requested_order() {
        let allowed = ScopeSet::from(["read", "write", "admin"]);
        let requested = ScopeSet::from(["write", "read", "delete"]);

        let granted = requested.intersect(&allowed);
        assert_eq!(names(&granted), vec!["write", "read"]);
    }

    #[test]
    fn test_intersect_is_subset_and_idempotent() {
        let allowed = ScopeSet::parse("a b c d");
        let samples = [
            "d c b a",
            "x y z",
            "",
            "a a a",
            "c,x,a",
            "b d e f a",
        ];

        for sample in samples {
            let once = ScopeSet::parse(sample).intersect(&allowed);
            assert!(once.is_subset_of(&allowed), "{sample}: not a subset");
            assert_eq!(once.intersect(&allowed), once, "{sample}: not idempotent");

            // Order follows the request
            let requested = ScopeSet::parse(sample);
            let positions: Vec<usize> = once
                .iter()
                .map(|n| requested.iter().position(|r| r == n).unwrap())
                .collect();
            assert!(positions.windows(2).all(|w| w[0] < w[1]), "{sample}: reordered");
        }
    }

    #[test]
    fn test_join_round_trip_preserves_order() {
        let set = ScopeSet::from(["profile", "email", "openid"]);
        let stored = set.join();
        assert_eq!(stored, "profile,email,openid");
        assert_eq!(ScopeSet::parse(&stored), set);
    }

    #[test]
    fn test_display_is_space_separated() {
        let set = ScopeSet::from(["read", "write"]);
        assert_eq!(set.to_string(), "read write");
    }

    #[test]
    fn test_order_matters_for_equality() {
        assert_ne!(ScopeSet::parse("a b"), ScopeSet::parse("b a"));
        assert_ne!(ScopeSet::parse("a b").join(), ScopeSet::parse("b a").join());
    }
}
