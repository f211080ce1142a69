//! Validated branch name newtype.
//!
//! Branch names flow into spawned `git` invocations and into ref paths, so
//! they are validated once at the boundary: git's own refname rules plus a
//! rejection of shell metacharacters.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::Error;

/// A branch name that satisfies git's refname rules.
///
/// # Examples
///
/// ```
/// use strata_core::BranchName;
///
/// let name = BranchName::new("feature/auth").unwrap();
/// assert_eq!(name.as_str(), "feature/auth");
///
/// assert!(BranchName::new("../escape").is_err());
/// assert!(BranchName::new("name;rm -rf").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchName(String);

/// Characters git forbids in refnames, plus shell metacharacters.
const FORBIDDEN: &[char] = &[
    ' ', '~', '^', ':', '?', '*', '[', '$', ';', '|', '&', '>', '<', '`', '\\', '"', '\'', '(',
    ')', '{', '}', '!',
];

/// Substrings that are invalid anywhere in a refname.
const FORBIDDEN_SEQS: &[&str] = &["..", "//", "@{", "/."];

impl BranchName {
    /// Create a validated branch name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBranchName`] if the name violates git's
    /// refname rules or contains shell metacharacters.
    pub fn new(name: impl Into<String>) -> Result<Self, Error> {
        let name = name.into();
        if let Some(reason) = validation_failure(&name) {
            return Err(Error::InvalidBranchName {
                name,
                reason: reason.to_string(),
            });
        }
        Ok(Self(name))
    }

    /// The name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume and return the inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

fn validation_failure(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        return Some("name cannot be empty");
    }
    if name == "@" {
        return Some("name cannot be '@'");
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Some("name cannot start or end with '.'");
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Some("name cannot start or end with '/'");
    }
    if name.ends_with(".lock") {
        return Some("name cannot end with '.lock'");
    }
    if name.chars().any(|c| c.is_ascii_control()) {
        return Some("name cannot contain control characters");
    }
    if name.contains(FORBIDDEN) {
        return Some("name contains a character git forbids in refnames");
    }
    if FORBIDDEN_SEQS.iter().any(|seq| name.contains(seq)) {
        return Some("name contains a sequence git forbids in refnames");
    }
    None
}

impl AsRef<str> for BranchName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for BranchName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for BranchName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl PartialEq<str> for BranchName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for BranchName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl PartialEq<String> for BranchName {
    fn eq(&self, other: &String) -> bool {
        self.0 == *other
    }
}

impl Serialize for BranchName {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for BranchName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_names() {
        for name in [
            "main",
            "feature/auth",
            "feature/user/login",
            "fix-bug-123",
            "my_feature",
            "v1.0.0",
            "user@feature",
        ] {
            assert!(BranchName::new(name).is_ok(), "rejected: {name}");
        }
    }

    #[test]
    fn rejects_refname_rule_violations() {
        for name in [
            "",
            "@",
            ".hidden",
            "branch.",
            "branch.lock",
            "/branch",
            "branch/",
            "a..b",
            "a//b",
            "a@{1}",
            "feature/.hidden",
            "../etc/passwd",
        ] {
            assert!(BranchName::new(name).is_err(), "accepted: {name}");
        }
    }

    #[test]
    fn rejects_shell_metacharacters() {
        for c in ['$', ';', '|', '&', '`', '(', ')', '!', '\'', '"'] {
            let name = format!("branch{c}name");
            assert!(BranchName::new(&name).is_err(), "accepted: {name}");
        }
        assert!(BranchName::new("branch$(whoami)").is_err());
        assert!(BranchName::new("branch;rm -rf /").is_err());
    }

    #[test]
    fn serde_round_trip_revalidates() {
        let name = BranchName::new("feature/auth").unwrap();
        let json = serde_json::to_string(&name).unwrap();
        assert_eq!(json, "\"feature/auth\"");

        let parsed: BranchName = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, name);

        let bad: Result<BranchName, _> = serde_json::from_str("\"..nope\"");
        assert!(bad.is_err());
    }
}
