//! Commit identity.

use serde::{Deserialize, Serialize};

/// Content-addressed commit identifier (hex SHA).
///
/// The empty hash is the sentinel for "no successful build yet"; diffs from it
/// start at the repository root state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitHash(String);

impl CommitHash {
    pub fn new(sha: impl Into<String>) -> Self {
        CommitHash(sha.into().trim().to_string())
    }

    /// The sentinel hash.
    pub fn empty() -> Self {
        CommitHash(String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form (first 7 chars).
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(7) {
            Some((end, _)) => &self.0[..end],
            None => &self.0,
        }
    }
}

impl From<&str> for CommitHash {
    fn from(s: &str) -> Self {
        CommitHash::new(s)
    }
}

impl From<String> for CommitHash {
    fn from(s: String) -> Self {
        CommitHash::new(s)
    }
}

impl std::fmt::Display for CommitHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sentinel() {
        assert!(CommitHash::empty().is_empty());
        assert!(CommitHash::new("  ").is_empty());
        assert!(!CommitHash::new("abc").is_empty());
    }

    #[test]
    fn test_short() {
        let hash = CommitHash::new("0123456789abcdef");
        assert_eq!(hash.short(), "0123456");
        assert_eq!(CommitHash::new("abc").short(), "abc");
        assert_eq!(CommitHash::new("0123456").short(), "0123456");
    }

    #[test]
    fn test_short_respects_char_boundaries() {
        assert_eq!(CommitHash::new("ab\u{e9}cdefgh").short(), "ab\u{e9}cdef");
        assert_eq!(CommitHash::new("\u{1f600}\u{1f600}").short(), "\u{1f600}\u{1f600}");
    }
}
