//! Identifier newtypes.

use serde::{Deserialize, Serialize};

/// Opaque identifier of one remote data file, stable across restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Create a new file identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for FileId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// Logical partition a file's content belongs to. One expert owns one
/// checkpoint and one target namespace in the graph store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpertId(String);

impl ExpertId {
    /// Create a new expert identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExpertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for ExpertId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_id_display_and_as_str() {
        let id = FileId::new("piece-abc");
        assert_eq!(id.as_str(), "piece-abc");
        assert_eq!(id.to_string(), "piece-abc");
    }

    #[test]
    fn expert_id_eq_and_hash() {
        use std::collections::HashSet;
        let a = ExpertId::new("f01234");
        let b = ExpertId::new("f01234");
        assert_eq!(a, b);
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn file_id_serde_transparent() {
        let id = FileId::new("x");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"x\"");
    }
}
