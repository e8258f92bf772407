//! Per-expert replay checkpoint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ids::FileId;

/// Replay progress for one expert: which file of the sequence is being
/// applied, the last line already written to the graph store, and the
/// index→file mapping accumulated as files become ready.
///
/// Invariants: `line` only advances within a fixed `index`; `index` only
/// advances when `line` resets to 0 on completion of the prior file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteRecord {
    /// Target namespace in the graph store, discovered from file headers
    /// or space-creation statements. Persisted so a resumed replay does
    /// not depend on re-reading a half-applied file.
    #[serde(default)]
    pub domain: Option<String>,
    /// Sequence index of the file currently being replayed.
    pub index: i64,
    /// Last successfully applied line within that file; 0 = nothing yet.
    pub line: i64,
    /// Sequence index → file ID, independent of arrival order.
    #[serde(default)]
    pub history: BTreeMap<i64, FileId>,
}

impl WriteRecord {
    /// Checkpoint for an expert that has never replayed anything.
    #[must_use]
    pub fn new() -> Self {
        Self {
            domain: None,
            index: 1,
            line: 0,
            history: BTreeMap::new(),
        }
    }
}

impl Default for WriteRecord {
    fn default() -> Self {
        Self::new()
    }
}
