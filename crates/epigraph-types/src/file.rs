//! File lifecycle model.

use serde::{Deserialize, Serialize};

use crate::ids::{ExpertId, FileId};

/// Lifecycle of one remote data file, ordered: a file only moves forward
/// unless a caller explicitly demotes it back to [`FileStatus::New`] for a
/// refresh. Serialized as its ordinal so stored records stay compatible
/// with the numeric wire form.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(into = "u64", try_from = "u64")]
pub enum FileStatus {
    #[default]
    New,
    Downloading,
    Downloaded,
    Importing,
    Imported,
    Registering,
    Registered,
    NeedStorage,
    Storaging,
    Storaged,
    Replayed,
}

impl FileStatus {
    const ALL: [FileStatus; 11] = [
        FileStatus::New,
        FileStatus::Downloading,
        FileStatus::Downloaded,
        FileStatus::Importing,
        FileStatus::Imported,
        FileStatus::Registering,
        FileStatus::Registered,
        FileStatus::NeedStorage,
        FileStatus::Storaging,
        FileStatus::Storaged,
        FileStatus::Replayed,
    ];
}

impl From<FileStatus> for u64 {
    fn from(status: FileStatus) -> Self {
        status as u64
    }
}

impl TryFrom<u64> for FileStatus {
    type Error = String;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        FileStatus::ALL
            .get(value as usize)
            .copied()
            .ok_or_else(|| format!("unknown file status ordinal: {value}"))
    }
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

/// One remote data file tracked through acquisition and replay.
///
/// Stored as JSON under its [`FileId`]. Owned exclusively by whichever
/// component is advancing its stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRef {
    pub id: FileId,

    /// Position of this file within its expert's ordered sequence.
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub index: i64,
    /// Total files in the sequence, when the listing reports it.
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub count: i64,

    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub file_size: i64,
    /// MD5 of the file content, verified after transfer.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub check_sum: String,

    #[serde(default, skip_serializing_if = "expert_is_empty")]
    pub expert: ExpertId,

    /// Canonical location on the source side.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
    /// Materialized local copy.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub local_path: String,
    /// Plain HTTP fetch source, when listed by the HTTP service.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub url: String,

    // Retrieval-network identifiers, used instead of `url` when the file
    // is sourced from the storage-deal chain.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub root_cid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub piece_cid: String,
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub piece_size: u64,

    #[serde(default)]
    pub status: FileStatus,
}

fn expert_is_empty(expert: &ExpertId) -> bool {
    expert.as_str().is_empty()
}

impl FileRef {
    /// A freshly discovered file, before any metadata refresh.
    #[must_use]
    pub fn new(id: FileId) -> Self {
        Self {
            id,
            status: FileStatus::New,
            ..Self::default()
        }
    }
}
