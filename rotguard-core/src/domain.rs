// rotguard_core/src/domain.rs
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RotError};
use crate::parity::layout::ParityRef;
use crate::stats::RunSummary;

/// Lowercase hex SHA-256 digest of a file's content.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    pub const BYTES: usize = 32;

    pub fn parse(hex_str: &str) -> Result<Self> {
        let trimmed = hex_str.trim();
        let bytes = hex::decode(trimmed)
            .map_err(|e| RotError::InvalidHash(format!("{trimmed:?}: {e}")))?;
        if bytes.len() != Self::BYTES {
            return Err(RotError::InvalidHash(format!(
                "expected {} bytes ({} hex chars), got {}",
                Self::BYTES,
                Self::BYTES * 2,
                bytes.len()
            )));
        }
        Ok(Self(hex::encode(bytes)))
    }

    pub fn from_digest(bytes: [u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..16]
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for ContentHash {
    type Error = RotError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self {
        value.0
    }
}

/// One logical file slot: the top-level data root label plus the path below it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileKey {
    pub data_root: String,
    pub rel_path: String,
}

impl FileKey {
    pub fn new(data_root: impl Into<String>, rel_path: impl Into<String>) -> Self {
        Self {
            data_root: data_root.into(),
            rel_path: rel_path.into(),
        }
    }
}

impl fmt::Display for FileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.data_root, self.rel_path)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    New,
    Ok,
    Touched,
    Modified,
    Moved,
    Damaged,
    Truncated,
    Repaired,
}

impl FileStatus {
    pub const ALL: [FileStatus; 8] = [
        FileStatus::New,
        FileStatus::Ok,
        FileStatus::Touched,
        FileStatus::Modified,
        FileStatus::Moved,
        FileStatus::Damaged,
        FileStatus::Truncated,
        FileStatus::Repaired,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FileStatus::New => "new",
            FileStatus::Ok => "ok",
            FileStatus::Touched => "touched",
            FileStatus::Modified => "modified",
            FileStatus::Moved => "moved",
            FileStatus::Damaged => "damaged",
            FileStatus::Truncated => "truncated",
            FileStatus::Repaired => "repaired",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileStatus {
    type Err = RotError;

    fn from_str(s: &str) -> Result<Self> {
        FileStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| RotError::Format(format!("unknown file status {s:?}")))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    pub id: i64,
    pub key: FileKey,
    pub size_bytes: u64,
    pub mtime_ns: i64,
    pub content_hash: ContentHash,
    pub status: FileStatus,
    pub verified_at: Option<String>,
}

impl FileRecord {
    pub fn parity_ref(&self) -> ParityRef {
        ParityRef::for_hash(&self.content_hash)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunKind {
    Scan,
    Verify,
    Repair,
}

impl RunKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RunKind::Scan => "scan",
            RunKind::Verify => "verify",
            RunKind::Repair => "repair",
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A row of run history. `finished_at` is `None` while the run is in progress.
#[derive(Clone, Debug)]
pub struct RunRecord {
    pub id: i64,
    pub kind: Option<RunKind>,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub outcome: Option<String>,
    pub summary: RunSummary,
}
