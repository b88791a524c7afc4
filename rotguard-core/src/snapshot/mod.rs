//! The current set of on-disk files, as seen by the reconciler.

use std::fs::Metadata;
use std::io;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use crate::domain::FileKey;

pub mod exclude;
pub mod walk;

pub use exclude::ExcludeSet;
pub use walk::FsSnapshot;

/// One eligible file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SnapshotEntry {
    pub key: FileKey,
    pub size_bytes: u64,
    pub mtime_ns: i64,
}

/// Size and timestamp of whatever currently sits at a path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileFacts {
    pub size_bytes: u64,
    pub mtime_ns: i64,
}

impl FileFacts {
    pub fn from_metadata(meta: &Metadata) -> io::Result<Self> {
        Ok(Self {
            size_bytes: meta.len(),
            mtime_ns: mtime_ns(meta)?,
        })
    }
}

pub trait SnapshotSource: Send + Sync {
    /// Eligible files, already filtered by name patterns and size bounds.
    /// Each call walks afresh.
    fn entries(&self) -> Box<dyn Iterator<Item = SnapshotEntry> + '_>;

    fn absolute_path(&self, key: &FileKey) -> PathBuf;

    /// Direct on-disk check, ignoring every filter. `None` when nothing exists at the path.
    fn probe(&self, key: &FileKey) -> io::Result<Option<FileFacts>>;
}

/// Nanoseconds since the epoch; negative for timestamps before it.
pub fn mtime_ns(meta: &Metadata) -> io::Result<i64> {
    let modified = meta.modified()?;
    let ns = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_nanos() as i64,
        Err(before) => -(before.duration().as_nanos() as i64),
    };
    Ok(ns)
}
