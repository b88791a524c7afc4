// rotguard_core/src/parity/mod.rs
use std::fs::File;
use std::io;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::domain::ContentHash;
use crate::error::{Result, RotError};
use layout::ParityRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VerifyOutcome {
    Ok,
    Damaged,
    /// No artifact exists for the hash.
    Missing,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepairOutcome {
    Repaired,
    /// Redundancy exhausted or no artifact; the file needs an external restore.
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Erasure-coding capability keyed by content hash.
///
/// `create` must be all-or-nothing: an artifact is only visible at its final
/// location once fully written, and creating an existing artifact succeeds
/// without rewriting it.
pub trait ParityService: Send + Sync {
    fn create(&self, hash: &ContentHash, source: &Path, redundancy_percent: u8)
    -> Result<ParityRef>;

    fn verify(&self, hash: &ContentHash, source: &Path) -> Result<VerifyOutcome>;

    fn repair(&self, hash: &ContentHash, source: &Path) -> Result<RepairOutcome>;

    fn delete(&self, hash: &ContentHash) -> Result<DeleteOutcome>;
}

/// Replace `dest` with the bytes of `from`, through a temp file beside `dest`.
pub(crate) fn restore_file(from: &Path, dest: &Path) -> Result<()> {
    let dir = dest
        .parent()
        .ok_or_else(|| RotError::Parity(format!("{} has no parent", dest.display())))?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    io::copy(&mut File::open(from)?, tmp.as_file_mut())?;
    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| RotError::Io(e.error))?;
    Ok(())
}

pub mod layout;
pub mod mirror;
pub mod par2;
