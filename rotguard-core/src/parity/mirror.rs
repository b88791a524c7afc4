use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::{debug, error, info};

use super::layout::{ParityLayout, ParityRef};
use super::{DeleteOutcome, ParityService, RepairOutcome, VerifyOutcome, restore_file};
use crate::domain::ContentHash;
use crate::error::{Result, RotError};
use crate::hash::sha256::hash_file;
use crate::util::hash_forward::HashingForward;

const MIRROR_SUFFIX: &str = "mirror";

/// Full-copy redundancy: the artifact is a byte-for-byte replica of the file.
///
/// Useful where par2 is not installed, and as the backend exercised by tests.
/// The index file holds the full digest; the replica lives next to it.
pub struct MirrorParity {
    layout: ParityLayout,
}

impl MirrorParity {
    pub fn new(layout: ParityLayout) -> Self {
        Self { layout }
    }

    fn replica_intact(&self, r: &ParityRef, hash: &ContentHash) -> io::Result<bool> {
        let replica = self.layout.companion_path(r, MIRROR_SUFFIX);
        if !replica.is_file() {
            return Ok(false);
        }
        Ok(hash_file(&replica)? == *hash)
    }
}

impl ParityService for MirrorParity {
    fn create(
        &self,
        hash: &ContentHash,
        source: &Path,
        _redundancy_percent: u8,
    ) -> Result<ParityRef> {
        let r = ParityRef::for_hash(hash);
        if self.layout.exists(&r) {
            debug!(artifact = %r, "mirror already exists");
            return Ok(r);
        }

        let staging = self.layout.stage()?;
        let replica = File::create(staging.path().join(r.companion_name(MIRROR_SUFFIX)))?;
        let mut fwd = HashingForward::new(BufWriter::new(replica));
        io::copy(&mut File::open(source)?, &mut fwd)?;
        fwd.flush()?;
        let (w, copied) = fwd.finish();
        w.into_inner()
            .map_err(|e| RotError::Io(e.into_error()))?
            .sync_all()?;
        if copied != *hash {
            return Err(RotError::Parity(format!(
                "{} changed while mirroring (expected {}, read {})",
                source.display(),
                hash.short(),
                copied.short()
            )));
        }
        fs::write(staging.path().join(r.par2_name()), hash.as_str())?;
        self.layout.publish(staging.path(), &r)?;
        debug!(artifact = %r, "created mirror");
        Ok(r)
    }

    fn verify(&self, hash: &ContentHash, source: &Path) -> Result<VerifyOutcome> {
        let r = ParityRef::for_hash(hash);
        if !self.layout.exists(&r) || !self.layout.companion_path(&r, MIRROR_SUFFIX).is_file() {
            return Ok(VerifyOutcome::Missing);
        }
        if hash_file(source)? == *hash {
            Ok(VerifyOutcome::Ok)
        } else {
            Ok(VerifyOutcome::Damaged)
        }
    }

    fn repair(&self, hash: &ContentHash, source: &Path) -> Result<RepairOutcome> {
        let r = ParityRef::for_hash(hash);
        if !self.layout.exists(&r) || !self.replica_intact(&r, hash)? {
            error!(path = %source.display(), artifact = %r, "mirror missing or damaged");
            return Ok(RepairOutcome::Failed);
        }
        restore_file(&self.layout.companion_path(&r, MIRROR_SUFFIX), source)?;
        info!(path = %source.display(), "restored from mirror");
        Ok(RepairOutcome::Repaired)
    }

    fn delete(&self, hash: &ContentHash) -> Result<DeleteOutcome> {
        let r = ParityRef::for_hash(hash);
        match self.layout.remove_artifacts(&r)? {
            0 => Ok(DeleteOutcome::NotFound),
            _ => Ok(DeleteOutcome::Deleted),
        }
    }
}
