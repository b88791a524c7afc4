//! Repair action for records marked `damaged`. Runs outside the scan cycle.

use tracing::{error, info, warn};

use crate::config::Config;
use crate::domain::{FileRecord, FileStatus};
use crate::error::Result;
use crate::hash::sha256::hash_file;
use crate::manifest::Manifest;
use crate::parity::{ParityService, RepairOutcome, VerifyOutcome};
use crate::snapshot::SnapshotSource;
use crate::stats::RunSummary;

pub struct Repairer<'a> {
    config: &'a Config,
    manifest: &'a Manifest,
    parity: &'a dyn ParityService,
    source: &'a dyn SnapshotSource,
}

impl<'a> Repairer<'a> {
    pub fn new(
        config: &'a Config,
        manifest: &'a Manifest,
        parity: &'a dyn ParityService,
        source: &'a dyn SnapshotSource,
    ) -> Self {
        Self {
            config,
            manifest,
            parity,
            source,
        }
    }

    pub fn pending(&self) -> Result<Vec<FileRecord>> {
        self.manifest.by_status(FileStatus::Damaged)
    }

    /// Attempt every damaged record. Unrepairable files stay `damaged`.
    pub fn run(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();
        let damaged = self.pending()?;
        info!(files = damaged.len(), "repairing");
        for rec in damaged {
            self.repair_one(&rec, &mut summary)?;
        }
        Ok(summary)
    }

    fn repair_one(&self, rec: &FileRecord, summary: &mut RunSummary) -> Result<()> {
        let path = self.source.absolute_path(&rec.key);
        match self.source.probe(&rec.key) {
            Ok(Some(_)) => {}
            Ok(None) => {
                error!(path = %path.display(), "file not found");
                summary.error(format!("not found: {}", path.display()));
                return Ok(());
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot stat");
                summary.error(format!("stat error: {}: {e}", path.display()));
                return Ok(());
            }
        }
        let current = match hash_file(&path) {
            Ok(h) => h,
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot hash");
                summary.error(format!("hash error: {}: {e}", path.display()));
                return Ok(());
            }
        };

        if current == rec.content_hash {
            return self.rebuild_parity(rec, &path, summary);
        }

        match self.parity.repair(&rec.content_hash, &path) {
            Ok(RepairOutcome::Repaired) => {}
            Ok(RepairOutcome::Failed) => {
                warn!(file = %rec.key, "unrepairable, restore from backup");
                summary.error(format!("repair failed: {}", path.display()));
                return Ok(());
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "repair error");
                summary.error(format!("repair error: {}: {e}", path.display()));
                return Ok(());
            }
        }

        match self.parity.verify(&rec.content_hash, &path) {
            Ok(VerifyOutcome::Ok) => {
                if let Ok(Some(facts)) = self.source.probe(&rec.key) {
                    self.manifest.update_metadata(
                        rec.id,
                        facts.size_bytes,
                        facts.mtime_ns,
                        FileStatus::Repaired,
                    )?;
                }
                self.manifest.mark_verified(rec.id, FileStatus::Repaired)?;
                summary.repaired += 1;
                info!(file = %rec.key, "repaired");
            }
            Ok(outcome) => {
                warn!(file = %rec.key, ?outcome, "post-repair verify failed");
                summary.error(format!("post-repair verify {outcome:?}: {}", path.display()));
            }
            Err(e) => {
                summary.error(format!("post-repair verify error: {}: {e}", path.display()));
            }
        }
        Ok(())
    }

    /// The file still matches its recorded hash, so the artifact is the damaged side.
    fn rebuild_parity(
        &self,
        rec: &FileRecord,
        path: &std::path::Path,
        summary: &mut RunSummary,
    ) -> Result<()> {
        warn!(file = %rec.key, "file matches manifest hash, parity is corrupt");
        if let Err(e) = self.parity.delete(&rec.content_hash) {
            summary.error(format!("parity delete failed: {}: {e}", path.display()));
            return Ok(());
        }
        match self
            .parity
            .create(&rec.content_hash, path, self.config.redundancy_percent)
        {
            Ok(_) => {
                self.manifest.mark_verified(rec.id, FileStatus::Ok)?;
                summary.parity_recreated += 1;
                info!(file = %rec.key, "parity re-created");
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "parity re-create failed");
                summary.error(format!("parity re-create failed: {}: {e}", path.display()));
            }
        }
        Ok(())
    }
}
