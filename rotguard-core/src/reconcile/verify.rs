use std::path::PathBuf;

use rayon::ThreadPool;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use super::{Reconciler, file_error};
use crate::domain::{ContentHash, FileRecord, FileStatus};
use crate::error::{Result, RotError};
use crate::hash::sha256::hash_file;
use crate::parity::{ParityService, VerifyOutcome};
use crate::snapshot::{SnapshotEntry, SnapshotSource};
use crate::stats::RunSummary;

/// What a worker found for one sampled record.
enum Check {
    Intact,
    Damaged,
    /// Parity is gone; carries a fresh digest of the live file.
    ParityMissing(std::io::Result<ContentHash>),
    BelowMinimum(u64),
    Failed(RotError),
}

/// How many of `n` unchanged files a run verifies at `percent`.
pub(super) fn sample_size(n: usize, percent: u8) -> usize {
    match percent {
        0 => 0,
        p if p >= 100 => n,
        p => (n * p as usize / 100).max(1).min(n),
    }
}

fn check(
    parity: &dyn ParityService,
    source: &dyn SnapshotSource,
    min_size: u64,
    rec: &FileRecord,
    path: &std::path::Path,
) -> Check {
    match source.probe(&rec.key) {
        Ok(Some(facts)) if facts.size_bytes < min_size => {
            return Check::BelowMinimum(facts.size_bytes);
        }
        Ok(Some(_)) => {}
        Ok(None) => {
            return Check::Failed(RotError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "vanished before verification",
            )));
        }
        Err(e) => return Check::Failed(e.into()),
    }
    match parity.verify(&rec.content_hash, path) {
        Ok(VerifyOutcome::Ok) => Check::Intact,
        Ok(VerifyOutcome::Damaged) => Check::Damaged,
        Ok(VerifyOutcome::Missing) => Check::ParityMissing(hash_file(path)),
        Err(e) => Check::Failed(e),
    }
}

impl Reconciler<'_> {
    /// Phase 3: verify a uniform random sample of unchanged records.
    ///
    /// `recreate_missing` allows rebuilding parity that vanished from the store;
    /// the read-only `verify` command reports it instead.
    pub(super) fn verify_sample(
        &self,
        pool: &ThreadPool,
        unchanged: Vec<(SnapshotEntry, FileRecord)>,
        recreate_missing: bool,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let pool_size_before = unchanged.len();
        let eligible: Vec<FileRecord> = unchanged
            .into_iter()
            .map(|(_, rec)| rec)
            .filter(|rec| rec.status != FileStatus::Damaged)
            .collect();
        let skipped = pool_size_before - eligible.len();
        if skipped > 0 {
            debug!(skipped, "damaged records wait for repair");
        }

        let k = sample_size(eligible.len(), self.config.verify_percent);
        let sample: Vec<FileRecord> = if k == eligible.len() {
            eligible
        } else {
            let mut picked =
                rand::seq::index::sample(&mut self.rng(), eligible.len(), k).into_vec();
            picked.sort_unstable();
            let mut slots: Vec<Option<FileRecord>> = eligible.into_iter().map(Some).collect();
            picked.into_iter().filter_map(|i| slots[i].take()).collect()
        };
        if sample.is_empty() {
            return Ok(());
        }
        info!(files = sample.len(), percent = self.config.verify_percent, "verifying");

        let parity = self.parity;
        let source = self.source;
        let min_size = self.config.min_file_size;
        let checked: Vec<(FileRecord, PathBuf, Check)> = pool.install(|| {
            sample
                .into_par_iter()
                .map(|rec| {
                    let path = source.absolute_path(&rec.key);
                    let c = check(parity, source, min_size, &rec, &path);
                    (rec, path, c)
                })
                .collect()
        });

        for (rec, path, c) in checked {
            self.settle(rec, path, c, recreate_missing, summary)?;
        }
        Ok(())
    }

    fn settle(
        &self,
        rec: FileRecord,
        path: PathBuf,
        check: Check,
        recreate_missing: bool,
        summary: &mut RunSummary,
    ) -> Result<()> {
        match check {
            Check::Intact => {
                self.manifest.mark_verified(rec.id, FileStatus::Ok)?;
                summary.verified += 1;
                debug!(file = %rec.key, "verified");
            }
            Check::Damaged => {
                self.manifest.set_status(rec.id, FileStatus::Damaged)?;
                summary.verified += 1;
                summary.damaged += 1;
                warn!(file = %rec.key, "DAMAGED");
            }
            Check::ParityMissing(Ok(current)) if current == rec.content_hash => {
                if !recreate_missing {
                    warn!(file = %rec.key, "parity missing");
                    summary.error(file_error("parity missing", &path, "run scan to recreate"));
                    return Ok(());
                }
                match self
                    .parity
                    .create(&rec.content_hash, &path, self.config.redundancy_percent)
                {
                    Ok(_) => {
                        self.manifest.mark_verified(rec.id, FileStatus::Ok)?;
                        summary.verified += 1;
                        summary.parity_recreated += 1;
                        info!(file = %rec.key, "parity was missing, recreated");
                    }
                    Err(e) => {
                        error!(path = %path.display(), error = %e, "parity re-create failed");
                        summary.error(file_error("parity re-create failed", &path, e));
                    }
                }
            }
            Check::ParityMissing(Ok(_)) => {
                // content drifted under unchanged metadata and there is nothing to repair from
                self.manifest.set_status(rec.id, FileStatus::Damaged)?;
                summary.verified += 1;
                summary.damaged += 1;
                warn!(file = %rec.key, "DAMAGED, and parity is missing");
            }
            Check::ParityMissing(Err(e)) => {
                error!(path = %path.display(), error = %e, "cannot hash");
                summary.error(file_error("hash error", &path, e));
            }
            Check::BelowMinimum(size) => {
                self.manifest.set_status(rec.id, FileStatus::Truncated)?;
                summary.truncated += 1;
                warn!(file = %rec.key, size, "truncated");
            }
            Check::Failed(e) => {
                error!(path = %path.display(), error = %e, "verify failed");
                summary.error(file_error("verify error", &path, e));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::sample_size;

    #[test]
    fn sample_sizes() {
        assert_eq!(sample_size(0, 50), 0);
        assert_eq!(sample_size(10, 0), 0);
        assert_eq!(sample_size(10, 100), 10);
        assert_eq!(sample_size(10, 50), 5);
        // never rounds a non-empty pool down to nothing
        assert_eq!(sample_size(3, 10), 1);
        assert_eq!(sample_size(1000, 1), 10);
    }
}
