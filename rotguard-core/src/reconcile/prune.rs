use std::collections::HashSet;

use tracing::{debug, error, info, warn};

use super::Reconciler;
use crate::domain::{FileKey, FileStatus};
use crate::error::Result;
use crate::stats::RunSummary;

impl Reconciler<'_> {
    /// Phase 4: records whose path the snapshot did not produce.
    ///
    /// A record is removed only when its path is also absent on disk; files
    /// that shrank below the minimum size are kept and marked `truncated`.
    pub(super) fn prune(&self, seen: &HashSet<FileKey>, summary: &mut RunSummary) -> Result<()> {
        for rec in self.manifest.all()? {
            if seen.contains(&rec.key) {
                continue;
            }
            let facts = match self.source.probe(&rec.key) {
                Ok(f) => f,
                Err(e) => {
                    let path = self.source.absolute_path(&rec.key);
                    error!(path = %path.display(), error = %e, "cannot stat");
                    summary.error(super::file_error("stat error", &path, e));
                    continue;
                }
            };
            match facts {
                Some(f) if f.size_bytes < self.config.min_file_size => {
                    if rec.status != FileStatus::Truncated {
                        self.manifest.set_status(rec.id, FileStatus::Truncated)?;
                    }
                    summary.truncated += 1;
                    warn!(file = %rec.key, size = f.size_bytes, "truncated, restore from backup");
                }
                Some(_) => {
                    debug!(file = %rec.key, "on disk but filtered out, record kept");
                }
                None => {
                    let remaining = self.manifest.remove_and_count(rec.id, &rec.content_hash)?;
                    summary.deleted += 1;
                    info!(file = %rec.key, sharers = remaining, "deleted");
                    if remaining == 0 {
                        self.drop_parity(&rec.content_hash, summary);
                    }
                }
            }
        }
        Ok(())
    }

    /// Remove artifacts no record references and staging left by interrupted runs.
    pub(super) fn sweep(&self, summary: &mut RunSummary) -> Result<()> {
        for r in self.layout.list_refs()? {
            if self.manifest.references_parity(&r)? {
                continue;
            }
            match self.layout.remove_artifacts(&r) {
                Ok(n) => {
                    summary.orphan_parity_cleaned += 1;
                    info!(artifact = %r, files = n, "removed orphan parity");
                }
                Err(e) => {
                    warn!(artifact = %r, error = %e, "cannot remove orphan parity");
                    summary.error(format!("orphan cleanup failed: {r}: {e}"));
                }
            }
        }
        match self.layout.sweep_staging() {
            Ok(0) => {}
            Ok(n) => info!(dirs = n, "removed abandoned staging"),
            Err(e) => warn!(error = %e, "cannot sweep staging"),
        }
        Ok(())
    }
}
