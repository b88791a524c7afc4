use std::collections::HashSet;
use std::io;
use std::path::PathBuf;

use rayon::ThreadPool;
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use super::{Reconciler, file_error};
use crate::domain::{ContentHash, FileKey, FileRecord, FileStatus};
use crate::error::Result;
use crate::hash::sha256::hash_file;
use crate::parity::DeleteOutcome;
use crate::snapshot::{SnapshotEntry, SnapshotSource};
use crate::stats::RunSummary;

struct Hashed<T> {
    item: T,
    path: PathBuf,
    hash: io::Result<ContentHash>,
}

fn hash_all<T, K>(
    pool: &ThreadPool,
    source: &dyn SnapshotSource,
    items: Vec<T>,
    key: K,
) -> Vec<Hashed<T>>
where
    T: Send,
    K: Fn(&T) -> &FileKey + Sync,
{
    pool.install(|| {
        items
            .into_par_iter()
            .map(|item| {
                let path = source.absolute_path(key(&item));
                let hash = hash_file(&path);
                Hashed { item, path, hash }
            })
            .collect()
    })
}

impl Reconciler<'_> {
    /// Phase 2: hash every fresh and changed entry, then settle each one.
    ///
    /// Fresh entries go first so that content shared with a record modified
    /// in this same pass keeps its artifact instead of losing and regaining it.
    pub(super) fn act(
        &self,
        pool: &ThreadPool,
        fresh: Vec<SnapshotEntry>,
        changed: Vec<(SnapshotEntry, FileRecord)>,
        seen: &HashSet<FileKey>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let fresh = hash_all(pool, self.source, fresh, |e| &e.key);
        let changed = hash_all(pool, self.source, changed, |(e, _)| &e.key);

        for Hashed { item, path, hash } in fresh {
            let Some(hash) = self.hashed_or_log(&path, hash, summary) else {
                continue;
            };
            self.admit_fresh(item, path, hash, seen, summary)?;
        }
        for Hashed {
            item: (entry, rec),
            path,
            hash,
        } in changed
        {
            let Some(hash) = self.hashed_or_log(&path, hash, summary) else {
                continue;
            };
            self.apply_change(entry, rec, path, hash, summary)?;
        }
        Ok(())
    }

    fn hashed_or_log(
        &self,
        path: &std::path::Path,
        hash: io::Result<ContentHash>,
        summary: &mut RunSummary,
    ) -> Option<ContentHash> {
        match hash {
            Ok(h) => {
                summary.hashed += 1;
                Some(h)
            }
            Err(e) => {
                error!(path = %path.display(), error = %e, "cannot hash");
                summary.error(file_error("hash error", path, e));
                None
            }
        }
    }

    fn admit_fresh(
        &self,
        entry: SnapshotEntry,
        path: PathBuf,
        hash: ContentHash,
        seen: &HashSet<FileKey>,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let sharers = self.manifest.by_hash(&hash)?;

        if let Some(origin) = self.move_origin(&sharers, seen) {
            self.manifest.relocate(
                origin.id,
                &entry.key,
                entry.size_bytes,
                entry.mtime_ns,
                FileStatus::Moved,
            )?;
            summary.moved += 1;
            info!(from = %origin.key, to = %entry.key, "moved");
            return Ok(());
        }

        if sharers.is_empty() {
            match self
                .parity
                .create(&hash, &path, self.config.redundancy_percent)
            {
                Ok(r) => {
                    summary.parity_created += 1;
                    debug!(file = %entry.key, artifact = %r, "parity created");
                }
                Err(e) => {
                    error!(path = %path.display(), error = %e, "parity create failed");
                    summary.error(file_error("parity create failed", &path, e));
                    return Ok(());
                }
            }
        } else {
            debug!(file = %entry.key, copies = sharers.len(), "content already protected");
        }

        self.manifest.insert(
            &entry.key,
            entry.size_bytes,
            entry.mtime_ns,
            &hash,
            FileStatus::Ok,
        )?;
        summary.new += 1;
        info!(file = %entry.key, hash = %hash.short(), "new");
        Ok(())
    }

    /// Record with the same content whose path vanished from the snapshot and
    /// from disk. The smallest key wins when several qualify.
    fn move_origin(&self, sharers: &[FileRecord], seen: &HashSet<FileKey>) -> Option<FileRecord> {
        let mut candidates: Vec<&FileRecord> =
            sharers.iter().filter(|r| !seen.contains(&r.key)).collect();
        candidates.sort_by(|a, b| a.key.cmp(&b.key));
        for cand in candidates {
            match self.source.probe(&cand.key) {
                Ok(None) => return Some(cand.clone()),
                // still on disk, only filtered out of the snapshot
                Ok(Some(_)) => continue,
                Err(e) => {
                    warn!(file = %cand.key, error = %e, "cannot probe move candidate");
                    continue;
                }
            }
        }
        None
    }

    fn apply_change(
        &self,
        entry: SnapshotEntry,
        rec: FileRecord,
        path: PathBuf,
        hash: ContentHash,
        summary: &mut RunSummary,
    ) -> Result<()> {
        if hash == rec.content_hash {
            self.manifest.update_metadata(
                rec.id,
                entry.size_bytes,
                entry.mtime_ns,
                FileStatus::Touched,
            )?;
            summary.touched += 1;
            debug!(file = %entry.key, "touched");
            return Ok(());
        }

        if self.manifest.count_by_hash(&hash)? == 0 {
            match self
                .parity
                .create(&hash, &path, self.config.redundancy_percent)
            {
                Ok(_) => summary.parity_created += 1,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "parity create failed");
                    summary.error(file_error("parity create failed", &path, e));
                    return Ok(());
                }
            }
        }
        self.manifest.replace_content(
            rec.id,
            entry.size_bytes,
            entry.mtime_ns,
            &hash,
            FileStatus::Ok,
        )?;
        summary.modified += 1;
        info!(file = %entry.key, old = %rec.content_hash.short(), new = %hash.short(), "modified");

        if self.manifest.count_by_hash(&rec.content_hash)? == 0 {
            self.drop_parity(&rec.content_hash, summary);
        }
        Ok(())
    }

    /// Delete the artifact for a hash no record references any more.
    pub(super) fn drop_parity(&self, hash: &ContentHash, summary: &mut RunSummary) {
        match self.parity.delete(hash) {
            Ok(DeleteOutcome::Deleted) => debug!(hash = %hash.short(), "parity deleted"),
            Ok(DeleteOutcome::NotFound) => debug!(hash = %hash.short(), "no parity to delete"),
            Err(e) => {
                // left for the orphan sweep
                warn!(hash = %hash.short(), error = %e, "parity delete failed");
                summary.error(format!("parity delete failed: {hash}: {e}"));
            }
        }
    }
}
