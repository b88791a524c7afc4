use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::Reconciler;
use crate::domain::{FileKey, FileRecord};
use crate::error::Result;
use crate::snapshot::SnapshotEntry;
use crate::stats::RunSummary;

pub(super) struct Classified {
    /// Every key present in the snapshot.
    pub seen: HashSet<FileKey>,
    /// No record for this path yet.
    pub fresh: Vec<SnapshotEntry>,
    /// Record exists but size or mtime differ.
    pub changed: Vec<(SnapshotEntry, FileRecord)>,
    pub unchanged: Vec<(SnapshotEntry, FileRecord)>,
}

impl Reconciler<'_> {
    /// Phase 1: metadata-only comparison of the snapshot against the manifest.
    pub(super) fn classify(&self, summary: &mut RunSummary) -> Result<Classified> {
        let mut known: HashMap<FileKey, FileRecord> = self
            .manifest
            .all()?
            .into_iter()
            .map(|r| (r.key.clone(), r))
            .collect();

        let mut out = Classified {
            seen: HashSet::new(),
            fresh: Vec::new(),
            changed: Vec::new(),
            unchanged: Vec::new(),
        };
        for entry in self.source.entries() {
            summary.scanned += 1;
            if !out.seen.insert(entry.key.clone()) {
                continue;
            }
            match known.remove(&entry.key) {
                None => out.fresh.push(entry),
                Some(rec)
                    if rec.size_bytes == entry.size_bytes && rec.mtime_ns == entry.mtime_ns =>
                {
                    out.unchanged.push((entry, rec))
                }
                Some(rec) => {
                    debug!(
                        file = %entry.key,
                        old_size = rec.size_bytes,
                        new_size = entry.size_bytes,
                        "metadata changed"
                    );
                    out.changed.push((entry, rec))
                }
            }
        }
        Ok(out)
    }
}
