use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use super::{ExcludeSet, FileFacts, SnapshotEntry, SnapshotSource};
use crate::config::Config;
use crate::domain::FileKey;
use crate::error::Result;

/// Walks every top-level directory under the data root; each one is a
/// `data_root` label. Plain files directly under the data root are ignored.
pub struct FsSnapshot {
    data_root: PathBuf,
    excludes: ExcludeSet,
    min_size: u64,
    max_size: Option<u64>,
}

impl FsSnapshot {
    pub fn new(
        data_root: impl Into<PathBuf>,
        excludes: ExcludeSet,
        min_size: u64,
        max_size: Option<u64>,
    ) -> Self {
        Self {
            data_root: data_root.into(),
            excludes,
            min_size,
            max_size,
        }
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self::new(
            cfg.data_root(),
            ExcludeSet::new(&cfg.exclude_patterns)?,
            cfg.min_file_size,
            cfg.max_file_size,
        ))
    }

    fn roots(&self) -> Vec<(String, PathBuf)> {
        let rd = match fs::read_dir(&self.data_root) {
            Ok(rd) => rd,
            Err(e) => {
                warn!(
                    data_root = %self.data_root.display(),
                    error = %e,
                    "data root is not readable"
                );
                return Vec::new();
            }
        };
        let mut roots: Vec<(String, PathBuf)> = rd
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|e| {
                let label = e.file_name().to_str()?.to_string();
                (!self.excludes.is_excluded(&label)).then(|| (label, e.path()))
            })
            .collect();
        roots.sort();
        roots
    }

    fn walk_root<'a>(
        &'a self,
        label: String,
        dir: PathBuf,
    ) -> impl Iterator<Item = SnapshotEntry> + 'a {
        info!(root = %label, "scanning data root");
        WalkDir::new(&dir)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |e| !self.excludes.is_excluded(&e.file_name().to_string_lossy()))
            .filter_map(move |res| self.admit(&label, &dir, res))
    }

    fn admit(
        &self,
        label: &str,
        dir: &Path,
        res: walkdir::Result<DirEntry>,
    ) -> Option<SnapshotEntry> {
        let entry = match res {
            Ok(e) => e,
            Err(err) => {
                warn!(error = %err, "cannot read directory entry");
                return None;
            }
        };
        // symlinks and special files are never tracked
        if !entry.file_type().is_file() {
            return None;
        }
        let facts = match entry
            .metadata()
            .map_err(io::Error::from)
            .and_then(|m| FileFacts::from_metadata(&m))
        {
            Ok(f) => f,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "cannot stat");
                return None;
            }
        };
        if facts.size_bytes < self.min_size {
            return None;
        }
        if self.max_size.is_some_and(|max| facts.size_bytes > max) {
            debug!(path = %entry.path().display(), size = facts.size_bytes, "skipping, too large");
            return None;
        }
        let Some(rel_path) = rel_path(dir, entry.path()) else {
            warn!(path = %entry.path().display(), "skipping non UTF-8 path");
            return None;
        };
        Some(SnapshotEntry {
            key: FileKey::new(label, rel_path),
            size_bytes: facts.size_bytes,
            mtime_ns: facts.mtime_ns,
        })
    }
}

/// `/`-separated path of `path` below `base`.
fn rel_path(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

impl SnapshotSource for FsSnapshot {
    fn entries(&self) -> Box<dyn Iterator<Item = SnapshotEntry> + '_> {
        Box::new(
            self.roots()
                .into_iter()
                .flat_map(move |(label, dir)| self.walk_root(label, dir)),
        )
    }

    fn absolute_path(&self, key: &FileKey) -> PathBuf {
        self.data_root.join(&key.data_root).join(&key.rel_path)
    }

    fn probe(&self, key: &FileKey) -> io::Result<Option<FileFacts>> {
        match fs::metadata(self.absolute_path(key)) {
            Ok(meta) => Ok(Some(FileFacts::from_metadata(&meta)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }
}
