//! On-disk placement of parity artifacts.
//!
//! Artifacts are content-addressed: the first [`BUCKET_CHARS`] hex characters
//! of the digest select a bucket directory below `by_hash/`, the first
//! [`STEM_CHARS`] form the artifact stem. Every artifact consists of an index
//! file `{stem}.par2` plus any number of companion files `{stem}.*`.
//! [`ParityRef::for_hash`] is the only place that slices a digest; creation,
//! lookup and orphan cleanup all go through it or its inverse
//! [`ParityRef::from_artifact_name`].

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::config::Config;
use crate::domain::ContentHash;

pub const BUCKET_CHARS: usize = 2;
pub const STEM_CHARS: usize = 16;
pub const INDEX_EXT: &str = "par2";
const STAGING_PREFIX: &str = ".staging-";

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParityRef {
    bucket: String,
    stem: String,
}

impl ParityRef {
    pub fn for_hash(hash: &ContentHash) -> Self {
        let hex = hash.as_str();
        Self {
            bucket: hex[..BUCKET_CHARS].to_string(),
            stem: hex[..STEM_CHARS].to_string(),
        }
    }

    /// Reverse match of an artifact file found in `bucket`. Foreign files yield `None`.
    pub fn from_artifact_name(bucket: &str, file_name: &str) -> Option<Self> {
        let (stem, rest) = file_name.split_once('.')?;
        if rest.is_empty() || stem.len() != STEM_CHARS || !is_lower_hex(stem) {
            return None;
        }
        if bucket.len() != BUCKET_CHARS || !stem.starts_with(bucket) {
            return None;
        }
        Some(Self {
            bucket: bucket.to_string(),
            stem: stem.to_string(),
        })
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    /// Index file name; also the value persisted in the manifest's `par2_name` column.
    pub fn par2_name(&self) -> String {
        format!("{}.{INDEX_EXT}", self.stem)
    }

    pub fn companion_name(&self, suffix: &str) -> String {
        format!("{}.{suffix}", self.stem)
    }

    pub fn owns_file(&self, file_name: &str) -> bool {
        file_name
            .strip_prefix(self.stem.as_str())
            .is_some_and(|rest| rest.len() > 1 && rest.starts_with('.'))
    }

    pub fn matches(&self, hash: &ContentHash) -> bool {
        hash.as_str().starts_with(&self.stem)
    }
}

impl fmt::Display for ParityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.par2_name())
    }
}

fn is_lower_hex(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

#[derive(Clone, Debug)]
pub struct ParityLayout {
    hash_dir: PathBuf,
    staging_root: PathBuf,
}

impl ParityLayout {
    pub fn new(hash_dir: impl Into<PathBuf>, staging_root: impl Into<PathBuf>) -> Self {
        Self {
            hash_dir: hash_dir.into(),
            staging_root: staging_root.into(),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.hash_dir(), cfg.staging_dir())
    }

    pub fn hash_dir(&self) -> &Path {
        &self.hash_dir
    }

    pub fn bucket_dir(&self, r: &ParityRef) -> PathBuf {
        self.hash_dir.join(r.bucket())
    }

    pub fn index_path(&self, r: &ParityRef) -> PathBuf {
        self.bucket_dir(r).join(r.par2_name())
    }

    pub fn companion_path(&self, r: &ParityRef, suffix: &str) -> PathBuf {
        self.bucket_dir(r).join(r.companion_name(suffix))
    }

    /// An artifact is visible once its index file is in place.
    pub fn exists(&self, r: &ParityRef) -> bool {
        self.index_path(r).is_file()
    }

    /// Every distinct artifact stem currently on disk, including partial leftovers.
    pub fn list_refs(&self) -> io::Result<BTreeSet<ParityRef>> {
        let mut out = BTreeSet::new();
        let buckets = match fs::read_dir(&self.hash_dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(e),
        };
        for bucket in buckets {
            let bucket = bucket?;
            if !bucket.file_type()?.is_dir() {
                continue;
            }
            let bucket_name = bucket.file_name().to_string_lossy().to_string();
            for entry in fs::read_dir(bucket.path())? {
                let entry = entry?;
                if !entry.file_type()?.is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy().to_string();
                if let Some(r) = ParityRef::from_artifact_name(&bucket_name, &name) {
                    out.insert(r);
                }
            }
        }
        Ok(out)
    }

    /// Remove the index and all companion files; returns how many files went away.
    pub fn remove_artifacts(&self, r: &ParityRef) -> io::Result<usize> {
        let dir = self.bucket_dir(r);
        let entries = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let mut victims: Vec<PathBuf> = Vec::new();
        for entry in entries {
            let entry = entry?;
            if r.owns_file(&entry.file_name().to_string_lossy()) {
                victims.push(entry.path());
            }
        }
        // Index first, so a half-finished removal is no longer considered present.
        let index = self.index_path(r);
        victims.sort_by_key(|p| *p != index);
        for p in &victims {
            fs::remove_file(p)?;
        }
        // Non-empty buckets stay.
        let _ = fs::remove_dir(&dir);
        Ok(victims.len())
    }

    /// Private directory for building an artifact before it becomes visible.
    pub fn stage(&self) -> io::Result<TempDir> {
        fs::create_dir_all(&self.staging_root)?;
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.staging_root)
    }

    /// Move staged files into the bucket. The index file is renamed last.
    pub fn publish(&self, staging: &Path, r: &ParityRef) -> io::Result<()> {
        let dir = self.bucket_dir(r);
        fs::create_dir_all(&dir)?;
        let index_name = r.par2_name();
        let mut index_src = None;
        for entry in fs::read_dir(staging)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy() == index_name {
                index_src = Some(entry.path());
                continue;
            }
            fs::rename(entry.path(), dir.join(&name))?;
        }
        let index_src = index_src.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("staged artifact has no {index_name}"),
            )
        })?;
        fs::rename(index_src, dir.join(&index_name))
    }

    /// Remove staging directories abandoned by an interrupted run.
    pub fn sweep_staging(&self) -> io::Result<usize> {
        let entries = match fs::read_dir(&self.staging_root) {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };
        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let stale = entry.file_type()?.is_dir()
                && entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with(STAGING_PREFIX);
            if stale {
                fs::remove_dir_all(entry.path())?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
