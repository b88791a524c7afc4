//! Reconciliation engine: brings the manifest and the parity store back in
//! line with what is on disk.
//!
//! A scan runs four strictly ordered phases:
//!
//! 1. [`classify`] sorts every snapshot entry into *fresh* (no record),
//!    *changed* (size or mtime differ) or *unchanged*, without reading content.
//! 2. [`act`] hashes fresh and changed entries on the worker pool, then
//!    resolves moves, copies, touches and modifications one file at a time.
//! 3. [`verify`] checks a random sample of unchanged records against parity.
//! 4. [`prune`] handles records whose path was not observed, then sweeps
//!    orphaned artifacts and abandoned staging directories.
//!
//! Hashing and verification fan out across a rayon pool; every manifest write
//! happens on the calling thread, one transaction per file.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::info;

use crate::config::Config;
use crate::error::{Result, RotError};
use crate::manifest::Manifest;
use crate::parity::ParityService;
use crate::parity::layout::ParityLayout;
use crate::snapshot::SnapshotSource;
use crate::stats::RunSummary;

mod act;
mod classify;
mod prune;
mod verify;

use classify::Classified;

pub struct Reconciler<'a> {
    config: &'a Config,
    manifest: &'a Manifest,
    parity: &'a dyn ParityService,
    source: &'a dyn SnapshotSource,
    layout: ParityLayout,
    seed: Option<u64>,
}

impl<'a> Reconciler<'a> {
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
            layout: ParityLayout::from_config(config),
            seed: None,
        }
    }

    /// Fix the verification sample so runs are reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Full cycle: classify, hash and act, sampled verification, deletion
    /// detection and orphan cleanup.
    pub fn scan(&self) -> Result<RunSummary> {
        let pool = self.pool()?;
        let mut summary = RunSummary::default();

        let Classified {
            seen,
            fresh,
            changed,
            unchanged,
        } = self.classify(&mut summary)?;
        info!(
            scanned = summary.scanned,
            fresh = fresh.len(),
            changed = changed.len(),
            unchanged = unchanged.len(),
            "classified snapshot"
        );

        self.act(&pool, fresh, changed, &seen, &mut summary)?;
        self.verify_sample(&pool, unchanged, true, &mut summary)?;
        self.prune(&seen, &mut summary)?;
        self.sweep(&mut summary)?;
        Ok(summary)
    }

    /// Check parity for unchanged files only. Nothing is created or deleted.
    pub fn verify(&self) -> Result<RunSummary> {
        let pool = self.pool()?;
        let mut summary = RunSummary::default();
        let classified = self.classify(&mut summary)?;
        let pending = classified.fresh.len() + classified.changed.len();
        if pending > 0 {
            info!(pending, "new or changed files are left for the next scan");
        }
        self.verify_sample(&pool, classified.unchanged, false, &mut summary)?;
        Ok(summary)
    }

    fn pool(&self) -> Result<ThreadPool> {
        ThreadPoolBuilder::new()
            .num_threads(self.config.workers)
            .thread_name(|i| format!("rotguard-worker-{i}"))
            .build()
            .map_err(|e| RotError::Config(format!("cannot start worker pool: {e}")))
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

/// Error line recorded in the run summary for a per-file failure.
fn file_error(what: &str, path: &std::path::Path, err: impl std::fmt::Display) -> String {
    format!("{what}: {}: {err}", path.display())
}
