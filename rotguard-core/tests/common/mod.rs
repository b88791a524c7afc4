#![allow(dead_code)]

use std::cell::Cell;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rotguard_core::parity::mirror::MirrorParity;
use rotguard_core::parity::{DeleteOutcome, RepairOutcome, VerifyOutcome};
use rotguard_core::{
    Backend, Config, ContentHash, FileKey, FileRecord, FsSnapshot, Manifest, ParityLayout,
    ParityRef, ParityService, Reconciler, Repairer, RotError, RunSummary, SnapshotSource,
};

/// Wraps a backend and counts calls; `create` can be made to fail for chosen sources.
pub struct Counting<P> {
    inner: P,
    pub creates: AtomicUsize,
    pub verifies: AtomicUsize,
    pub repairs: AtomicUsize,
    pub deletes: AtomicUsize,
    fail_create_for: Mutex<Vec<PathBuf>>,
}

impl<P> Counting<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            creates: AtomicUsize::new(0),
            verifies: AtomicUsize::new(0),
            repairs: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            fail_create_for: Mutex::new(Vec::new()),
        }
    }

    pub fn fail_create_for(&self, path: PathBuf) {
        self.fail_create_for.lock().unwrap().push(path);
    }

    pub fn heal(&self) {
        self.fail_create_for.lock().unwrap().clear();
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

impl<P: ParityService> ParityService for Counting<P> {
    fn create(
        &self,
        hash: &ContentHash,
        source: &Path,
        redundancy_percent: u8,
    ) -> rotguard_core::Result<ParityRef> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        if self.fail_create_for.lock().unwrap().iter().any(|p| p == source) {
            return Err(RotError::Parity("injected failure".into()));
        }
        self.inner.create(hash, source, redundancy_percent)
    }

    fn verify(&self, hash: &ContentHash, source: &Path) -> rotguard_core::Result<VerifyOutcome> {
        self.verifies.fetch_add(1, Ordering::SeqCst);
        self.inner.verify(hash, source)
    }

    fn repair(&self, hash: &ContentHash, source: &Path) -> rotguard_core::Result<RepairOutcome> {
        self.repairs.fetch_add(1, Ordering::SeqCst);
        self.inner.repair(hash, source)
    }

    fn delete(&self, hash: &ContentHash) -> rotguard_core::Result<DeleteOutcome> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(hash)
    }
}

/// A data root, a parity root and a manifest in one temp directory.
pub struct Env {
    pub tmp: tempfile::TempDir,
    pub config: Config,
    pub manifest: Manifest,
    pub parity: Counting<MirrorParity>,
    pub layout: ParityLayout,
    clock: Cell<u64>,
}

impl Env {
    pub fn new() -> Self {
        Self::with(|_| {})
    }

    pub fn with(tweak: impl FnOnce(&mut Config)) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config {
            data_root: tmp.path().join("data"),
            parity_root: tmp.path().join("parity"),
            backend: Backend::Mirror,
            min_file_size: 4,
            workers: 2,
            ..Config::default()
        };
        tweak(&mut config);
        config.validate().unwrap();
        config.prepare_dirs().unwrap();
        fs::create_dir_all(&config.data_root).unwrap();

        let manifest = Manifest::open(&config.db_path()).unwrap();
        let layout = ParityLayout::from_config(&config);
        let parity = Counting::new(MirrorParity::new(layout.clone()));
        Self {
            tmp,
            config,
            manifest,
            parity,
            layout,
            clock: Cell::new(1_600_000_000),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.config.data_root.join(rel)
    }

    /// Write a file and give it a fresh, strictly increasing mtime.
    pub fn write(&self, rel: &str, content: &[u8]) {
        let p = self.path(rel);
        fs::create_dir_all(p.parent().unwrap()).unwrap();
        fs::write(&p, content).unwrap();
        let t = self.clock.get() + 10;
        self.clock.set(t);
        self.set_mtime(rel, t);
    }

    pub fn set_mtime(&self, rel: &str, secs: u64) {
        let f = fs::File::options().write(true).open(self.path(rel)).unwrap();
        f.set_modified(UNIX_EPOCH + Duration::from_secs(secs)).unwrap();
    }

    pub fn mtime_secs(&self, rel: &str) -> u64 {
        fs::metadata(self.path(rel))
            .unwrap()
            .modified()
            .unwrap()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    /// Overwrite content in place, keeping size and mtime.
    pub fn rot(&self, rel: &str, content: &[u8]) {
        let before = self.mtime_secs(rel);
        let old_len = fs::metadata(self.path(rel)).unwrap().len();
        assert_eq!(old_len, content.len() as u64, "rot keeps the size");
        fs::write(self.path(rel), content).unwrap();
        self.set_mtime(rel, before);
    }

    pub fn remove(&self, rel: &str) {
        fs::remove_file(self.path(rel)).unwrap();
    }

    pub fn rename(&self, from: &str, to: &str) {
        let dst = self.path(to);
        fs::create_dir_all(dst.parent().unwrap()).unwrap();
        fs::rename(self.path(from), dst).unwrap();
    }

    pub fn source(&self) -> FsSnapshot {
        FsSnapshot::from_config(&self.config).unwrap()
    }

    pub fn scan(&self) -> RunSummary {
        self.scan_with(&self.parity)
    }

    pub fn scan_with(&self, parity: &dyn ParityService) -> RunSummary {
        self.scan_source(parity, &self.source())
    }

    pub fn scan_source(
        &self,
        parity: &dyn ParityService,
        source: &dyn SnapshotSource,
    ) -> RunSummary {
        Reconciler::new(&self.config, &self.manifest, parity, source)
            .with_seed(7)
            .scan()
            .unwrap()
    }

    pub fn verify(&self) -> RunSummary {
        let source = self.source();
        Reconciler::new(&self.config, &self.manifest, &self.parity, &source)
            .with_seed(7)
            .verify()
            .unwrap()
    }

    pub fn repair(&self) -> RunSummary {
        self.repair_with(&self.parity)
    }

    pub fn repair_with(&self, parity: &dyn ParityService) -> RunSummary {
        let source = self.source();
        Repairer::new(&self.config, &self.manifest, parity, &source)
            .run()
            .unwrap()
    }

    pub fn record(&self, rel: &str) -> Option<FileRecord> {
        let (root, path) = rel.split_once('/').unwrap();
        self.manifest.get(&FileKey::new(root, path)).unwrap()
    }

    pub fn artifacts(&self) -> BTreeSet<ParityRef> {
        self.layout.list_refs().unwrap()
    }
}
