use rotguard_core::error::Result;
use rotguard_core::notify::notify_webhook;
use rotguard_core::{
    Config, FsSnapshot, Manifest, ParityLayout, ParityService, Reconciler, Repairer, Report,
    RunKind, RunLease, RunSummary, open_parity, write_run_log,
};
use tracing::{info, warn};

/// Directories, lease and manifest, in that order. The lease is held until
/// the returned value is dropped.
fn open_session(config: &Config) -> Result<(RunLease, Manifest)> {
    config.prepare_dirs()?;
    let lease = RunLease::acquire(&config.lock_path())?;
    let manifest = Manifest::open(&config.db_path())?;
    Ok((lease, manifest))
}

fn open_backend(config: &Config) -> Result<Box<dyn ParityService>> {
    open_parity(
        config.backend,
        ParityLayout::from_config(config),
        config.parity_timeout,
    )
}

fn outcome(summary: &RunSummary) -> &'static str {
    if summary.errors.is_empty() {
        "ok"
    } else {
        "completed_with_errors"
    }
}

/// Bracket `work` with run history, then publish the summary.
fn record_run<F>(config: &Config, manifest: &Manifest, kind: RunKind, work: F) -> Result<()>
where
    F: FnOnce() -> Result<RunSummary>,
{
    let run_id = manifest.start_run(kind)?;
    info!(run_id, %kind, "run started");

    let summary = match work() {
        Ok(s) => s,
        Err(e) => {
            let mut failed = RunSummary::default();
            failed.error(e.to_string());
            if let Err(fe) = manifest.finish_run(run_id, &failed, "failed") {
                warn!(run_id, error = %fe, "cannot close failed run");
            }
            return Err(e);
        }
    };
    manifest.finish_run(run_id, &summary, outcome(&summary))?;

    if let Err(e) = write_run_log(&config.log_dir(), run_id, kind, &summary) {
        warn!(error = %e, "cannot write run log");
    }
    println!("{summary}");
    if let Some(url) = &config.notify_webhook {
        notify_webhook(url, run_id, kind, &summary);
    }

    if summary.damaged > 0 {
        warn!(damaged = summary.damaged, "damaged files detected");
    }
    if summary.truncated > 0 {
        warn!(truncated = summary.truncated, "truncated files detected");
    }
    info!(run_id, errors = summary.errors.len(), "run finished");
    Ok(())
}

pub fn handle_scan(config: &Config, seed: Option<u64>) -> Result<()> {
    let (_lease, manifest) = open_session(config)?;
    let source = FsSnapshot::from_config(config)?;
    let parity = open_backend(config)?;
    let mut reconciler = Reconciler::new(config, &manifest, parity.as_ref(), &source);
    if let Some(seed) = seed {
        reconciler = reconciler.with_seed(seed);
    }
    record_run(config, &manifest, RunKind::Scan, || reconciler.scan())
}

pub fn handle_verify(config: &Config, seed: Option<u64>) -> Result<()> {
    let (_lease, manifest) = open_session(config)?;
    let source = FsSnapshot::from_config(config)?;
    let parity = open_backend(config)?;
    let mut reconciler = Reconciler::new(config, &manifest, parity.as_ref(), &source);
    if let Some(seed) = seed {
        reconciler = reconciler.with_seed(seed);
    }
    record_run(config, &manifest, RunKind::Verify, || reconciler.verify())
}

pub fn handle_repair(config: &Config) -> Result<()> {
    let (_lease, manifest) = open_session(config)?;
    let source = FsSnapshot::from_config(config)?;
    let parity = open_backend(config)?;
    let repairer = Repairer::new(config, &manifest, parity.as_ref(), &source);
    if repairer.pending()?.is_empty() {
        println!("No damaged files found in manifest.");
        return Ok(());
    }
    record_run(config, &manifest, RunKind::Repair, || repairer.run())
}

/// Read-only; runs without the lease so it works while a scan is in progress.
/// Nothing under the parity root is created or written.
pub fn handle_report(config: &Config) -> Result<()> {
    let db = config.db_path();
    if !db.is_file() {
        println!("No manifest at {}; run a scan first.", db.display());
        return Ok(());
    }
    let manifest = Manifest::open_read_only(&db)?;
    println!("{}", Report::build(&manifest)?);
    Ok(())
}
