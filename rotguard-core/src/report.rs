//! Read-only manifest report and per-run JSON logs.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use time::OffsetDateTime;
use tracing::info;

use crate::domain::{FileKey, FileStatus, RunKind, RunRecord};
use crate::error::{Result, RotError};
use crate::manifest::Manifest;
use crate::stats::RunSummary;
use crate::util::clock::compact_stamp;

#[derive(Debug)]
pub struct Report {
    pub total: u64,
    pub by_status: BTreeMap<FileStatus, u64>,
    pub last_run: Option<RunRecord>,
    pub damaged: Vec<FileKey>,
    pub truncated: Vec<FileKey>,
}

impl Report {
    pub fn build(manifest: &Manifest) -> Result<Self> {
        let by_status = manifest.status_counts()?;
        let keys = |status: FileStatus| -> Result<Vec<FileKey>> {
            Ok(manifest
                .by_status(status)?
                .into_iter()
                .map(|r| r.key)
                .collect())
        };
        Ok(Self {
            total: by_status.values().sum(),
            damaged: keys(FileStatus::Damaged)?,
            truncated: keys(FileStatus::Truncated)?,
            last_run: manifest.last_run()?,
            by_status,
        })
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== rotguard report ===")?;
        writeln!(f, "  Total tracked files: {}", self.total)?;
        for (status, n) in &self.by_status {
            writeln!(f, "  {status}: {n}")?;
        }
        if let Some(run) = &self.last_run {
            let kind = run.kind.map(|k| k.as_str()).unwrap_or("scan");
            writeln!(
                f,
                "\n  Last run #{} ({kind}): {} -> {}",
                run.id,
                run.started_at,
                run.finished_at.as_deref().unwrap_or("in progress")
            )?;
            let s = &run.summary;
            writeln!(
                f,
                "    Scanned: {}, Created: {}, Verified: {}, Damaged: {}",
                s.scanned, s.parity_created, s.verified, s.damaged
            )?;
        }
        if !self.damaged.is_empty() {
            writeln!(f, "\n  Damaged files:")?;
            for k in &self.damaged {
                writeln!(f, "    - {k}")?;
            }
        }
        if !self.truncated.is_empty() {
            writeln!(f, "\n  Truncated files (restore from backup):")?;
            for k in &self.truncated {
                writeln!(f, "    - {k}")?;
            }
        }
        write!(f, "=======================")
    }
}

#[derive(Serialize)]
struct RunLog<'a> {
    run_id: i64,
    kind: RunKind,
    timestamp: String,
    #[serde(flatten)]
    summary: &'a RunSummary,
}

/// Write `run_{id}_{stamp}.json` into `dir`; returns the file's path.
pub fn write_run_log(
    dir: &Path,
    run_id: i64,
    kind: RunKind,
    summary: &RunSummary,
) -> Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let stamp = compact_stamp(OffsetDateTime::now_utc());
    let path = dir.join(format!("run_{run_id}_{stamp}.json"));
    let body = serde_json::to_string_pretty(&RunLog {
        run_id,
        kind,
        timestamp: stamp,
        summary,
    })
    .map_err(|e| RotError::Format(e.to_string()))?;
    fs::write(&path, body)?;
    info!(path = %path.display(), "run log written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256::hash_bytes;

    #[test]
    fn report_lists_problem_files() {
        let m = Manifest::open_in_memory().unwrap();
        m.insert(&FileKey::new("photos", "ok.jpg"), 1, 1, &hash_bytes(b"a"), FileStatus::Ok)
            .unwrap();
        m.insert(&FileKey::new("photos", "bad.jpg"), 1, 1, &hash_bytes(b"b"), FileStatus::Damaged)
            .unwrap();
        m.insert(&FileKey::new("docs", "cut.pdf"), 1, 1, &hash_bytes(b"c"), FileStatus::Truncated)
            .unwrap();
        let run = m.start_run(RunKind::Scan).unwrap();
        m.finish_run(run, &RunSummary::default(), "ok").unwrap();

        let report = Report::build(&m).unwrap();
        assert_eq!(report.total, 3);
        assert_eq!(report.damaged, vec![FileKey::new("photos", "bad.jpg")]);
        assert_eq!(report.truncated, vec![FileKey::new("docs", "cut.pdf")]);

        let text = report.to_string();
        assert!(text.contains("Total tracked files: 3"));
        assert!(text.contains("damaged: 1"));
        assert!(text.contains("- photos/bad.jpg"));
        assert!(text.contains("Truncated files (restore from backup):"));
        assert!(text.contains("(scan)"));
    }

    #[test]
    fn empty_manifest_report() {
        let m = Manifest::open_in_memory().unwrap();
        let report = Report::build(&m).unwrap();
        assert_eq!(report.total, 0);
        assert!(report.last_run.is_none());
        assert!(!report.to_string().contains("Last run"));
    }

    #[test]
    fn run_log_is_flat_json() {
        let tmp = tempfile::tempdir().unwrap();
        let summary = RunSummary {
            scanned: 4,
            deleted: 1,
            errors: vec!["hash error: /data/x: denied".into()],
            ..RunSummary::default()
        };
        let path = write_run_log(&tmp.path().join("_logs"), 7, RunKind::Scan, &summary).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("run_7_") && name.ends_with("Z.json"), "{name}");

        let v: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(v["run_id"], 7);
        assert_eq!(v["kind"], "scan");
        assert_eq!(v["scanned"], 4);
        assert_eq!(v["deleted"], 1);
        assert_eq!(v["errors"][0], "hash error: /data/x: denied");
    }
}
