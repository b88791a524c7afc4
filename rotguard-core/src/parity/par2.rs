use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use tempfile::TempDir;

use super::layout::{ParityLayout, ParityRef};
use super::{DeleteOutcome, ParityService, RepairOutcome, VerifyOutcome, restore_file};
use crate::domain::ContentHash;
use crate::error::{Result, RotError};

const POLL_INTERVAL: Duration = Duration::from_millis(50);
const STDERR_TAIL: usize = 500;
/// Suffix of the name the protected file carries inside every recovery set.
const DATA_SUFFIX: &str = "data";

/// Drives the external `par2` (par2cmdline) tool.
pub struct Par2Parity {
    layout: ParityLayout,
    program: PathBuf,
    timeout: Duration,
}

struct ToolOutput {
    status: ExitStatus,
    stderr: String,
}

impl ToolOutput {
    fn code(&self) -> Option<i32> {
        self.status.code()
    }

    fn stderr_tail(&self) -> &str {
        let s = self.stderr.trim();
        let mut start = s.len().saturating_sub(STDERR_TAIL);
        while !s.is_char_boundary(start) {
            start += 1;
        }
        &s[start..]
    }
}

impl Par2Parity {
    pub fn new(layout: ParityLayout, timeout: Duration) -> Self {
        Self::with_program(layout, "par2", timeout)
    }

    pub fn with_program(
        layout: ParityLayout,
        program: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            layout,
            program: program.into(),
            timeout,
        }
    }

    /// Confirm the tool can be spawned at all.
    pub fn probe(&self) -> Result<()> {
        Command::new(&self.program)
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|_| ())
            .map_err(|e| {
                RotError::Config(format!("cannot run {}: {e}", self.program.display()))
            })
    }

    fn run(&self, args: &[OsString]) -> Result<ToolOutput> {
        debug!(program = %self.program.display(), ?args, "running par2");
        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| RotError::Parity(format!("spawn {}: {e}", self.program.display())))?;

        // Drain stderr on the side so a chatty child never blocks on a full pipe.
        let mut pipe = child.stderr.take();
        let drain = thread::spawn(move || {
            let mut s = String::new();
            if let Some(p) = pipe.as_mut() {
                let _ = p.read_to_string(&mut s);
            }
            s
        });

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                let _ = drain.join();
                return Err(RotError::Parity(format!(
                    "par2 timed out after {}s",
                    self.timeout.as_secs()
                )));
            }
            thread::sleep(POLL_INTERVAL);
        };
        let stderr = drain.join().unwrap_or_default();
        let out = ToolOutput { status, stderr };
        if !out.status.success() {
            debug!(code = ?out.code(), stderr = out.stderr_tail(), "par2 exited non-zero");
        }
        Ok(out)
    }

    /// Scratch directory in which the source appears as `{stem}.data`.
    ///
    /// par2 records file names inside the recovery set, so every invocation
    /// sees the same hash-derived name wherever the content lives on disk.
    fn workspace(&self, r: &ParityRef, source: &Path) -> Result<Workspace> {
        let dir = self.layout.stage()?;
        let file = dir.path().join(r.companion_name(DATA_SUFFIX));
        link_source(&std::path::absolute(source)?, &file)?;
        Ok(Workspace { dir, file })
    }

    fn target_args(verb: &str, index: &Path, ws: &Workspace) -> Vec<OsString> {
        vec![
            verb.into(),
            "-q".into(),
            "-B".into(),
            ws.dir.path().as_os_str().to_owned(),
            index.as_os_str().to_owned(),
            ws.file.as_os_str().to_owned(),
        ]
    }
}

struct Workspace {
    dir: TempDir,
    file: PathBuf,
}

#[cfg(unix)]
fn link_source(source: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(source, link)
}

#[cfg(not(unix))]
fn link_source(source: &Path, link: &Path) -> io::Result<()> {
    std::fs::copy(source, link).map(|_| ())
}

impl ParityService for Par2Parity {
    fn create(
        &self,
        hash: &ContentHash,
        source: &Path,
        redundancy_percent: u8,
    ) -> Result<ParityRef> {
        let r = ParityRef::for_hash(hash);
        if self.layout.exists(&r) {
            debug!(artifact = %r, "parity already exists");
            return Ok(r);
        }

        let ws = self.workspace(&r, source)?;
        let staging = self.layout.stage()?;
        let staged_index = staging.path().join(r.par2_name());
        let args: Vec<OsString> = vec![
            "create".into(),
            "-q".into(),
            format!("-r{redundancy_percent}").into(),
            "-B".into(),
            ws.dir.path().as_os_str().to_owned(),
            staged_index.into_os_string(),
            ws.file.as_os_str().to_owned(),
        ];
        let out = self.run(&args)?;
        if !out.status.success() {
            error!(
                path = %source.display(),
                code = ?out.code(),
                stderr = out.stderr_tail(),
                "par2 create failed"
            );
            return Err(RotError::Parity(format!(
                "par2 create failed for {} (rc={:?}): {}",
                source.display(),
                out.code(),
                out.stderr_tail()
            )));
        }
        self.layout.publish(staging.path(), &r)?;
        debug!(artifact = %r, "created parity");
        Ok(r)
    }

    fn verify(&self, hash: &ContentHash, source: &Path) -> Result<VerifyOutcome> {
        let r = ParityRef::for_hash(hash);
        let index = self.layout.index_path(&r);
        if !index.is_file() {
            warn!(artifact = %index.display(), "missing parity file");
            return Ok(VerifyOutcome::Missing);
        }
        let ws = self.workspace(&r, source)?;
        let out = self.run(&Self::target_args("verify", &index, &ws))?;
        // par2cmdline: 0 intact, 1 repairable damage, 2 damage beyond the recovery blocks.
        match out.code() {
            Some(0) => Ok(VerifyOutcome::Ok),
            Some(1) | Some(2) => Ok(VerifyOutcome::Damaged),
            code => Err(RotError::Parity(format!(
                "par2 verify error for {} (rc={code:?}): {}",
                source.display(),
                out.stderr_tail()
            ))),
        }
    }

    fn repair(&self, hash: &ContentHash, source: &Path) -> Result<RepairOutcome> {
        let r = ParityRef::for_hash(hash);
        let index = self.layout.index_path(&r);
        if !index.is_file() {
            error!(artifact = %index.display(), "cannot repair without parity");
            return Ok(RepairOutcome::Failed);
        }
        let ws = self.workspace(&r, source)?;
        let out = self.run(&Self::target_args("repair", &index, &ws))?;
        if !out.status.success() {
            error!(
                path = %source.display(),
                code = ?out.code(),
                stderr = out.stderr_tail(),
                "par2 repair failed"
            );
            return Ok(RepairOutcome::Failed);
        }
        // par2 writes the rebuilt file under the recorded name inside the workspace
        restore_file(&ws.file, source)?;
        info!(path = %source.display(), "repaired");
        Ok(RepairOutcome::Repaired)
    }

    fn delete(&self, hash: &ContentHash) -> Result<DeleteOutcome> {
        let r = ParityRef::for_hash(hash);
        match self.layout.remove_artifacts(&r)? {
            0 => Ok(DeleteOutcome::NotFound),
            n => {
                debug!(artifact = %r, files = n, "removed parity");
                Ok(DeleteOutcome::Deleted)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256::hash_bytes;

    #[test]
    fn missing_artifact_short_circuits_without_spawning() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = ParityLayout::new(tmp.path().join("by_hash"), tmp.path());
        // A program that cannot exist proves no subprocess is started.
        let svc = Par2Parity::with_program(
            layout,
            tmp.path().join("no-such-par2"),
            Duration::from_secs(5),
        );
        let hash = hash_bytes(b"x");
        let src = tmp.path().join("f");
        assert_eq!(svc.verify(&hash, &src).unwrap(), VerifyOutcome::Missing);
        assert_eq!(svc.repair(&hash, &src).unwrap(), RepairOutcome::Failed);
        assert_eq!(svc.delete(&hash).unwrap(), DeleteOutcome::NotFound);
        assert!(svc.probe().is_err());
    }

    #[test]
    fn failed_spawn_leaves_no_partial_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = ParityLayout::new(tmp.path().join("by_hash"), tmp.path());
        let svc = Par2Parity::with_program(
            layout.clone(),
            tmp.path().join("no-such-par2"),
            Duration::from_secs(5),
        );
        let src = tmp.path().join("f");
        std::fs::write(&src, b"data").unwrap();
        let hash = hash_bytes(b"data");
        assert!(svc.create(&hash, &src, 10).is_err());
        assert!(layout.list_refs().unwrap().is_empty());
        assert_eq!(layout.sweep_staging().unwrap(), 0);
    }

    #[cfg(unix)]
    mod stand_in {
        use super::*;
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        /// Executable shell script standing in for par2; `$last` is the protected file.
        fn tool(dir: &Path, body: &str) -> PathBuf {
            let script = dir.join("fake-par2");
            let text = format!("#!/bin/sh\nfor a in \"$@\"; do last=\"$a\"; done\n{body}\n");
            fs::write(&script, text).unwrap();
            fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
            script
        }

        fn setup(body: &str) -> (tempfile::TempDir, ParityLayout, Par2Parity) {
            let tmp = tempfile::tempdir().unwrap();
            let layout = ParityLayout::new(tmp.path().join("by_hash"), tmp.path());
            let script = tool(tmp.path(), body);
            let svc = Par2Parity::with_program(layout.clone(), script, Duration::from_secs(30));
            (tmp, layout, svc)
        }

        fn place_index(layout: &ParityLayout, hash: &ContentHash) {
            let r = ParityRef::for_hash(hash);
            fs::create_dir_all(layout.bucket_dir(&r)).unwrap();
            fs::write(layout.index_path(&r), b"idx").unwrap();
        }

        #[test]
        fn create_publishes_staged_output() {
            // writes the index and one volume next to the requested index path
            let (tmp, layout, svc) = setup(
                "idx=\"$6\"\necho idx > \"$idx\"\necho vol > \"${idx%.par2}.vol000+01.par2\"",
            );
            let src = tmp.path().join("f");
            fs::write(&src, b"data").unwrap();
            let hash = hash_bytes(b"data");

            let r = svc.create(&hash, &src, 10).unwrap();
            assert!(layout.exists(&r));
            assert!(layout.companion_path(&r, "vol000+01.par2").is_file());
            assert!(!layout.companion_path(&r, DATA_SUFFIX).exists());
            assert_eq!(layout.sweep_staging().unwrap(), 0);
            assert_eq!(svc.delete(&hash).unwrap(), DeleteOutcome::Deleted);
            assert!(!layout.exists(&r));
        }

        #[test]
        fn verify_exit_codes() {
            let hash = hash_bytes(b"data");
            for (rc, expected) in [
                (0, VerifyOutcome::Ok),
                (1, VerifyOutcome::Damaged),
                (2, VerifyOutcome::Damaged),
            ] {
                let (tmp, layout, svc) = setup(&format!("exit {rc}"));
                place_index(&layout, &hash);
                let src = tmp.path().join("f");
                fs::write(&src, b"data").unwrap();
                assert_eq!(svc.verify(&hash, &src).unwrap(), expected, "exit {rc}");
            }

            let (tmp, layout, svc) = setup("exit 3");
            place_index(&layout, &hash);
            let src = tmp.path().join("f");
            fs::write(&src, b"data").unwrap();
            assert!(matches!(svc.verify(&hash, &src), Err(RotError::Parity(_))));
        }

        #[test]
        fn tool_sees_the_hash_derived_name() {
            let (tmp, layout, svc) = setup(concat!(
                "echo \"$1 $(basename \"$last\") $(cat \"$last\")\"",
                " >> \"$(dirname \"$0\")/calls\"",
            ));
            let hash = hash_bytes(b"same");
            place_index(&layout, &hash);
            for name in ["a.jpg", "copy of a.jpg"] {
                let src = tmp.path().join(name);
                fs::write(&src, b"same").unwrap();
                assert_eq!(svc.verify(&hash, &src).unwrap(), VerifyOutcome::Ok);
            }

            let stem = ParityRef::for_hash(&hash).stem().to_string();
            let calls = fs::read_to_string(tmp.path().join("calls")).unwrap();
            let expected = format!("verify {stem}.data same\n");
            assert_eq!(calls, expected.repeat(2));
        }

        #[test]
        fn repair_copies_the_rebuilt_file_back() {
            // par2 moves the damaged file aside and writes a fresh one under the recorded name
            let (tmp, layout, svc) = setup("mv \"$last\" \"$last.1\"\nprintf good > \"$last\"");
            let hash = hash_bytes(b"good");
            place_index(&layout, &hash);
            let src = tmp.path().join("photo.jpg");
            fs::write(&src, b"gXod").unwrap();

            assert_eq!(svc.repair(&hash, &src).unwrap(), RepairOutcome::Repaired);
            assert_eq!(fs::read(&src).unwrap(), b"good");
            assert!(!fs::symlink_metadata(&src).unwrap().file_type().is_symlink());
            assert_eq!(layout.sweep_staging().unwrap(), 0);
        }

        #[test]
        fn failed_repair_leaves_the_file_alone() {
            let (tmp, layout, svc) = setup("exit 2");
            let hash = hash_bytes(b"good");
            place_index(&layout, &hash);
            let src = tmp.path().join("photo.jpg");
            fs::write(&src, b"gXod").unwrap();

            assert_eq!(svc.repair(&hash, &src).unwrap(), RepairOutcome::Failed);
            assert_eq!(fs::read(&src).unwrap(), b"gXod");
        }
    }
}
