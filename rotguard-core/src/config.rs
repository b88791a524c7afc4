//! Environment-style configuration.
//!
//! Every option is a flat `KEY=value` pair so the tool can be driven from a
//! container environment or a cron wrapper. [`Config::from_lookup`] accepts any
//! key resolver so tests never touch the process environment.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Result, RotError};
use crate::parity_factory::Backend;

pub const DEFAULT_EXCLUDES: &str =
    ".DS_Store,Thumbs.db,*.tmp,*.partial,.parity,#recycle,#archive,#trash";

#[derive(Clone, Debug, Serialize)]
pub struct Config {
    pub data_root: PathBuf,
    pub parity_root: PathBuf,
    pub backend: Backend,
    pub redundancy_percent: u8,
    #[serde(skip)]
    pub parity_timeout: Duration,
    pub min_file_size: u64,
    /// `None` means no upper bound.
    pub max_file_size: Option<u64>,
    pub verify_percent: u8,
    pub exclude_patterns: Vec<String>,
    /// Worker pool size for hashing and verification; 0 picks one per CPU.
    pub workers: usize,
    pub log_level: String,
    pub notify_webhook: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from("/data"),
            parity_root: PathBuf::from("/parity"),
            backend: Backend::Par2,
            redundancy_percent: 10,
            parity_timeout: Duration::from_secs(3600),
            min_file_size: 4096,
            max_file_size: None,
            verify_percent: 100,
            exclude_patterns: split_patterns(DEFAULT_EXCLUDES),
            workers: 0,
            log_level: "info".to_string(),
            notify_webhook: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string());
        let mut cfg = Config::default();

        if let Some(v) = get("DATA_ROOT").filter(|v| !v.is_empty()) {
            cfg.data_root = PathBuf::from(v);
        }
        if let Some(v) = get("PARITY_ROOT").filter(|v| !v.is_empty()) {
            cfg.parity_root = PathBuf::from(v);
        }
        if let Some(v) = get("PARITY_BACKEND").filter(|v| !v.is_empty()) {
            cfg.backend = Backend::from_str(&v)?;
        }
        if let Some(v) = get("PAR2_REDUNDANCY") {
            cfg.redundancy_percent = parse_num("PAR2_REDUNDANCY", &v)?;
        }
        if let Some(v) = get("PAR2_TIMEOUT") {
            cfg.parity_timeout = Duration::from_secs(parse_num("PAR2_TIMEOUT", &v)?);
        }
        if let Some(v) = get("MIN_FILE_SIZE") {
            cfg.min_file_size = parse_num("MIN_FILE_SIZE", &v)?;
        }
        if let Some(v) = get("MAX_FILE_SIZE") {
            cfg.max_file_size = parse_max_size(&v)?;
        }
        if let Some(v) = get("VERIFY_PERCENT") {
            cfg.verify_percent = parse_num("VERIFY_PERCENT", &v)?;
        }
        if let Some(v) = get("EXCLUDE_PATTERNS") {
            cfg.exclude_patterns = split_patterns(&v);
        }
        if let Some(v) = get("WORKERS") {
            cfg.workers = parse_num("WORKERS", &v)?;
        }
        if let Some(v) = get("LOG_LEVEL").filter(|v| !v.is_empty()) {
            cfg.log_level = v.to_lowercase();
        }
        cfg.notify_webhook = get("NOTIFY_WEBHOOK").filter(|v| !v.is_empty());

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.redundancy_percent) {
            return Err(RotError::Config(format!(
                "PAR2_REDUNDANCY must be within 1..=100, got {}",
                self.redundancy_percent
            )));
        }
        if self.verify_percent > 100 {
            return Err(RotError::Config(format!(
                "VERIFY_PERCENT must be within 0..=100, got {}",
                self.verify_percent
            )));
        }
        if let Some(max) = self.max_file_size {
            if max < self.min_file_size {
                return Err(RotError::Config(format!(
                    "MAX_FILE_SIZE ({max}) is below MIN_FILE_SIZE ({})",
                    self.min_file_size
                )));
            }
        }
        if self.parity_timeout.is_zero() {
            return Err(RotError::Config("PAR2_TIMEOUT must be positive".into()));
        }
        Ok(())
    }

    /// Create the parity-side directory tree and confirm it is writable.
    pub fn prepare_dirs(&self) -> Result<()> {
        for dir in [
            self.parity_root.clone(),
            self.db_dir(),
            self.log_dir(),
            self.hash_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|e| {
                RotError::Config(format!("cannot create {}: {e}", dir.display()))
            })?;
        }
        let probe = self.db_dir().join(".write-probe");
        fs::write(&probe, b"")
            .and_then(|_| fs::remove_file(&probe))
            .map_err(|e| {
                RotError::Config(format!("{} is not writable: {e}", self.db_dir().display()))
            })?;
        Ok(())
    }

    pub fn db_dir(&self) -> PathBuf {
        self.parity_root.join("_db")
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir().join("manifest.db")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.db_dir().join("run.lock")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.parity_root.join("_logs")
    }

    pub fn hash_dir(&self) -> PathBuf {
        self.parity_root.join("by_hash")
    }

    /// Staging area for parity being written; same filesystem as `hash_dir`.
    pub fn staging_dir(&self) -> PathBuf {
        self.parity_root.clone()
    }

    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    pub fn max_size_display(&self) -> String {
        match self.max_file_size {
            Some(n) => n.to_string(),
            None => "unlimited".to_string(),
        }
    }
}

fn parse_num<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse::<T>()
        .map_err(|_| RotError::Config(format!("{key}: not a valid number: {raw:?}")))
}

fn parse_max_size(raw: &str) -> Result<Option<u64>> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("unlimited") {
        return Ok(None);
    }
    // Older deployments wrote 0 for "no limit"; it never reaches the struct.
    match parse_num::<u64>("MAX_FILE_SIZE", raw)? {
        0 => Ok(None),
        n => Ok(Some(n)),
    }
}

fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn cfg_from(pairs: &[(&str, &str)]) -> Result<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = cfg_from(&[]).unwrap();
        assert_eq!(cfg.data_root, PathBuf::from("/data"));
        assert_eq!(cfg.redundancy_percent, 10);
        assert_eq!(cfg.min_file_size, 4096);
        assert_eq!(cfg.max_file_size, None);
        assert_eq!(cfg.verify_percent, 100);
        assert_eq!(cfg.backend, Backend::Par2);
        assert!(cfg.exclude_patterns.contains(&"*.tmp".to_string()));
        assert_eq!(cfg.db_path(), PathBuf::from("/parity/_db/manifest.db"));
        assert_eq!(cfg.hash_dir(), PathBuf::from("/parity/by_hash"));
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = cfg_from(&[
            ("PAR2_REDUNDANCY", "25"),
            ("MIN_FILE_SIZE", "1"),
            ("MAX_FILE_SIZE", "1048576"),
            ("VERIFY_PERCENT", "5"),
            ("EXCLUDE_PATTERNS", " *.bak , ,.git "),
            ("PARITY_BACKEND", "mirror"),
            ("NOTIFY_WEBHOOK", "http://hook"),
        ])
        .unwrap();
        assert_eq!(cfg.redundancy_percent, 25);
        assert_eq!(cfg.max_file_size, Some(1_048_576));
        assert_eq!(cfg.verify_percent, 5);
        assert_eq!(cfg.exclude_patterns, vec!["*.bak", ".git"]);
        assert_eq!(cfg.backend, Backend::Mirror);
        assert_eq!(cfg.notify_webhook.as_deref(), Some("http://hook"));
    }

    #[test]
    fn max_size_zero_and_empty_mean_unlimited() {
        assert_eq!(cfg_from(&[("MAX_FILE_SIZE", "0")]).unwrap().max_file_size, None);
        assert_eq!(cfg_from(&[("MAX_FILE_SIZE", "")]).unwrap().max_file_size, None);
        assert_eq!(
            cfg_from(&[("MAX_FILE_SIZE", "unlimited")]).unwrap().max_file_size,
            None
        );
    }

    #[test]
    fn empty_exclude_list_is_allowed() {
        let cfg = cfg_from(&[("EXCLUDE_PATTERNS", "")]).unwrap();
        assert!(cfg.exclude_patterns.is_empty());
    }

    #[test]
    fn invalid_values_are_config_errors() {
        for pairs in [
            vec![("PAR2_REDUNDANCY", "0")],
            vec![("PAR2_REDUNDANCY", "ten")],
            vec![("VERIFY_PERCENT", "101")],
            vec![("MIN_FILE_SIZE", "100"), ("MAX_FILE_SIZE", "10")],
            vec![("PARITY_BACKEND", "raid")],
        ] {
            let err = cfg_from(&pairs).unwrap_err();
            assert!(matches!(err, RotError::Config(_)), "{pairs:?} gave {err}");
        }
    }

    #[test]
    fn prepare_dirs_builds_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("parity");
        let cfg = cfg_from(&[("PARITY_ROOT", root.to_str().unwrap())]).unwrap();
        cfg.prepare_dirs().unwrap();
        assert!(cfg.db_dir().is_dir());
        assert!(cfg.log_dir().is_dir());
        assert!(cfg.hash_dir().is_dir());
    }
}
