//! SQLite-backed manifest of tracked files and run history.
//!
//! The table layout is shared with existing deployments: `files` keyed by
//! `(data_root, rel_path)` and the append-only `runs` history. Every public
//! mutator is one transaction.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags, OptionalExtension, Params, Row, params};

use crate::domain::{ContentHash, FileKey, FileRecord, FileStatus, RunKind, RunRecord};
use crate::error::{Result, RotError};
use crate::parity::layout::ParityRef;
use crate::stats::RunSummary;
use crate::util::clock::now_rfc3339;

mod schema;

const FILE_COLUMNS: &str =
    "id, data_root, rel_path, file_size, mtime_ns, content_hash, status, verified_at";

pub struct Manifest {
    connection: Connection,
    path: Option<PathBuf>,
}

struct RawFile {
    id: i64,
    data_root: String,
    rel_path: String,
    file_size: i64,
    mtime_ns: i64,
    content_hash: String,
    status: String,
    verified_at: Option<String>,
}

impl RawFile {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            data_root: row.get(1)?,
            rel_path: row.get(2)?,
            file_size: row.get(3)?,
            mtime_ns: row.get(4)?,
            content_hash: row.get(5)?,
            status: row.get(6)?,
            verified_at: row.get(7)?,
        })
    }

    fn into_record(self) -> Result<FileRecord> {
        Ok(FileRecord {
            id: self.id,
            key: FileKey::new(self.data_root, self.rel_path),
            size_bytes: self.file_size.max(0) as u64,
            mtime_ns: self.mtime_ns,
            content_hash: ContentHash::parse(&self.content_hash)?,
            status: self.status.parse()?,
            verified_at: self.verified_at,
        })
    }
}

impl Manifest {
    /// Open (or create) the manifest database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let connection = Connection::open(path)?;
        Self::init(connection, Some(path.to_path_buf()))
    }

    /// Open an existing manifest for reading. Creates nothing on disk and
    /// leaves the schema as found.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let connection = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        connection.busy_timeout(Duration::from_secs(5))?;
        Ok(Self {
            connection,
            path: Some(path.to_path_buf()),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(connection: Connection, path: Option<PathBuf>) -> Result<Self> {
        let manifest = Self { connection, path };
        manifest.apply_pragmas()?;
        manifest.apply_schema()?;
        manifest.migrate_run_columns()?;
        Ok(manifest)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // -- file lookups --

    pub fn get(&self, key: &FileKey) -> Result<Option<FileRecord>> {
        let raw = self
            .connection
            .prepare_cached(&format!(
                "SELECT {FILE_COLUMNS} FROM files WHERE data_root = ?1 AND rel_path = ?2"
            ))?
            .query_row(params![key.data_root, key.rel_path], RawFile::from_row)
            .optional()?;
        raw.map(RawFile::into_record).transpose()
    }

    pub fn all(&self) -> Result<Vec<FileRecord>> {
        self.query_files(
            &format!("SELECT {FILE_COLUMNS} FROM files ORDER BY data_root, rel_path"),
            [],
        )
    }

    pub fn by_hash(&self, hash: &ContentHash) -> Result<Vec<FileRecord>> {
        self.query_files(
            &format!(
                "SELECT {FILE_COLUMNS} FROM files WHERE content_hash = ?1
                 ORDER BY data_root, rel_path"
            ),
            params![hash.as_str()],
        )
    }

    pub fn by_status(&self, status: FileStatus) -> Result<Vec<FileRecord>> {
        self.query_files(
            &format!(
                "SELECT {FILE_COLUMNS} FROM files WHERE status = ?1
                 ORDER BY data_root, rel_path"
            ),
            params![status.as_str()],
        )
    }

    pub fn count_by_hash(&self, hash: &ContentHash) -> Result<u64> {
        let n: i64 = self
            .connection
            .prepare_cached("SELECT COUNT(*) FROM files WHERE content_hash = ?1")?
            .query_row(params![hash.as_str()], |row| row.get(0))?;
        Ok(n as u64)
    }

    /// Whether any record still points at this artifact.
    pub fn references_parity(&self, r: &ParityRef) -> Result<bool> {
        let hit = self
            .connection
            .prepare_cached("SELECT 1 FROM files WHERE par2_name = ?1 LIMIT 1")?
            .query_row(params![r.par2_name()], |_| Ok(()))
            .optional()?;
        Ok(hit.is_some())
    }

    pub fn status_counts(&self) -> Result<BTreeMap<FileStatus, u64>> {
        let mut stmt = self
            .connection
            .prepare("SELECT status, COUNT(*) FROM files GROUP BY status")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        let mut out = BTreeMap::new();
        for (status, n) in rows {
            out.insert(status.parse::<FileStatus>()?, n as u64);
        }
        Ok(out)
    }

    fn query_files<P: Params>(&self, sql: &str, p: P) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection.prepare_cached(sql)?;
        let raws = stmt
            .query_map(p, RawFile::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raws.into_iter().map(RawFile::into_record).collect()
    }

    // -- file mutations --

    /// Insert a record for a freshly hashed file; `par2_name` is derived from the hash.
    pub fn insert(
        &self,
        key: &FileKey,
        size_bytes: u64,
        mtime_ns: i64,
        hash: &ContentHash,
        status: FileStatus,
    ) -> Result<i64> {
        let now = now_rfc3339();
        self.connection
            .prepare_cached(
                "INSERT INTO files (data_root, rel_path, file_size, mtime_ns,
                                    content_hash, par2_name, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            )?
            .execute(params![
                key.data_root,
                key.rel_path,
                size_bytes as i64,
                mtime_ns,
                hash.as_str(),
                ParityRef::for_hash(hash).par2_name(),
                status.as_str(),
                now,
            ])?;
        Ok(self.connection.last_insert_rowid())
    }

    /// Point an existing record at a new path (move/rename), keeping hash and parity.
    pub fn relocate(
        &self,
        id: i64,
        key: &FileKey,
        size_bytes: u64,
        mtime_ns: i64,
        status: FileStatus,
    ) -> Result<()> {
        self.update_one(
            "UPDATE files SET data_root = ?1, rel_path = ?2, file_size = ?3, mtime_ns = ?4,
                              status = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                key.data_root,
                key.rel_path,
                size_bytes as i64,
                mtime_ns,
                status.as_str(),
                now_rfc3339(),
                id
            ],
        )
    }

    pub fn update_metadata(
        &self,
        id: i64,
        size_bytes: u64,
        mtime_ns: i64,
        status: FileStatus,
    ) -> Result<()> {
        self.update_one(
            "UPDATE files SET file_size = ?1, mtime_ns = ?2, status = ?3, updated_at = ?4
             WHERE id = ?5",
            params![size_bytes as i64, mtime_ns, status.as_str(), now_rfc3339(), id],
        )
    }

    pub fn replace_content(
        &self,
        id: i64,
        size_bytes: u64,
        mtime_ns: i64,
        hash: &ContentHash,
        status: FileStatus,
    ) -> Result<()> {
        self.update_one(
            "UPDATE files SET file_size = ?1, mtime_ns = ?2, content_hash = ?3, par2_name = ?4,
                              status = ?5, updated_at = ?6
             WHERE id = ?7",
            params![
                size_bytes as i64,
                mtime_ns,
                hash.as_str(),
                ParityRef::for_hash(hash).par2_name(),
                status.as_str(),
                now_rfc3339(),
                id
            ],
        )
    }

    pub fn set_status(&self, id: i64, status: FileStatus) -> Result<()> {
        self.update_one(
            "UPDATE files SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now_rfc3339(), id],
        )
    }

    pub fn mark_verified(&self, id: i64, status: FileStatus) -> Result<()> {
        let now = now_rfc3339();
        self.update_one(
            "UPDATE files SET status = ?1, verified_at = ?2, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now, id],
        )
    }

    /// Delete a record and report how many records still reference `hash`,
    /// both inside one transaction.
    pub fn remove_and_count(&self, id: i64, hash: &ContentHash) -> Result<u64> {
        let tx = self.connection.unchecked_transaction()?;
        tx.execute("DELETE FROM files WHERE id = ?1", params![id])?;
        let left: i64 = tx.query_row(
            "SELECT COUNT(*) FROM files WHERE content_hash = ?1",
            params![hash.as_str()],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(left as u64)
    }

    fn update_one<P: Params>(&self, sql: &str, p: P) -> Result<()> {
        let changed = self.connection.prepare_cached(sql)?.execute(p)?;
        if changed == 0 {
            return Err(RotError::Format("manifest row vanished during update".into()));
        }
        Ok(())
    }

    // -- run history --

    pub fn start_run(&self, kind: RunKind) -> Result<i64> {
        self.connection.execute(
            "INSERT INTO runs (started_at, kind) VALUES (?1, ?2)",
            params![now_rfc3339(), kind.as_str()],
        )?;
        Ok(self.connection.last_insert_rowid())
    }

    /// Close out a run. Finished runs are immutable; a second call is an error.
    pub fn finish_run(&self, id: i64, s: &RunSummary, outcome: &str) -> Result<()> {
        let changed = self.connection.execute(
            "UPDATE runs SET
                finished_at = ?1, files_scanned = ?2, files_created = ?3,
                files_verified = ?4, files_damaged = ?5, files_repaired = ?6,
                files_moved = ?7, files_deleted = ?8, files_truncated = ?9,
                parity_recreated = ?10, orphan_parity_cleaned = ?11, errors = ?12,
                files_new = ?13, files_touched = ?14, files_modified = ?15,
                files_hashed = ?16, outcome = ?17
             WHERE id = ?18 AND finished_at IS NULL",
            params![
                now_rfc3339(),
                s.scanned as i64,
                s.parity_created as i64,
                s.verified as i64,
                s.damaged as i64,
                s.repaired as i64,
                s.moved as i64,
                s.deleted as i64,
                s.truncated as i64,
                s.parity_recreated as i64,
                s.orphan_parity_cleaned as i64,
                s.errors_text(),
                s.new as i64,
                s.touched as i64,
                s.modified as i64,
                s.hashed as i64,
                outcome,
                id,
            ],
        )?;
        if changed == 0 {
            return Err(RotError::Format(format!("run {id} is unknown or already finished")));
        }
        Ok(())
    }

    pub fn last_run(&self) -> Result<Option<RunRecord>> {
        let row = self
            .connection
            .query_row(
                "SELECT id, kind, started_at, finished_at, outcome,
                        files_scanned, files_created, files_verified, files_damaged,
                        files_repaired, files_moved, files_deleted, files_truncated,
                        parity_recreated, orphan_parity_cleaned, errors,
                        files_new, files_touched, files_modified, files_hashed
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    let n = |i: usize| -> rusqlite::Result<u64> {
                        Ok(row.get::<_, Option<i64>>(i)?.unwrap_or(0).max(0) as u64)
                    };
                    let errors: Option<String> = row.get(15)?;
                    let summary = RunSummary {
                        scanned: n(5)?,
                        parity_created: n(6)?,
                        verified: n(7)?,
                        damaged: n(8)?,
                        repaired: n(9)?,
                        moved: n(10)?,
                        deleted: n(11)?,
                        truncated: n(12)?,
                        parity_recreated: n(13)?,
                        orphan_parity_cleaned: n(14)?,
                        errors: errors
                            .map(|e| e.lines().map(str::to_string).collect())
                            .unwrap_or_default(),
                        new: n(16)?,
                        touched: n(17)?,
                        modified: n(18)?,
                        hashed: n(19)?,
                    };
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        summary,
                    ))
                },
            )
            .optional()?;
        Ok(row.map(|(id, kind, started_at, finished_at, outcome, summary)| RunRecord {
            id,
            kind: kind.as_deref().and_then(parse_run_kind),
            started_at,
            finished_at,
            outcome,
            summary,
        }))
    }
}

fn parse_run_kind(s: &str) -> Option<RunKind> {
    match s {
        "scan" => Some(RunKind::Scan),
        "verify" => Some(RunKind::Verify),
        "repair" => Some(RunKind::Repair),
        _ => None,
    }
}
