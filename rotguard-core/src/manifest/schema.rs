use std::collections::HashSet;

use super::Manifest;
use crate::error::Result;

/// Columns added to `runs` after the first release; older databases get them on open.
const RUN_COLUMNS: &[(&str, &str)] = &[
    ("kind", "TEXT"),
    ("outcome", "TEXT"),
    ("files_new", "INTEGER DEFAULT 0"),
    ("files_touched", "INTEGER DEFAULT 0"),
    ("files_modified", "INTEGER DEFAULT 0"),
    ("files_hashed", "INTEGER DEFAULT 0"),
    ("files_truncated", "INTEGER DEFAULT 0"),
    ("parity_recreated", "INTEGER DEFAULT 0"),
    ("orphan_parity_cleaned", "INTEGER DEFAULT 0"),
];

impl Manifest {
    pub(super) fn apply_pragmas(&self) -> Result<()> {
        self.connection.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys=ON;
             PRAGMA busy_timeout=5000;
             PRAGMA temp_store=MEMORY;",
        )?;
        Ok(())
    }

    pub(super) fn apply_schema(&self) -> Result<()> {
        self.connection.execute_batch(
            "CREATE TABLE IF NOT EXISTS files (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                rel_path     TEXT NOT NULL,
                data_root    TEXT NOT NULL,
                file_size    INTEGER NOT NULL,
                mtime_ns     INTEGER NOT NULL,
                content_hash TEXT NOT NULL,
                par2_name    TEXT NOT NULL,
                status       TEXT NOT NULL DEFAULT 'ok',
                created_at   TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at   TEXT NOT NULL DEFAULT (datetime('now')),
                verified_at  TEXT,
                UNIQUE(data_root, rel_path)
            );
            CREATE INDEX IF NOT EXISTS idx_content_hash ON files(content_hash);
            CREATE INDEX IF NOT EXISTS idx_par2_name ON files(par2_name);
            CREATE TABLE IF NOT EXISTS runs (
                id                    INTEGER PRIMARY KEY AUTOINCREMENT,
                started_at            TEXT NOT NULL,
                finished_at           TEXT,
                files_scanned         INTEGER DEFAULT 0,
                files_created         INTEGER DEFAULT 0,
                files_verified        INTEGER DEFAULT 0,
                files_damaged         INTEGER DEFAULT 0,
                files_repaired        INTEGER DEFAULT 0,
                files_moved           INTEGER DEFAULT 0,
                files_deleted         INTEGER DEFAULT 0,
                errors                TEXT
            );",
        )?;
        Ok(())
    }

    pub(super) fn migrate_run_columns(&self) -> Result<()> {
        let columns = self.table_columns("runs")?;
        let missing: Vec<_> = RUN_COLUMNS
            .iter()
            .filter(|(name, _)| !columns.contains(*name))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        let tx = self.connection.unchecked_transaction()?;
        for (name, decl) in missing {
            tx.execute(&format!("ALTER TABLE runs ADD COLUMN {name} {decl}"), [])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn table_columns(&self, table: &str) -> Result<HashSet<String>> {
        let mut stmt = self
            .connection
            .prepare(&format!("PRAGMA table_info({table})"))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<rusqlite::Result<HashSet<_>>>()?;
        Ok(columns)
    }
}
