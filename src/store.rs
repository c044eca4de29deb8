// # Persistent Store
//
// A single table, single shared connection, write-ahead-logging store. This
// is the cache's source of truth: every store operation runs inside an
// explicit transaction and uses bound parameters, following the schema
// migration idiom the pack uses for embedded SQLite (see
// `ConaryLabs-conary`'s `src/db/schema.rs`): `CREATE TABLE IF NOT EXISTS`
// plus an explicit index, applied once at open.

use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;

/// One row of the `cache` table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub key: String,
    pub value: Vec<u8>,
    pub timestamp: f64,
    pub schema_version: String,
    pub size: u64,
}

pub struct PersistentStore {
    conn: Connection,
}

impl PersistentStore {
    /// Open (creating if absent) the SQLite file at `path`, enable WAL, and
    /// ensure the schema and its `(timestamp, key)` index exist.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache (
                key             TEXT PRIMARY KEY,
                value           TEXT NOT NULL,
                timestamp       REAL NOT NULL,
                schema_version  TEXT NOT NULL,
                size            INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cache_ts_key ON cache(timestamp, key);",
        )?;

        Ok(Self { conn })
    }

    /// Open an in-memory database, for tests that do not need durability
    /// across process restarts.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache (
                key             TEXT PRIMARY KEY,
                value           TEXT NOT NULL,
                timestamp       REAL NOT NULL,
                schema_version  TEXT NOT NULL,
                size            INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cache_ts_key ON cache(timestamp, key);",
        )?;
        Ok(Self { conn })
    }

    pub fn get_by_key(&self, key: &str) -> Result<Option<StoredEntry>> {
        self.conn
            .query_row(
                "SELECT key, value, timestamp, schema_version, size FROM cache WHERE key = ?1",
                params![key],
                Self::row_to_entry,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Upsert a single entry, replacing any prior row for `key`. `value` is
    /// the record's canonical encoding, already validated as UTF-8 text by
    /// the caller (the two-tier coordinator). Returns the size of the row
    /// this write replaced, if any, so the caller can fold the write into
    /// its gauges incrementally instead of re-querying the table.
    pub fn write(
        &mut self,
        key: &str,
        value: &str,
        timestamp: f64,
        schema_version: &str,
        size: u64,
    ) -> Result<Option<u64>> {
        let tx = self.conn.transaction()?;
        let old_size = Self::write_row(&tx, key, value, timestamp, schema_version, size)?;
        tx.commit()?;
        Ok(old_size)
    }

    /// Upsert many entries in a single transaction; all-or-nothing. Returns
    /// the replaced size for each entry, in the same order as `entries`.
    pub fn write_many(
        &mut self,
        entries: &[(String, String, f64, String, u64)],
    ) -> Result<Vec<Option<u64>>> {
        let tx = self.conn.transaction()?;
        let mut old_sizes = Vec::with_capacity(entries.len());
        for (key, value, timestamp, schema_version, size) in entries {
            old_sizes.push(Self::write_row(&tx, key, value, *timestamp, schema_version, *size)?);
        }
        tx.commit()?;
        Ok(old_sizes)
    }

    fn write_row(
        tx: &rusqlite::Transaction<'_>,
        key: &str,
        value: &str,
        timestamp: f64,
        schema_version: &str,
        size: u64,
    ) -> Result<Option<u64>> {
        let old_size: Option<i64> = tx
            .query_row("SELECT size FROM cache WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        tx.execute(
            "INSERT INTO cache (key, value, timestamp, schema_version, size)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                timestamp = excluded.timestamp,
                schema_version = excluded.schema_version,
                size = excluded.size",
            params![key, value, timestamp, schema_version, size as i64],
        )?;
        Ok(old_size.map(|s| s as u64))
    }

    /// Update only the `timestamp` column for an existing row.
    pub fn touch_timestamp(&mut self, key: &str, timestamp: f64) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "UPDATE cache SET timestamp = ?1 WHERE key = ?2",
            params![timestamp, key],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Delete a row, returning its size if one was removed. The `Option`
    /// return (rather than a bare `bool`) lets the caller fold the removal
    /// into its size gauge without a follow-up query.
    pub fn delete(&mut self, key: &str) -> Result<Option<u64>> {
        let tx = self.conn.transaction()?;
        let removed: Option<i64> = tx
            .query_row(
                "DELETE FROM cache WHERE key = ?1 RETURNING size",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        tx.commit()?;
        Ok(removed.map(|s| s as u64))
    }

    /// Delete every named key (unknown keys are silently skipped). Returns
    /// `(rows_removed, total_size_removed)` so the caller can fold the
    /// batch into its gauges in one step.
    pub fn delete_many(&mut self, keys: &[String]) -> Result<(u64, u64)> {
        let tx = self.conn.transaction()?;
        let mut count = 0u64;
        let mut total_size = 0u64;
        for key in keys {
            let removed: Option<i64> = tx
                .query_row(
                    "DELETE FROM cache WHERE key = ?1 RETURNING size",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            if let Some(size) = removed {
                count += 1;
                total_size += size as u64;
            }
        }
        tx.commit()?;
        Ok((count, total_size))
    }

    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn sum_size(&self) -> Result<u64> {
        let sum: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(size), 0) FROM cache",
            [],
            |row| row.get(0),
        )?;
        Ok(sum as u64)
    }

    pub fn exists(&self, key: &str) -> Result<bool> {
        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM cache WHERE key = ?1)",
            params![key],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// The `n` oldest rows ordered by `(timestamp asc, key asc)`.
    pub fn iter_oldest(&self, n: u64) -> Result<Vec<StoredEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT key, value, timestamp, schema_version, size
             FROM cache
             ORDER BY timestamp ASC, key ASC
             LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![n as i64], Self::row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Delete every row whose `schema_version` does not match `expected`.
    /// Used during initialization cleanup.
    pub fn delete_mismatched_schema(&mut self, expected: &str) -> Result<u64> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM cache WHERE schema_version != ?1",
            params![expected],
        )?;
        tx.commit()?;
        Ok(removed as u64)
    }

    pub fn delete_all(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM cache", [])?;
        tx.commit()?;
        Ok(())
    }

    /// Release the underlying connection. Any outstanding WAL frames are
    /// checkpointed by SQLite as part of the close.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| e.into())
    }

    fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredEntry> {
        let value_text: String = row.get(1)?;
        Ok(StoredEntry {
            key: row.get(0)?,
            value: value_text.into_bytes(),
            timestamp: row.get(2)?,
            schema_version: row.get(3)?,
            size: {
                let size: i64 = row.get(4)?;
                size as u64
            },
        })
    }
}
