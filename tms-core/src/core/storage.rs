//! Persistent key-value storage backed by SQLite.
//!
//! [`KeyValueStore`] is the seam every other module writes through. Values are
//! opaque text at this layer; envelopes and JSON decoding live in
//! [`record`](super::record).

use crate::{Result, TmsError};
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS kv_store (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);";

/// String-keyed storage medium with all-or-nothing batch writes.
///
/// Sizes are measured in characters of key plus value, matching how the
/// health check estimates usage.
pub trait KeyValueStore {
    /// Returns the raw stored text for `key`, or `None` if absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns [`TmsError::StorageFull`] if the write would exceed the store's
    /// capacity. The previous value is left in place.
    fn set(&mut self, key: &str, value: &str) -> Result<()>;

    /// Removes `key`. Deleting an absent key is not an error.
    fn delete(&mut self, key: &str) -> Result<()>;

    /// Returns every key currently stored, in ascending order.
    fn list_keys(&self) -> Result<Vec<String>>;

    /// Returns every `(key, value)` pair from a single enumeration.
    fn entries(&self) -> Result<Vec<(String, String)>>;

    /// Writes all `entries` or none of them.
    fn set_many(&mut self, entries: &[(String, String)]) -> Result<()>;

    /// Replaces the hard capacity enforced on writes. `None` disables the limit.
    fn set_capacity(&mut self, capacity: Option<u64>);

    /// Total characters used by keys and values.
    fn used_bytes(&self) -> Result<u64> {
        Ok(self
            .entries()?
            .iter()
            .map(|(k, v)| entry_size(k, v))
            .sum())
    }
}

/// Size of one entry as counted against the capacity.
#[must_use]
pub fn entry_size(key: &str, value: &str) -> u64 {
    (key.chars().count() + value.chars().count()) as u64
}

/// SQLite-backed [`KeyValueStore`].
pub struct Storage {
    conn: Connection,
    capacity: Option<u64>,
}

impl Storage {
    /// Creates (or reuses) a database at `path` and initialises the schema.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            capacity: None,
        })
    }

    /// Opens an existing store, rejecting files that are not TMS databases.
    ///
    /// # Errors
    ///
    /// Returns [`TmsError::Database`] if the file is not SQLite, or
    /// [`TmsError::InvalidInput`] if the `kv_store` table is missing.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;

        let table_count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name = 'kv_store'",
            [],
            |row| row.get(0),
        )?;

        if table_count != 1 {
            return Err(TmsError::InvalidInput(
                "Not a valid TMS database".to_string(),
            ));
        }

        Ok(Self {
            conn,
            capacity: None,
        })
    }

    /// Creates a throwaway store that lives only as long as the value.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            capacity: None,
        })
    }

    /// Sets the hard capacity enforced on writes. `None` disables the limit.
    #[must_use]
    pub fn with_capacity(mut self, capacity: Option<u64>) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn capacity(&self) -> Option<u64> {
        self.capacity
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn write_checked(&mut self, entries: &[(String, String)]) -> Result<()> {
        let capacity = self.capacity;

        let tx = self.conn.transaction()?;
        for (key, value) in entries {
            tx.execute(
                "INSERT INTO kv_store (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                [key, value],
            )?;
        }

        if let Some(capacity) = capacity {
            let used_after: i64 = tx.query_row(
                "SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) FROM kv_store",
                [],
                |row| row.get(0),
            )?;
            if used_after as u64 > capacity {
                tx.rollback()?;
                let used_before = self.used_bytes()?;
                return Err(TmsError::StorageFull {
                    key: batch_label(entries),
                    needed: entries.iter().map(|(k, v)| entry_size(k, v)).sum(),
                    available: capacity.saturating_sub(used_before),
                });
            }
        }

        tx.commit()?;
        Ok(())
    }
}

impl KeyValueStore for Storage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv_store WHERE key = ?", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.write_checked(&[(key.to_string(), value.to_string())])
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?", [key])?;
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT key FROM kv_store ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn entries(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM kv_store ORDER BY key")?;
        let entries = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<(String, String)>, _>>()?;
        Ok(entries)
    }

    fn set_many(&mut self, entries: &[(String, String)]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.write_checked(entries)
    }

    fn set_capacity(&mut self, capacity: Option<u64>) {
        self.capacity = capacity;
    }

    fn used_bytes(&self) -> Result<u64> {
        let used: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(key) + LENGTH(value)), 0) FROM kv_store",
            [],
            |row| row.get(0),
        )?;
        Ok(used as u64)
    }
}

/// Names a write in a [`TmsError::StorageFull`] error.
pub(crate) fn batch_label(entries: &[(String, String)]) -> String {
    match entries {
        [(key, _)] => key.clone(),
        _ => format!("{} keys", entries.len()),
    }
}
