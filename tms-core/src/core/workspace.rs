//! High-level get/save, backup and health operations over one key-value store.

use crate::core::export::{self, Snapshot};
use crate::core::health::{self, StorageHealth};
use crate::core::sync::{is_reserved_key, is_sync_metadata_key, SyncState};
use crate::{KeyValueStore, RecordCodec, Result, Storage, TmsError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Assumed ceiling of the storage medium, matching a browser's 5 MiB local storage.
pub const DEFAULT_STORAGE_CEILING_BYTES: u64 = 5 * 1024 * 1024;
/// Free space below which a probe reports insufficient space.
pub const DEFAULT_LOW_SPACE_THRESHOLD_BYTES: u64 = 500 * 1024;

/// Tunables for a [`Workspace`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkspaceConfig {
    /// Ceiling used by the health probe to estimate free space.
    pub storage_ceiling_bytes: u64,
    /// A probe with this much or less free space is flagged as insufficient.
    pub low_space_threshold_bytes: u64,
    /// Hard limit enforced by the store on writes. `None` means unlimited.
    pub capacity_bytes: Option<u64>,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            storage_ceiling_bytes: DEFAULT_STORAGE_CEILING_BYTES,
            low_space_threshold_bytes: DEFAULT_LOW_SPACE_THRESHOLD_BYTES,
            capacity_bytes: Some(DEFAULT_STORAGE_CEILING_BYTES),
        }
    }
}

/// Result of an admin-gated action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum GateOutcome {
    /// Credentials matched and the change was persisted.
    Applied,
    /// Credentials matched but there was nothing to change.
    Unchanged,
    /// Credentials did not match; nothing was written.
    Denied,
}

/// An open store plus the device identity and sync state that go with it.
///
/// All record reads and writes go through the [`RecordCodec`], so values are
/// enveloped on save and legacy values are migrated on first read. The store
/// offers no read-modify-write atomicity: callers updating several fields of
/// one record must compose them into a single save.
pub struct Workspace<S: KeyValueStore = Storage> {
    store: S,
    codec: RecordCodec,
    sync: SyncState,
    config: WorkspaceConfig,
    /// Last lecture ID handed out, in epoch milliseconds.
    pub(crate) lecture_clock: i64,
}

impl Workspace<Storage> {
    /// Creates (or reuses) a SQLite store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TmsError::Database`] for any SQLite failure.
    pub fn create<P: AsRef<Path>>(path: P, config: WorkspaceConfig) -> Result<Self> {
        Self::with_store(Storage::create(path)?, config)
    }

    /// Opens an existing SQLite store at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TmsError::InvalidInput`] if the file is not a TMS store.
    pub fn open<P: AsRef<Path>>(path: P, config: WorkspaceConfig) -> Result<Self> {
        Self::with_store(Storage::open(path)?, config)
    }
}

impl<S: KeyValueStore> Workspace<S> {
    /// Wraps an existing store, loading (or creating) the device ID and sync state.
    ///
    /// The store's capacity is replaced by `config.capacity_bytes`.
    pub fn with_store(mut store: S, config: WorkspaceConfig) -> Result<Self> {
        store.set_capacity(config.capacity_bytes);
        let sync = SyncState::load(&mut store)?;
        let codec = RecordCodec::new(sync.device_id());
        log::debug!(
            "opened workspace for {} (last sync {:?})",
            sync.device_id(),
            sync.last_sync_timestamp()
        );
        Ok(Self {
            store,
            codec,
            sync,
            config,
            lecture_clock: 0,
        })
    }

    pub fn device_id(&self) -> &str {
        self.sync.device_id()
    }

    pub fn sync_state(&self) -> &SyncState {
        &self.sync
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// The underlying store, for inspection.
    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Returns the logical value at `key`, migrating a legacy value on first read.
    ///
    /// Sync metadata and reserved keys are returned as stored, never migrated.
    pub fn get_value(&mut self, key: &str) -> Result<Option<Value>> {
        if is_reserved_key(key) || is_sync_metadata_key(key) {
            return Ok(self
                .store
                .get(key)?
                .map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw))));
        }
        self.codec.read(&mut self.store, key)
    }

    /// Reads `key` and decodes it as `T`.
    ///
    /// # Errors
    ///
    /// Returns [`TmsError::Json`] if the stored value does not have the shape of `T`.
    pub fn get_data<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        match self.get_value(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Envelopes and stores `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`TmsError::InvalidInput`] for reserved or sync keys, and
    /// [`TmsError::StorageFull`] if the write does not fit (nothing is persisted).
    pub fn save_value(&mut self, key: &str, value: Value) -> Result<()> {
        ensure_writable_key(key)?;
        self.codec.write(&mut self.store, key, value)?;
        Ok(())
    }

    pub fn save_data<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        self.save_value(key, serde_json::to_value(value)?)
    }

    /// Like [`save_data`](Self::save_data), but on a full store evicts
    /// non-essential keys and retries once.
    pub fn save_data_reclaiming<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        match self.save_value(key, value.clone()) {
            Err(e) if e.is_storage_full() => {
                log::warn!("store full while saving '{key}', evicting non-essential keys");
                self.evict_non_essential()?;
                self.save_value(key, value)
            }
            other => other,
        }
    }

    /// Stores several values in one all-or-nothing batch.
    pub fn save_batch(&mut self, entries: Vec<(String, Value)>) -> Result<()> {
        for (key, _) in &entries {
            ensure_writable_key(key)?;
        }
        self.codec.write_many(&mut self.store, entries)
    }

    /// Removes `key`. Reserved and sync keys cannot be deleted.
    pub fn delete_data(&mut self, key: &str) -> Result<()> {
        ensure_writable_key(key)?;
        self.store.delete(key)
    }

    pub fn contains_key(&self, key: &str) -> Result<bool> {
        Ok(self.store.get(key)?.is_some())
    }

    pub fn list_keys(&self) -> Result<Vec<String>> {
        self.store.list_keys()
    }

    pub fn export_snapshot(&self) -> Result<Snapshot> {
        export::export_snapshot(&self.store, &self.sync)
    }

    /// Applies `snapshot` if it is newer than the last applied one.
    pub fn import_snapshot(&mut self, snapshot: &Snapshot) -> Result<bool> {
        export::import_snapshot(&mut self.store, &mut self.sync, snapshot)
    }

    /// Exports the whole store as backup text.
    pub fn create_data_backup(&self) -> Result<String> {
        export::snapshot_to_json(&self.export_snapshot()?)
    }

    /// Restores backup text, returning whether it was applied.
    ///
    /// Malformed text, a stale snapshot and a failed write all return `false`
    /// and leave the store unchanged.
    pub fn restore_from_backup(&mut self, text: &str) -> bool {
        match export::parse_snapshot(text).and_then(|snapshot| self.import_snapshot(&snapshot)) {
            Ok(applied) => applied,
            Err(e) => {
                log::warn!("backup restore failed: {e}");
                false
            }
        }
    }

    pub fn probe_storage(&mut self) -> StorageHealth {
        health::probe(&mut self.store, &self.config)
    }

    /// Deletes non-essential keys. Only ever runs when called.
    pub fn evict_non_essential(&mut self) -> Result<Vec<String>> {
        health::evict_non_essential(&mut self.store)
    }
}

fn ensure_writable_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(TmsError::InvalidInput("key must not be empty".to_string()));
    }
    if is_reserved_key(key) || is_sync_metadata_key(key) {
        return Err(TmsError::InvalidInput(format!(
            "'{key}' is reserved for sync state"
        )));
    }
    Ok(())
}
