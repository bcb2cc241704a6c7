//! Whole-store snapshot export and import, used for backup and cross-device sync.
//!
//! A [`Snapshot`] is a copy of every non-reserved key taken from one
//! enumeration of the store. Import is last-writer-wins at snapshot
//! granularity: a snapshot no newer than the last one applied is rejected,
//! otherwise every key it carries overwrites the local value wholesale.
//! Concurrent edits made on two devices since their last sync therefore lose
//! one side.

use crate::core::storage::KeyValueStore;
use crate::core::sync::{is_reserved_key, is_sync_metadata_key, SyncState};
use crate::{Result, TmsError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Prefix of backup file names; the ISO date and `.json` follow.
pub const BACKUP_FILE_PREFIX: &str = "tms-backup-";

/// Portable copy of the store: `{ timestamp, deviceId, data }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Epoch milliseconds when the snapshot was taken.
    pub timestamp: i64,
    /// Device the snapshot was exported from.
    #[serde(default = "unknown_device")]
    pub device_id: String,
    /// Stored value per key, JSON-decoded where possible.
    pub data: BTreeMap<String, Value>,
}

fn unknown_device() -> String {
    "unknown".to_string()
}

/// Counts reported after a snapshot is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub written: usize,
    pub skipped_reserved: usize,
}

/// Copies every non-reserved key of `store` into a new [`Snapshot`].
///
/// Values that are not valid JSON are carried as JSON strings.
pub fn export_snapshot<S: KeyValueStore + ?Sized>(store: &S, sync: &SyncState) -> Result<Snapshot> {
    let data: BTreeMap<String, Value> = store
        .entries()?
        .into_iter()
        .filter(|(key, _)| !is_reserved_key(key))
        .map(|(key, raw)| {
            let value = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
            (key, value)
        })
        .collect();

    let snapshot = Snapshot {
        timestamp: Utc::now().timestamp_millis(),
        device_id: sync.device_id().to_string(),
        data,
    };
    log::info!(
        "exported snapshot of {} keys from {}",
        snapshot.data.len(),
        snapshot.device_id
    );
    Ok(snapshot)
}

/// Applies `snapshot` to `store` if it is newer than the last applied snapshot.
///
/// Returns `Ok(None)` when the snapshot is stale; the store is untouched.
/// Otherwise all keys and the new sync high-water mark are written in one
/// all-or-nothing batch.
///
/// # Errors
///
/// Returns [`TmsError::InvalidSnapshot`] for a non-positive timestamp and
/// [`TmsError::StorageFull`] if the batch does not fit; in both cases nothing
/// is written.
pub fn apply_snapshot<S: KeyValueStore + ?Sized>(
    store: &mut S,
    sync: &mut SyncState,
    snapshot: &Snapshot,
) -> Result<Option<ImportSummary>> {
    if snapshot.timestamp <= 0 {
        return Err(TmsError::InvalidSnapshot(format!(
            "timestamp must be positive, got {}",
            snapshot.timestamp
        )));
    }

    if !sync.accepts(snapshot.timestamp) {
        log::info!(
            "rejecting stale snapshot from {} at {} (last sync {:?})",
            snapshot.device_id,
            snapshot.timestamp,
            sync.last_sync_timestamp()
        );
        return Ok(None);
    }

    let mut writes = Vec::with_capacity(snapshot.data.len() + 2);
    let mut skipped_reserved = 0;
    for (key, value) in &snapshot.data {
        if is_reserved_key(key) || is_sync_metadata_key(key) {
            skipped_reserved += 1;
            continue;
        }
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        writes.push((key.clone(), text));
    }
    let written = writes.len();
    writes.extend(SyncState::entries_for(snapshot.timestamp, &snapshot.device_id));

    store.set_many(&writes)?;
    sync.mark_synced(snapshot.timestamp, &snapshot.device_id);

    log::info!(
        "applied snapshot from {} at {}: {written} keys written, {skipped_reserved} reserved skipped",
        snapshot.device_id,
        snapshot.timestamp
    );
    Ok(Some(ImportSummary {
        written,
        skipped_reserved,
    }))
}

/// Applies `snapshot`, returning `true` if it was newer and has been written.
pub fn import_snapshot<S: KeyValueStore + ?Sized>(
    store: &mut S,
    sync: &mut SyncState,
    snapshot: &Snapshot,
) -> Result<bool> {
    Ok(apply_snapshot(store, sync, snapshot)?.is_some())
}

/// Parses backup text, requiring a positive integer `timestamp` and an object `data`.
///
/// # Errors
///
/// Returns [`TmsError::InvalidSnapshot`] describing the first problem found.
pub fn parse_snapshot(text: &str) -> Result<Snapshot> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| TmsError::InvalidSnapshot(format!("not valid JSON: {e}")))?;
    let Value::Object(mut root) = value else {
        return Err(TmsError::InvalidSnapshot("expected a JSON object".to_string()));
    };

    let timestamp = root
        .get("timestamp")
        .and_then(integral_timestamp)
        .filter(|t| *t > 0)
        .ok_or_else(|| TmsError::InvalidSnapshot("missing timestamp".to_string()))?;

    let data = match root.remove("data") {
        Some(Value::Object(map)) => map.into_iter().collect(),
        Some(_) => return Err(TmsError::InvalidSnapshot("data must be an object".to_string())),
        None => return Err(TmsError::InvalidSnapshot("missing data".to_string())),
    };

    let device_id = root
        .get("deviceId")
        .and_then(Value::as_str)
        .map_or_else(unknown_device, str::to_string);

    Ok(Snapshot {
        timestamp,
        device_id,
        data,
    })
}

fn integral_timestamp(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

/// Serialises `snapshot` as the single-line backup text.
pub fn snapshot_to_json(snapshot: &Snapshot) -> Result<String> {
    Ok(serde_json::to_string(snapshot)?)
}

/// Returns `tms-backup-YYYY-MM-DD.json`.
#[must_use]
pub fn backup_file_name(date: NaiveDate) -> String {
    format!("{BACKUP_FILE_PREFIX}{}.json", date.format("%Y-%m-%d"))
}

/// Writes `snapshot` into `dir`, naming the file after the snapshot's UTC date.
///
/// Returns the path written.
pub fn write_backup_file(dir: &Path, snapshot: &Snapshot) -> Result<PathBuf> {
    let date = DateTime::<Utc>::from_timestamp_millis(snapshot.timestamp)
        .unwrap_or_else(Utc::now)
        .date_naive();
    std::fs::create_dir_all(dir)?;
    let path = dir.join(backup_file_name(date));
    std::fs::write(&path, snapshot_to_json(snapshot)?)?;
    Ok(path)
}

/// Reads and validates a backup file written by [`write_backup_file`].
pub fn read_backup_file(path: &Path) -> Result<Snapshot> {
    let text = std::fs::read_to_string(path)?;
    parse_snapshot(&text)
}
