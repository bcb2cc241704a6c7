//! Storage space estimation and explicit eviction of non-essential keys.

use crate::core::keys::{
    is_timetable_key, ADMIN_CREDENTIALS_KEY, COURSES_KEY, FACULTY_KEY, STUDENTS_KEY,
};
use crate::core::storage::KeyValueStore;
use crate::core::sync::{RESERVED_PREFIX, is_sync_metadata_key};
use crate::core::workspace::WorkspaceConfig;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Scratch key written and removed by [`probe`].
pub const PROBE_KEY: &str = "__storage_test__";

/// Keys that hold primary records and are never evicted.
pub const PROTECTED_KEYS: [&str; 4] = [COURSES_KEY, FACULTY_KEY, STUDENTS_KEY, ADMIN_CREDENTIALS_KEY];

/// Result of a storage probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageHealth {
    /// The medium accepted a test write.
    pub capacity_available: bool,
    /// More than the configured threshold remains free.
    pub sufficient_space: bool,
    /// Ceiling minus used characters, floored at zero.
    pub free_bytes_estimate: u64,
}

impl StorageHealth {
    const UNAVAILABLE: Self = Self {
        capacity_available: false,
        sufficient_space: false,
        free_bytes_estimate: 0,
    };
}

/// Confirms the store is writable and estimates the space left under the
/// configured ceiling. Any failure reports the store as unavailable.
pub fn probe<S: KeyValueStore + ?Sized>(store: &mut S, config: &WorkspaceConfig) -> StorageHealth {
    match try_probe(store, config) {
        Ok(health) => health,
        Err(e) => {
            log::warn!("storage probe failed: {e}");
            StorageHealth::UNAVAILABLE
        }
    }
}

fn try_probe<S: KeyValueStore + ?Sized>(store: &mut S, config: &WorkspaceConfig) -> Result<StorageHealth> {
    store.set(PROBE_KEY, PROBE_KEY)?;
    store.delete(PROBE_KEY)?;

    let used = store.used_bytes()?;
    let free = config.storage_ceiling_bytes.saturating_sub(used);
    Ok(StorageHealth {
        capacity_available: true,
        sufficient_space: free > config.low_space_threshold_bytes,
        free_bytes_estimate: free,
    })
}

/// Whether eviction must leave `key` in place.
#[must_use]
pub fn is_protected_key(key: &str) -> bool {
    PROTECTED_KEYS.contains(&key) || is_timetable_key(key) || is_sync_metadata_key(key)
}

/// Deletes every key that is not protected and returns the keys removed.
///
/// Protected keys are the primary records (`courses`, `faculty`, `students`,
/// `adminCredentials`), every timetable, and the sync-state keys.
pub fn evict_non_essential<S: KeyValueStore + ?Sized>(store: &mut S) -> Result<Vec<String>> {
    let victims: Vec<String> = store
        .list_keys()?
        .into_iter()
        .filter(|key| !is_protected_key(key))
        .collect();

    for key in &victims {
        store.delete(key)?;
    }

    if !victims.is_empty() {
        let scratch = victims.iter().filter(|k| k.starts_with(RESERVED_PREFIX)).count();
        log::info!(
            "evicted {} non-essential keys ({scratch} scratch)",
            victims.len()
        );
    }
    Ok(victims)
}
