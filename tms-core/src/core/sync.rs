//! Reserved keys and the per-device synchronisation state.

use crate::core::device::load_or_create_device_id;
use crate::core::storage::KeyValueStore;
use crate::Result;
use serde::Serialize;

/// Key holding this device's identifier. Never exported or imported.
pub const DEVICE_ID_KEY: &str = "device_id";
/// Key holding the timestamp of the last applied snapshot, as decimal text.
pub const LAST_SYNC_TIMESTAMP_KEY: &str = "last_sync_timestamp";
/// Key holding the device ID the last applied snapshot came from.
pub const LAST_SYNC_DEVICE_KEY: &str = "last_sync_device";
/// Keys with this prefix are internal scratch space (e.g. the health probe).
pub const RESERVED_PREFIX: &str = "__";

/// Returns `true` for keys that snapshots never carry.
#[must_use]
pub fn is_reserved_key(key: &str) -> bool {
    key == DEVICE_ID_KEY || key.starts_with(RESERVED_PREFIX)
}

/// Returns `true` for keys whose values are stored raw, never enveloped.
#[must_use]
pub fn is_sync_metadata_key(key: &str) -> bool {
    matches!(
        key,
        DEVICE_ID_KEY | LAST_SYNC_TIMESTAMP_KEY | LAST_SYNC_DEVICE_KEY
    )
}

/// Device identity plus the high-water mark of applied snapshots.
///
/// Loaded once per workspace and passed by reference to export and import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncState {
    device_id: String,
    last_sync_timestamp: Option<i64>,
    last_sync_device: Option<String>,
}

impl SyncState {
    /// Reads the sync keys from `store`, generating a device ID if none exists.
    pub fn load<S: KeyValueStore + ?Sized>(store: &mut S) -> Result<Self> {
        let device_id = load_or_create_device_id(store)?;

        let last_sync_timestamp = match store.get(LAST_SYNC_TIMESTAMP_KEY)? {
            Some(raw) => {
                let parsed = parse_timestamp(&raw);
                if parsed.is_none() {
                    log::warn!("ignoring unreadable {LAST_SYNC_TIMESTAMP_KEY} value {raw:?}");
                }
                parsed
            }
            None => None,
        };
        let last_sync_device = store.get(LAST_SYNC_DEVICE_KEY)?;

        Ok(Self {
            device_id,
            last_sync_timestamp,
            last_sync_device,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn last_sync_timestamp(&self) -> Option<i64> {
        self.last_sync_timestamp
    }

    pub fn last_sync_device(&self) -> Option<&str> {
        self.last_sync_device.as_deref()
    }

    /// Whether a snapshot taken at `timestamp` is newer than the last one applied.
    #[must_use]
    pub fn accepts(&self, timestamp: i64) -> bool {
        match self.last_sync_timestamp {
            Some(local) => local < timestamp,
            None => true,
        }
    }

    /// The raw writes that record a sync from `device` at `timestamp`.
    pub(crate) fn entries_for(timestamp: i64, device: &str) -> [(String, String); 2] {
        [
            (LAST_SYNC_TIMESTAMP_KEY.to_string(), timestamp.to_string()),
            (LAST_SYNC_DEVICE_KEY.to_string(), device.to_string()),
        ]
    }

    /// Updates the in-memory copy after [`entries_for`](Self::entries_for) was persisted.
    pub(crate) fn mark_synced(&mut self, timestamp: i64, device: &str) {
        self.last_sync_timestamp = Some(timestamp);
        self.last_sync_device = Some(device.to_string());
    }
}

/// Parses a stored timestamp, tolerating the `1.7e12`-style text some writers produce.
fn parse_timestamp(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    raw.parse::<i64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite() && f.fract() == 0.0)
            .map(|f| f as i64)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    #[test]
    fn test_reserved_keys() {
        assert!(is_reserved_key("device_id"));
        assert!(is_reserved_key("__storage_test__"));
        assert!(!is_reserved_key("last_sync_timestamp"));
        assert!(!is_reserved_key("courses"));
        assert!(!is_reserved_key("_single_underscore"));
    }

    #[test]
    fn test_fresh_store_has_no_sync_history() {
        let mut store = MemoryStore::new();
        let state = SyncState::load(&mut store).unwrap();

        assert!(state.device_id().starts_with("device_"));
        assert_eq!(state.last_sync_timestamp(), None);
        assert_eq!(state.last_sync_device(), None);
        assert!(state.accepts(0));
    }

    #[test]
    fn test_load_reads_existing_values() {
        let mut store = MemoryStore::new();
        store.set(DEVICE_ID_KEY, "device_a").unwrap();
        store.set(LAST_SYNC_TIMESTAMP_KEY, "1700000000000").unwrap();
        store.set(LAST_SYNC_DEVICE_KEY, "device_b").unwrap();

        let state = SyncState::load(&mut store).unwrap();
        assert_eq!(state.device_id(), "device_a");
        assert_eq!(state.last_sync_timestamp(), Some(1_700_000_000_000));
        assert_eq!(state.last_sync_device(), Some("device_b"));
    }

    #[test]
    fn test_accepts_only_strictly_newer() {
        let mut store = MemoryStore::new();
        store.set(LAST_SYNC_TIMESTAMP_KEY, "100").unwrap();
        let state = SyncState::load(&mut store).unwrap();

        assert!(!state.accepts(99));
        assert!(!state.accepts(100));
        assert!(state.accepts(101));
    }

    #[test]
    fn test_unreadable_timestamp_is_treated_as_absent() {
        let mut store = MemoryStore::new();
        store.set(LAST_SYNC_TIMESTAMP_KEY, "yesterday").unwrap();
        let state = SyncState::load(&mut store).unwrap();
        assert_eq!(state.last_sync_timestamp(), None);
    }

    #[test]
    fn test_parse_timestamp_accepts_float_text() {
        assert_eq!(parse_timestamp("1.7e12"), Some(1_700_000_000_000));
        assert_eq!(parse_timestamp(" 42 "), Some(42));
        assert_eq!(parse_timestamp("4.5"), None);
    }
}
