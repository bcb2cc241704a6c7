//! Stable per-store device identity.

use crate::core::storage::KeyValueStore;
use crate::core::sync::DEVICE_ID_KEY;
use crate::Result;
use uuid::Uuid;

/// Returns the device identifier stored under `device_id`, creating and
/// persisting a new one on first use.
///
/// Identifiers look like `device_<32 hex digits>`. Once written the same
/// identifier is returned for the lifetime of the store.
///
/// # Errors
///
/// Returns [`crate::TmsError::StorageFull`] or [`crate::TmsError::Database`]
/// if a freshly generated identifier cannot be persisted.
pub fn load_or_create_device_id<S: KeyValueStore + ?Sized>(store: &mut S) -> Result<String> {
    if let Some(existing) = store.get(DEVICE_ID_KEY)? {
        let existing = existing.trim();
        if !existing.is_empty() {
            return Ok(existing.to_string());
        }
    }

    let device_id = format!("device_{}", Uuid::new_v4().simple());
    store.set(DEVICE_ID_KEY, &device_id)?;
    log::info!("generated new device id {device_id}");
    Ok(device_id)
}
