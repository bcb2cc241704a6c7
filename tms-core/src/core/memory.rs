//! In-process [`KeyValueStore`] for tests and embedders without a database file.

use crate::core::storage::{batch_label, entry_size, KeyValueStore};
use crate::{Result, TmsError};
use std::collections::BTreeMap;

/// A `BTreeMap`-backed store with the same capacity semantics as [`Storage`](crate::Storage).
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    capacity: Option<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the hard capacity enforced on writes. `None` disables the limit.
    #[must_use]
    pub fn with_capacity(mut self, capacity: Option<u64>) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn apply_checked(&mut self, writes: &[(String, String)]) -> Result<()> {
        let Some(capacity) = self.capacity else {
            for (key, value) in writes {
                self.entries.insert(key.clone(), value.clone());
            }
            return Ok(());
        };

        let mut staged = self.entries.clone();
        for (key, value) in writes {
            staged.insert(key.clone(), value.clone());
        }
        let used_after: u64 = staged.iter().map(|(k, v)| entry_size(k, v)).sum();

        if used_after > capacity {
            let used_before = self.used_bytes()?;
            return Err(TmsError::StorageFull {
                key: batch_label(writes),
                needed: writes.iter().map(|(k, v)| entry_size(k, v)).sum(),
                available: capacity.saturating_sub(used_before),
            });
        }

        self.entries = staged;
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.apply_checked(&[(key.to_string(), value.to_string())])
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn list_keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn entries(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn set_many(&mut self, entries: &[(String, String)]) -> Result<()> {
        self.apply_checked(entries)
    }

    fn set_capacity(&mut self, capacity: Option<u64>) {
        self.capacity = capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_behaves_like_a_map() {
        let mut store = MemoryStore::new();
        assert!(store.is_empty());

        store.set("faculty", "[]").unwrap();
        store.set("courses", "[]").unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.list_keys().unwrap(), vec!["courses", "faculty"]);

        store.delete("faculty").unwrap();
        assert_eq!(store.get("faculty").unwrap(), None);
    }

    #[test]
    fn test_capacity_rejects_whole_batch() {
        let mut store = MemoryStore::new().with_capacity(Some(16));
        store.set("a", "1").unwrap();

        let batch = vec![
            ("a".to_string(), "2".to_string()),
            ("b".to_string(), "x".repeat(20)),
        ];
        assert!(store.set_many(&batch).unwrap_err().is_storage_full());
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("b").unwrap(), None);
    }
}
