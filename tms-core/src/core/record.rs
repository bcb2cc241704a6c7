//! Timestamped record envelopes and migration of legacy un-enveloped values.

use crate::core::storage::KeyValueStore;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Envelope version written by [`RecordCodec::wrap`].
pub const ENVELOPE_VERSION: u32 = 1;
/// Version reported for values stored before envelopes existed.
pub const LEGACY_VERSION: u32 = 0;

const UNKNOWN_DEVICE: &str = "unknown";

/// The `{ data, timestamp, deviceId, version }` wrapper around a stored value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordEnvelope {
    pub data: Value,
    /// Epoch milliseconds of the write.
    pub timestamp: i64,
    #[serde(default = "unknown_device")]
    pub device_id: String,
    #[serde(default = "envelope_version")]
    pub version: u32,
}

fn unknown_device() -> String {
    UNKNOWN_DEVICE.to_string()
}

fn envelope_version() -> u32 {
    ENVELOPE_VERSION
}

/// A raw stored value classified by format.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Envelope(RecordEnvelope),
    /// A value written without an envelope: parsed JSON, or the raw text as a
    /// JSON string when it is not valid JSON.
    Legacy(Value),
}

impl Decoded {
    #[must_use]
    pub fn version(&self) -> u32 {
        match self {
            Self::Envelope(envelope) => envelope.version,
            Self::Legacy(_) => LEGACY_VERSION,
        }
    }

    #[must_use]
    pub fn into_data(self) -> Value {
        match self {
            Self::Envelope(envelope) => envelope.data,
            Self::Legacy(value) => value,
        }
    }
}

/// Classifies `raw`. It is an envelope iff it is a JSON object with a `data`
/// field and an integer `timestamp` field.
#[must_use]
pub fn decode(raw: &str) -> Decoded {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(_) => return Decoded::Legacy(Value::String(raw.to_string())),
    };

    let looks_enveloped = value.get("data").is_some()
        && value.get("timestamp").is_some_and(Value::is_i64);
    if looks_enveloped {
        if let Ok(envelope) = RecordEnvelope::deserialize(&value) {
            return Decoded::Envelope(envelope);
        }
    }
    Decoded::Legacy(value)
}

/// Wraps values in envelopes on write and unwraps (migrating legacy values) on read.
///
/// Timestamps issued by one codec strictly increase, and a write never stamps
/// a key with a timestamp at or below the one this device stored there last.
#[derive(Debug, Clone)]
pub struct RecordCodec {
    device_id: String,
    last_issued: i64,
}

impl RecordCodec {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            last_issued: 0,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Envelopes `data` with the current time and this device's identifier.
    pub fn wrap(&mut self, data: Value) -> RecordEnvelope {
        let timestamp = self.next_timestamp(None);
        self.envelope(data, timestamp)
    }

    /// Reads `key`, returning the logical value.
    ///
    /// A legacy value is re-persisted in envelope form before being returned,
    /// so storage format is converted exactly once. If that write fails the
    /// value is still returned and the migration is retried on the next read.
    pub fn read<S: KeyValueStore + ?Sized>(&mut self, store: &mut S, key: &str) -> Result<Option<Value>> {
        let Some(raw) = store.get(key)? else {
            return Ok(None);
        };

        match decode(&raw) {
            Decoded::Envelope(envelope) => Ok(Some(envelope.data)),
            Decoded::Legacy(value) => {
                let envelope = self.wrap(value);
                match serde_json::to_string(&envelope) {
                    Ok(text) => match store.set(key, &text) {
                        Ok(()) => log::debug!("migrated legacy record '{key}' to envelope v{ENVELOPE_VERSION}"),
                        Err(e) => log::warn!("could not migrate legacy record '{key}': {e}"),
                    },
                    Err(e) => log::warn!("could not encode migrated record '{key}': {e}"),
                }
                Ok(Some(envelope.data))
            }
        }
    }

    /// Envelopes `data` and stores it under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::TmsError::StorageFull`] if the store refuses the write;
    /// the previous value is kept.
    pub fn write<S: KeyValueStore + ?Sized>(
        &mut self,
        store: &mut S,
        key: &str,
        data: Value,
    ) -> Result<RecordEnvelope> {
        let floor = self.own_timestamp(store, key)?;
        let timestamp = self.next_timestamp(floor);
        let envelope = self.envelope(data, timestamp);
        store.set(key, &serde_json::to_string(&envelope)?)?;
        Ok(envelope)
    }

    /// Envelopes every value and stores them in one all-or-nothing batch.
    pub fn write_many<S: KeyValueStore + ?Sized>(
        &mut self,
        store: &mut S,
        entries: Vec<(String, Value)>,
    ) -> Result<()> {
        let mut writes = Vec::with_capacity(entries.len());
        for (key, data) in entries {
            let floor = self.own_timestamp(store, &key)?;
            let timestamp = self.next_timestamp(floor);
            let envelope = self.envelope(data, timestamp);
            writes.push((key, serde_json::to_string(&envelope)?));
        }
        store.set_many(&writes)
    }

    /// Timestamp of the envelope this device last stored under `key`, if any.
    fn own_timestamp<S: KeyValueStore + ?Sized>(&self, store: &S, key: &str) -> Result<Option<i64>> {
        Ok(match store.get(key)?.map(|raw| decode(&raw)) {
            Some(Decoded::Envelope(previous)) if previous.device_id == self.device_id => {
                Some(previous.timestamp)
            }
            _ => None,
        })
    }

    fn envelope(&self, data: Value, timestamp: i64) -> RecordEnvelope {
        RecordEnvelope {
            data,
            timestamp,
            device_id: self.device_id.clone(),
            version: ENVELOPE_VERSION,
        }
    }

    fn next_timestamp(&mut self, floor: Option<i64>) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut timestamp = now.max(self.last_issued + 1);
        if let Some(floor) = floor {
            timestamp = timestamp.max(floor + 1);
        }
        self.last_issued = timestamp;
        timestamp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use serde_json::json;

    #[test]
    fn test_wrap_sets_envelope_fields() {
        let mut codec = RecordCodec::new("device_x");
        let envelope = codec.wrap(json!({"a": 1}));

        assert_eq!(envelope.data, json!({"a": 1}));
        assert_eq!(envelope.device_id, "device_x");
        assert_eq!(envelope.version, ENVELOPE_VERSION);
        assert!(envelope.timestamp > 0);
    }

    #[test]
    fn test_envelope_serializes_camel_case() {
        let mut codec = RecordCodec::new("device_x");
        let text = serde_json::to_string(&codec.wrap(json!(null))).unwrap();
        assert!(text.contains("\"deviceId\":\"device_x\""));
        assert!(text.contains("\"version\":1"));
    }

    #[test]
    fn test_decode_envelope() {
        let decoded = decode(r#"{"data":[1,2],"timestamp":5,"deviceId":"d","version":1}"#);
        assert_eq!(decoded.version(), 1);
        assert_eq!(decoded.into_data(), json!([1, 2]));
    }

    #[test]
    fn test_decode_envelope_without_device_or_version() {
        match decode(r#"{"data":{"k":true},"timestamp":5}"#) {
            Decoded::Envelope(envelope) => {
                assert_eq!(envelope.device_id, "unknown");
                assert_eq!(envelope.version, ENVELOPE_VERSION);
            }
            other => panic!("expected envelope, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_legacy_shapes() {
        assert_eq!(decode("[1,2,3]"), Decoded::Legacy(json!([1, 2, 3])));
        assert_eq!(decode("dark"), Decoded::Legacy(json!("dark")));
        assert_eq!(
            decode(r#"{"data":1}"#),
            Decoded::Legacy(json!({"data": 1})),
            "missing timestamp is not an envelope"
        );
        assert_eq!(
            decode(r#"{"data":1,"timestamp":"soon"}"#).version(),
            LEGACY_VERSION
        );
    }

    #[test]
    fn test_write_then_read_round_trips() {
        let mut store = MemoryStore::new();
        let mut codec = RecordCodec::new("device_x");
        let value = json!({"courses": [{"id": "bca", "years": [1, 2, 3]}]});

        codec.write(&mut store, "courses", value.clone()).unwrap();
        assert_eq!(codec.read(&mut store, "courses").unwrap(), Some(value));
    }

    #[test]
    fn test_read_absent_key() {
        let mut store = MemoryStore::new();
        let mut codec = RecordCodec::new("device_x");
        assert_eq!(codec.read(&mut store, "nothing").unwrap(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_legacy_read_migrates_exactly_once() {
        let mut store = MemoryStore::new();
        store.set("faculty", r#"[{"id":1,"name":"Dr. Smith"}]"#).unwrap();
        let mut codec = RecordCodec::new("device_x");

        let first = codec.read(&mut store, "faculty").unwrap();
        assert_eq!(first, Some(json!([{"id": 1, "name": "Dr. Smith"}])));

        let migrated = store.get("faculty").unwrap().unwrap();
        assert!(matches!(decode(&migrated), Decoded::Envelope(_)));

        let second = codec.read(&mut store, "faculty").unwrap();
        assert_eq!(second, first);
        assert_eq!(store.get("faculty").unwrap().unwrap(), migrated);
    }

    #[test]
    fn test_legacy_plain_text_is_read_as_string() {
        let mut store = MemoryStore::new();
        store.set("theme", "dark").unwrap();
        let mut codec = RecordCodec::new("device_x");

        assert_eq!(codec.read(&mut store, "theme").unwrap(), Some(json!("dark")));
        assert_eq!(codec.read(&mut store, "theme").unwrap(), Some(json!("dark")));
    }

    #[test]
    fn test_failed_migration_still_returns_value() {
        let mut store = MemoryStore::new().with_capacity(Some(12));
        store.set("courses", "[1]").unwrap();
        let mut codec = RecordCodec::new("device_x");

        assert_eq!(codec.read(&mut store, "courses").unwrap(), Some(json!([1])));
        assert_eq!(store.get("courses").unwrap().as_deref(), Some("[1]"));
    }

    #[test]
    fn test_timestamps_strictly_increase_per_key() {
        let mut store = MemoryStore::new();
        let mut codec = RecordCodec::new("device_x");

        let mut previous = 0;
        for i in 0..50 {
            let envelope = codec.write(&mut store, "students", json!(i)).unwrap();
            assert!(envelope.timestamp > previous);
            previous = envelope.timestamp;
        }
    }

    #[test]
    fn test_write_many_is_all_or_nothing() {
        let mut store = MemoryStore::new().with_capacity(Some(200));
        let mut codec = RecordCodec::new("device_x");

        let err = codec
            .write_many(
                &mut store,
                vec![
                    ("courses".to_string(), json!([])),
                    ("students".to_string(), json!("x".repeat(300))),
                ],
            )
            .unwrap_err();
        assert!(err.is_storage_full());
        assert!(store.is_empty());

        codec
            .write_many(
                &mut store,
                vec![("courses".to_string(), json!([])), ("faculty".to_string(), json!([]))],
            )
            .unwrap();
        assert_eq!(codec.read(&mut store, "faculty").unwrap(), Some(json!([])));
    }

    #[test]
    fn test_stored_future_timestamp_from_same_device_is_exceeded() {
        let mut store = MemoryStore::new();
        let future = chrono::Utc::now().timestamp_millis() + 60_000;
        store
            .set(
                "courses",
                &json!({"data": [], "timestamp": future, "deviceId": "device_x", "version": 1})
                    .to_string(),
            )
            .unwrap();

        let mut codec = RecordCodec::new("device_x");
        let envelope = codec.write(&mut store, "courses", json!([1])).unwrap();
        assert!(envelope.timestamp > future);
    }
}
