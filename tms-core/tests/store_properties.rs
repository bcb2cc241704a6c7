//! End-to-end checks of the store's persistence, migration and sync behaviour
//! through the public API.

use serde_json::json;
use std::collections::HashSet;
use tempfile::NamedTempFile;
use tms_core::{
    decode, CredentialAttempt, Decoded, KeyValueStore, MemoryStore, NewStudent, Storage,
    TimetableKey, Workspace, WorkspaceConfig, DEVICE_ID_KEY,
};

fn memory_workspace() -> Workspace<MemoryStore> {
    Workspace::with_store(MemoryStore::new(), WorkspaceConfig::default()).unwrap()
}

fn admin() -> CredentialAttempt {
    CredentialAttempt::new("Dr. Smith", "Mathematics")
}

#[test]
fn saved_values_survive_reopening_the_file() {
    let temp = NamedTempFile::new().unwrap();
    let value = json!({"a": [1, 2.5, "x", null], "b": {"c": false}});
    {
        let mut ws = Workspace::create(temp.path(), WorkspaceConfig::default()).unwrap();
        ws.save_data("prefs", &value).unwrap();
    }

    let mut ws = Workspace::open(temp.path(), WorkspaceConfig::default()).unwrap();
    assert_eq!(ws.get_value("prefs").unwrap(), Some(value));
}

#[test]
fn legacy_values_are_migrated_exactly_once() {
    let temp = NamedTempFile::new().unwrap();
    {
        let mut storage = Storage::create(temp.path()).unwrap();
        storage.set("courses", r#"[{"id":"bca"}]"#).unwrap();
    }

    let mut ws = Workspace::open(temp.path(), WorkspaceConfig::default()).unwrap();
    let first = ws.get_value("courses").unwrap();
    let raw_after_first = ws.store().get("courses").unwrap().unwrap();
    let second = ws.get_value("courses").unwrap();
    let raw_after_second = ws.store().get("courses").unwrap().unwrap();

    assert_eq!(first, Some(json!([{"id": "bca"}])));
    assert_eq!(first, second);
    assert_eq!(raw_after_first, raw_after_second);
    assert!(matches!(decode(&raw_after_first), Decoded::Envelope(_)));
}

#[test]
fn stale_snapshot_is_rejected_and_newer_one_applied() {
    let mut source = memory_workspace();
    source.save_data("theme", "dark").unwrap();
    let mut older = source.export_snapshot().unwrap();
    older.timestamp = 1_000;
    let mut newer = older.clone();
    newer.timestamp = 2_000;

    let mut target = memory_workspace();
    target.save_data("theme", "light").unwrap();
    assert!(target.import_snapshot(&newer).unwrap());
    assert_eq!(target.get_value("theme").unwrap(), Some(json!("dark")));

    target.save_data("theme", "light").unwrap();
    assert!(!target.import_snapshot(&older).unwrap());
    assert!(!target.import_snapshot(&newer).unwrap());
    assert_eq!(target.get_value("theme").unwrap(), Some(json!("light")));
    assert_eq!(target.sync_state().last_sync_timestamp(), Some(2_000));
}

#[test]
fn import_failing_on_quota_changes_nothing() {
    let mut source = memory_workspace();
    source.save_data("courses", &vec!["c".repeat(100); 20]).unwrap();
    let snapshot = source.export_snapshot().unwrap();

    let config = WorkspaceConfig {
        capacity_bytes: Some(600),
        ..WorkspaceConfig::default()
    };
    let store = MemoryStore::new();
    let mut target = Workspace::with_store(store, config).unwrap();
    target.save_data("theme", "light").unwrap();
    let before = target.store().entries().unwrap();

    let err = target.import_snapshot(&snapshot).unwrap_err();
    assert!(err.is_storage_full());
    assert_eq!(target.store().entries().unwrap(), before);
    assert!(target.sync_state().accepts(snapshot.timestamp));
}

#[test]
fn device_id_survives_import_and_eviction() {
    let mut source = memory_workspace();
    source.save_data("cache", "x").unwrap();
    let backup = source.create_data_backup().unwrap();

    let mut target = memory_workspace();
    let device = target.device_id().to_string();
    assert!(target.restore_from_backup(&backup));
    target.evict_non_essential().unwrap();

    assert_eq!(target.device_id(), device);
    assert_eq!(target.store().get(DEVICE_ID_KEY).unwrap(), Some(device));
    assert!(!target.contains_key("cache").unwrap());
}

#[test]
fn division_split_and_merge_migrate_timetable_keys() {
    let mut ws = memory_workspace();
    ws.faculty().unwrap();
    ws.add_course(&admin(), "C", 1).unwrap();
    let single = TimetableKey::new("c", 1, None);
    let lecture = ws
        .add_lecture(&single, "Monday", "Maths", "9:00", "Dr. Smith")
        .unwrap();
    let before = ws.get_value("timetable_c_year1").unwrap();

    ws.split_division(&admin(), "c", 1).unwrap();
    assert_eq!(ws.get_value("timetable_c_year1_Division A").unwrap(), before);
    let division_b = ws.timetable(&TimetableKey::new("c", 1, Some("Division B"))).unwrap();
    assert_eq!(division_b.lecture_count(), 0);
    assert_eq!(division_b.days.len(), 6);
    assert!(!ws.contains_key("timetable_c_year1").unwrap());

    ws.merge_divisions(&admin(), "c", 1).unwrap();
    let merged = ws.timetable(&single).unwrap();
    assert_eq!(merged.lectures("Monday"), [lecture]);
    assert!(!ws.contains_key("timetable_c_year1_Division A").unwrap());
    assert!(!ws.contains_key("timetable_c_year1_Division B").unwrap());
}

#[test]
fn eviction_keeps_primary_records_and_timetables() {
    let mut ws = memory_workspace();
    ws.faculty().unwrap();
    ws.add_course(&admin(), "BCA", 3).unwrap();
    ws.save_data("students", &json!([])).unwrap();
    for i in 0..10 {
        ws.save_data(&format!("draft_{i}"), &i).unwrap();
    }
    ws.save_data("theme", "dark").unwrap();
    let protected = [
        "courses",
        "faculty",
        "students",
        "adminCredentials",
        "timetable_bca_year1",
        "timetable_bca_year2",
        "timetable_bca_year3",
    ];
    let before: Vec<_> = protected.iter().map(|k| ws.get_value(k).unwrap()).collect();

    let evicted = ws.evict_non_essential().unwrap();

    assert_eq!(evicted.len(), 11);
    let after: Vec<_> = protected.iter().map(|k| ws.get_value(k).unwrap()).collect();
    assert_eq!(before, after);
}

#[test]
fn attendance_keys_are_unique_per_lecture() {
    let mut ws = memory_workspace();
    let key = TimetableKey::new("bca", 1, None);
    let ids: Vec<String> = (0..3)
        .map(|_| ws.add_lecture(&key, "Monday", "Maths", "9:00", "Dr. Smith").unwrap().id)
        .collect();
    let student = ws
        .add_student(NewStudent {
            roll_no: "7".to_string(),
            name: "Asha".to_string(),
            prn_number: "P7".to_string(),
            course: "bca".to_string(),
            year: 1,
            division: "Division A".to_string(),
        })
        .unwrap();

    for id in &ids {
        ws.mark_attendance(&student.id, "Monday", id, true).unwrap();
    }
    ws.mark_attendance(&student.id, "Monday", &ids[0], false).unwrap();

    let attendance = ws.students().unwrap().remove(0).attendance;
    let distinct: HashSet<_> = attendance.keys().collect();
    assert_eq!(distinct.len(), 3);
    assert_eq!(attendance.get(&format!("Monday_{}", ids[0])), Some(&false));
    assert_eq!(ws.attendance_summary(&student.id).unwrap().present, 2);
}
