//! Core library for TMS, a timetable management tool for small colleges.
//!
//! All state lives in a single string key-value store. The primary entry
//! point is [`Workspace`], which wraps a store (SQLite-backed [`Storage`] or
//! the in-memory [`MemoryStore`]) and provides enveloped reads and writes,
//! whole-store snapshots for backup and sync, storage health checks, and the
//! course, faculty, timetable and attendance records built on top of them.
//!
//! Types are re-exported from their respective sub-modules for convenience;
//! consumers should import from the crate root rather than the `core` module.

pub mod core;

// Re-export commonly used types.
#[doc(inline)]
pub use crate::core::{
    attendance::AttendanceSummary,
    device::load_or_create_device_id,
    error::{Result, TmsError},
    export::{
        apply_snapshot, backup_file_name, export_snapshot, import_snapshot, parse_snapshot,
        read_backup_file, snapshot_to_json, write_backup_file, ImportSummary, Snapshot,
        BACKUP_FILE_PREFIX,
    },
    faculty::demo_faculty,
    health::{evict_non_essential, is_protected_key, probe, StorageHealth, PROBE_KEY},
    keys::{
        attendance_key, is_division_qualified, is_timetable_key, parse_timetable_key,
        timetable_key, timetable_keys_for, TimetableKey,
    },
    memory::MemoryStore,
    model::{
        course_slug, AdminCredentials, Course, CourseYear, CredentialAttempt, Entity,
        FacultyMember, Lecture, NewFacultyMember, NewStudent, Student, Timetable, DAYS,
        DIVISION_A, DIVISION_B,
    },
    record::{decode, Decoded, RecordCodec, RecordEnvelope},
    storage::{KeyValueStore, Storage},
    sync::{is_reserved_key, SyncState, DEVICE_ID_KEY},
    workspace::{GateOutcome, Workspace, WorkspaceConfig},
};
