//! Internal domain modules for the TMS core library.
//!
//! All public types from these modules are re-exported at the crate root
//! with `#[doc(inline)]`; import from there in preference to this module.

pub mod attendance;
pub mod courses;
pub mod device;
pub mod error;
pub mod export;
pub mod faculty;
pub mod health;
pub mod keys;
pub mod memory;
pub mod model;
pub mod record;
pub mod storage;
pub mod sync;
pub mod timetable;
pub mod workspace;

#[doc(inline)]
pub use attendance::AttendanceSummary;
#[doc(inline)]
pub use device::load_or_create_device_id;
#[doc(inline)]
pub use error::{Result, TmsError};
#[doc(inline)]
pub use export::{ImportSummary, Snapshot};
#[doc(inline)]
pub use faculty::demo_faculty;
#[doc(inline)]
pub use health::StorageHealth;
#[doc(inline)]
pub use keys::TimetableKey;
#[doc(inline)]
pub use memory::MemoryStore;
#[doc(inline)]
pub use model::{
    AdminCredentials, Course, CourseYear, CredentialAttempt, Entity, FacultyMember, Lecture,
    NewFacultyMember, NewStudent, Student, Timetable,
};
#[doc(inline)]
pub use record::{RecordCodec, RecordEnvelope};
#[doc(inline)]
pub use storage::{KeyValueStore, Storage};
#[doc(inline)]
pub use sync::SyncState;
#[doc(inline)]
pub use workspace::{GateOutcome, Workspace, WorkspaceConfig};
