//! Error types for the TMS core library.

use thiserror::Error;

/// All errors that can occur within the TMS core library.
#[derive(Debug, Error)]
pub enum TmsError {
    /// A SQLite operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// A stored or imported value could not be (de)serialized as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O operation on the filesystem failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A write was refused because it would exceed the store's capacity.
    ///
    /// Nothing was persisted. Callers may run an eviction pass and retry once.
    #[error("Storage full: writing '{key}' needs {needed} bytes but only {available} remain")]
    StorageFull {
        key: String,
        needed: u64,
        available: u64,
    },

    /// Backup text failed to parse or lacks the required fields.
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// A course ID was requested that is not in the `courses` list.
    #[error("Course not found: {0}")]
    CourseNotFound(String),

    /// The course exists but has no such year.
    #[error("Course '{course_id}' has no year {year}")]
    YearNotFound { course_id: String, year: u32 },

    /// A student ID was requested that is not in the `students` list.
    #[error("Student not found: {0}")]
    StudentNotFound(String),

    /// No lecture with this ID is scheduled on the given day.
    #[error("Lecture '{lecture_id}' not found on {day}")]
    LectureNotFound { day: String, lecture_id: String },

    /// A faculty ID was requested that is not in the `faculty` list.
    #[error("Faculty member not found: {0}")]
    FacultyNotFound(u32),

    /// Caller-supplied data was rejected before touching storage.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Convenience alias that pins the error type to [`TmsError`].
pub type Result<T> = std::result::Result<T, TmsError>;

impl TmsError {
    /// Returns `true` when the error means a write did not fit in the store.
    #[must_use]
    pub fn is_storage_full(&self) -> bool {
        matches!(self, Self::StorageFull { .. })
    }

    /// Returns a short, human-readable message suitable for display to the end user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Database(e) => format!("Failed to save: {e}"),
            Self::Json(e) => format!("Data format error: {e}"),
            Self::Io(e) => format!("File error: {e}"),
            Self::StorageFull { .. } => {
                "Storage is full. Free up space and try again".to_string()
            }
            Self::InvalidSnapshot(_) => "Failed to import data. Please check the backup and try again".to_string(),
            Self::CourseNotFound(id) => format!("Unknown course: {id}"),
            Self::YearNotFound { course_id, year } => {
                format!("Course {course_id} has no year {year}")
            }
            Self::StudentNotFound(_) => "Student no longer exists".to_string(),
            Self::LectureNotFound { .. } => "Lecture no longer exists".to_string(),
            Self::FacultyNotFound(_) => "Faculty member no longer exists".to_string(),
            Self::InvalidInput(msg) => msg.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_full_is_detected() {
        let e = TmsError::StorageFull {
            key: "courses".to_string(),
            needed: 10,
            available: 2,
        };
        assert!(e.is_storage_full());
        assert!(e.to_string().contains("courses"));
        assert!(e.user_message().contains("full"));
    }

    #[test]
    fn test_invalid_snapshot_has_generic_user_message() {
        let e = TmsError::InvalidSnapshot("missing timestamp".to_string());
        assert!(!e.is_storage_full());
        assert!(!e.user_message().contains("timestamp"));
    }
}
