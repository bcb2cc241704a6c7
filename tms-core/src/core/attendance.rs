//! Student enrolment and per-lecture attendance.
//!
//! Attendance is stored inside each student record, keyed by
//! [`attendance_key`], so marking attendance rewrites the whole `students`
//! list in one save.

use crate::core::keys::{attendance_key, STUDENTS_KEY};
use crate::core::model::{Entity, NewStudent, Student};
use crate::{KeyValueStore, Result, TmsError, Workspace};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const STUDENT_ID_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Attendance totals for one student.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceSummary {
    /// `present / total * 100`, or 0 when nothing is recorded.
    pub percentage: f64,
    pub present: usize,
    pub total: usize,
}

impl AttendanceSummary {
    pub fn from_attendance(attendance: &BTreeMap<String, bool>) -> Self {
        let total = attendance.len();
        if total == 0 {
            return Self {
                percentage: 0.0,
                present: 0,
                total: 0,
            };
        }
        let present = attendance.values().filter(|p| **p).count();
        Self {
            percentage: present as f64 / total as f64 * 100.0,
            present,
            total,
        }
    }
}

/// A random nine-character base-36 ID.
fn new_student_id() -> String {
    let mut rng = rand::rng();
    (0..STUDENT_ID_LEN)
        .map(|_| char::from(BASE36[rng.random_range(0..BASE36.len())]))
        .collect()
}

impl<S: KeyValueStore> Workspace<S> {
    pub fn students(&mut self) -> Result<Vec<Student>> {
        Ok(self
            .student_records()?
            .into_iter()
            .filter_map(|entry| match entry {
                Entity::Known(student) => Some(student),
                Entity::Unknown(_) => None,
            })
            .collect())
    }

    /// Enrols a student with a fresh ID and no attendance.
    pub fn add_student(&mut self, new: NewStudent) -> Result<Student> {
        if new.name.trim().is_empty() {
            return Err(TmsError::InvalidInput("student name must not be empty".to_string()));
        }

        let mut records = self.student_records()?;
        let mut id = new_student_id();
        while records.iter().any(|e| e.known().is_some_and(|s| s.id == id)) {
            id = new_student_id();
        }
        let student = Student {
            id,
            roll_no: new.roll_no,
            name: new.name,
            prn_number: new.prn_number,
            course: new.course,
            year: new.year,
            division: new.division,
            attendance: BTreeMap::new(),
        };
        records.push(Entity::Known(student.clone()));
        self.save_data(STUDENTS_KEY, &records)?;
        log::info!("enrolled student {} in {} year {}", student.id, student.course, student.year);
        Ok(student)
    }

    /// Students of one course year and division, sorted by name.
    pub fn students_in(&mut self, course_id: &str, year: u32, division: &str) -> Result<Vec<Student>> {
        let mut students: Vec<Student> = self
            .students()?
            .into_iter()
            .filter(|s| s.course == course_id && s.year == year && s.division == division)
            .collect();
        students.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(students)
    }

    /// Records whether a student attended the lecture `lecture_id` on `day`.
    ///
    /// Marking the same lecture again overwrites the earlier mark.
    pub fn mark_attendance(
        &mut self,
        student_id: &str,
        day: &str,
        lecture_id: &str,
        present: bool,
    ) -> Result<()> {
        let mut records = self.student_records()?;
        let student = records
            .iter_mut()
            .filter_map(Entity::known_mut)
            .find(|s| s.id == student_id)
            .ok_or_else(|| TmsError::StudentNotFound(student_id.to_string()))?;
        student.attendance.insert(attendance_key(day, lecture_id), present);
        self.save_data(STUDENTS_KEY, &records)
    }

    pub fn attendance_summary(&mut self, student_id: &str) -> Result<AttendanceSummary> {
        self.students()?
            .iter()
            .find(|s| s.id == student_id)
            .map(|s| AttendanceSummary::from_attendance(&s.attendance))
            .ok_or_else(|| TmsError::StudentNotFound(student_id.to_string()))
    }

    fn student_records(&mut self) -> Result<Vec<Entity<Student>>> {
        Ok(self.get_data(STUDENTS_KEY)?.unwrap_or_default())
    }
}
