//! Stored record shapes: courses, faculty, students, timetables and credentials.
//!
//! Lists are decoded through [`Entity`] so that an element in an unexpected
//! shape is carried through untouched instead of failing the whole list.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Teaching days, in week order. Every timetable has exactly these keys.
pub const DAYS: [&str; 6] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

/// Label of the only division of an unsplit year, and the first of a split one.
pub const DIVISION_A: &str = "Division A";
/// Label of the second division created by a split.
pub const DIVISION_B: &str = "Division B";

/// Either a record in the current shape or a value kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entity<T> {
    Known(T),
    Unknown(Value),
}

impl<T> Entity<T> {
    pub fn known(&self) -> Option<&T> {
        match self {
            Self::Known(value) => Some(value),
            Self::Unknown(_) => None,
        }
    }

    pub fn known_mut(&mut self) -> Option<&mut T> {
        match self {
            Self::Known(value) => Some(value),
            Self::Unknown(_) => None,
        }
    }
}

/// One year of a course and its division labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseYear {
    pub year: u32,
    pub divisions: Vec<String>,
}

impl CourseYear {
    /// A year with the single implicit division.
    pub fn single(year: u32) -> Self {
        Self {
            year,
            divisions: vec![DIVISION_A.to_string()],
        }
    }

    /// A year split into Division A and Division B.
    pub fn split(year: u32) -> Self {
        Self {
            year,
            divisions: vec![DIVISION_A.to_string(), DIVISION_B.to_string()],
        }
    }

    #[must_use]
    pub fn is_split(&self) -> bool {
        self.divisions.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Course {
    pub id: String,
    pub title: String,
    pub duration: u32,
    pub years: Vec<CourseYear>,
}

impl Course {
    /// A new course with years `1..=duration`, each unsplit.
    pub fn new(title: &str, duration: u32) -> Self {
        Self {
            id: course_slug(title),
            title: title.to_string(),
            duration,
            years: (1..=duration).map(CourseYear::single).collect(),
        }
    }

    pub fn year(&self, year: u32) -> Option<&CourseYear> {
        self.years.iter().find(|y| y.year == year)
    }

    pub fn year_mut(&mut self, year: u32) -> Option<&mut CourseYear> {
        self.years.iter_mut().find(|y| y.year == year)
    }
}

/// Derives a course ID from its title: lowercase, whitespace runs become `-`.
pub fn course_slug(title: &str) -> String {
    title
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyMember {
    pub id: u32,
    pub name: String,
    pub department: String,
    pub degree: String,
    pub date_of_birth: String,
    pub is_admin: bool,
    pub email: String,
}

/// Fields supplied when adding a faculty member; ID and admin flag are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFacultyMember {
    pub name: String,
    pub department: String,
    pub degree: String,
    pub date_of_birth: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub roll_no: String,
    pub name: String,
    pub prn_number: String,
    pub course: String,
    pub year: u32,
    pub division: String,
    /// Presence per attendance key (`{day}_{lectureId}`).
    #[serde(default)]
    pub attendance: BTreeMap<String, bool>,
}

/// Fields supplied when enrolling a student; ID and attendance are assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub roll_no: String,
    pub name: String,
    pub prn_number: String,
    pub course: String,
    pub year: u32,
    pub division: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lecture {
    pub id: String,
    pub subject: String,
    pub time: String,
    pub teacher: String,
    /// Whether the scheduled teacher is present.
    pub is_present: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substitute_teacher: Option<String>,
}

/// Lectures per day for one course year (and division, when split).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timetable {
    pub days: BTreeMap<String, Vec<Lecture>>,
}

impl Timetable {
    /// Six teaching days, no lectures.
    pub fn empty() -> Self {
        Self {
            days: DAYS
                .iter()
                .map(|day| ((*day).to_string(), Vec::new()))
                .collect(),
        }
    }

    pub fn lectures(&self, day: &str) -> &[Lecture] {
        self.days.get(day).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn lectures_mut(&mut self, day: &str) -> &mut Vec<Lecture> {
        self.days.entry(day.to_string()).or_default()
    }

    #[must_use]
    pub fn lecture_count(&self) -> usize {
        self.days.values().map(Vec::len).sum()
    }
}

impl Default for Timetable {
    fn default() -> Self {
        Self::empty()
    }
}

/// Username/password pair stored under `adminCredentials`.
///
/// This is cosmetic gating only: a plaintext comparison against values kept
/// in the same store as the data it guards. It is not authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
}

/// What a user typed into an admin prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialAttempt {
    pub username: String,
    pub password: String,
}

impl CredentialAttempt {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl AdminCredentials {
    #[must_use]
    pub fn matches(&self, attempt: &CredentialAttempt) -> bool {
        self.username == attempt.username && self.password == attempt.password
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_course_has_unsplit_years() {
        let course = Course::new("Bachelor of  Computer Applications", 3);
        assert_eq!(course.id, "bachelor-of-computer-applications");
        assert_eq!(course.years.len(), 3);
        assert!(course.years.iter().all(|y| y.divisions == vec![DIVISION_A]));
        assert_eq!(course.year(2).unwrap().year, 2);
        assert!(course.year(4).is_none());
    }

    #[test]
    fn test_course_json_shape() {
        let course = Course::new("BCA", 1);
        assert_eq!(
            serde_json::to_value(&course).unwrap(),
            json!({"id": "bca", "title": "BCA", "duration": 1,
                   "years": [{"year": 1, "divisions": ["Division A"]}]})
        );
    }

    #[test]
    fn test_empty_timetable_has_six_days() {
        let timetable = Timetable::empty();
        assert_eq!(timetable.days.len(), 6);
        assert_eq!(timetable.lecture_count(), 0);
        assert_eq!(
            serde_json::to_value(&timetable).unwrap(),
            json!({"Monday": [], "Tuesday": [], "Wednesday": [],
                   "Thursday": [], "Friday": [], "Saturday": []})
        );
    }

    #[test]
    fn test_lecture_substitute_is_optional() {
        let lecture: Lecture = serde_json::from_value(json!({
            "id": "1", "subject": "Maths", "time": "9:00",
            "teacher": "Dr. Smith", "isPresent": true
        }))
        .unwrap();
        assert_eq!(lecture.substitute_teacher, None);
        assert!(!serde_json::to_string(&lecture).unwrap().contains("substituteTeacher"));
    }

    #[test]
    fn test_entity_keeps_unknown_shapes() {
        let list: Vec<Entity<Course>> = serde_json::from_value(json!([
            {"id": "bca", "title": "BCA", "duration": 1, "years": []},
            {"legacy": true}
        ]))
        .unwrap();

        assert!(list[0].known().is_some());
        assert_eq!(list[1], Entity::Unknown(json!({"legacy": true})));
        assert_eq!(serde_json::to_value(&list).unwrap()[1], json!({"legacy": true}));
    }

    #[test]
    fn test_student_without_attendance_decodes() {
        let student: Student = serde_json::from_value(json!({
            "id": "s1", "rollNo": "1", "name": "Asha", "prnNumber": "P1",
            "course": "bca", "year": 1, "division": "Division A"
        }))
        .unwrap();
        assert!(student.attendance.is_empty());
    }

    #[test]
    fn test_credentials_match_exactly() {
        let creds = AdminCredentials {
            username: "Dr. Smith".to_string(),
            password: "Mathematics".to_string(),
        };
        assert!(creds.matches(&CredentialAttempt::new("Dr. Smith", "Mathematics")));
        assert!(!creds.matches(&CredentialAttempt::new("dr. smith", "Mathematics")));
        assert!(!creds.matches(&CredentialAttempt::new("Dr. Smith", "")));
    }
}
