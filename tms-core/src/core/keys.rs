//! Derived storage keys for timetables and attendance entries.
//!
//! Everything here is pure. Migrating timetables when a year is split or
//! merged is done by the course collaborator in [`courses`](super::courses).

use crate::core::model::Course;
use regex::Regex;
use std::sync::OnceLock;

/// Course list key.
pub const COURSES_KEY: &str = "courses";
/// Faculty list key.
pub const FACULTY_KEY: &str = "faculty";
/// Student list key; attendance lives inside each student.
pub const STUDENTS_KEY: &str = "students";
/// Admin credential record key.
pub const ADMIN_CREDENTIALS_KEY: &str = "adminCredentials";
/// UI theme preference. Not protected from eviction.
pub const THEME_KEY: &str = "theme";

/// Every timetable key starts with this prefix.
pub const TIMETABLE_PREFIX: &str = "timetable_";

/// The components of a timetable key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimetableKey {
    pub course_id: String,
    pub year: u32,
    pub division: Option<String>,
}

impl TimetableKey {
    pub fn new(course_id: impl Into<String>, year: u32, division: Option<&str>) -> Self {
        Self {
            course_id: course_id.into(),
            year,
            division: division.map(str::to_string),
        }
    }

    #[must_use]
    pub fn to_key(&self) -> String {
        timetable_key(&self.course_id, self.year, self.division.as_deref())
    }
}

/// `timetable_{course}_year{year}`, or `..._{division}` for a split year.
#[must_use]
pub fn timetable_key(course_id: &str, year: u32, division: Option<&str>) -> String {
    match division {
        Some(division) => format!("{TIMETABLE_PREFIX}{course_id}_year{year}_{division}"),
        None => format!("{TIMETABLE_PREFIX}{course_id}_year{year}"),
    }
}

/// `{day}_{lectureId}`, the key of one entry in a student's attendance map.
#[must_use]
pub fn attendance_key(day: &str, lecture_id: &str) -> String {
    format!("{day}_{lecture_id}")
}

/// Whether `year` of `course` currently has more than one division.
///
/// Unknown years are not qualified.
#[must_use]
pub fn is_division_qualified(course: &Course, year: u32) -> bool {
    course.year(year).is_some_and(|y| y.is_split())
}

#[must_use]
pub fn is_timetable_key(key: &str) -> bool {
    key.starts_with(TIMETABLE_PREFIX)
}

/// Splits a timetable key back into its components.
///
/// Returns `None` for keys that do not follow the timetable scheme.
pub fn parse_timetable_key(key: &str) -> Option<TimetableKey> {
    static TIMETABLE_KEY_RE: OnceLock<Regex> = OnceLock::new();
    let re = TIMETABLE_KEY_RE.get_or_init(|| {
        Regex::new(r"^timetable_(.+?)_year(\d+)(?:_(.+))?$").expect("valid regex")
    });

    let caps = re.captures(key)?;
    Some(TimetableKey {
        course_id: caps.get(1)?.as_str().to_string(),
        year: caps.get(2)?.as_str().parse().ok()?,
        division: caps.get(3).map(|m| m.as_str().to_string()),
    })
}

/// The timetable keys that should exist for `course` given its current divisions.
pub fn timetable_keys_for(course: &Course) -> Vec<String> {
    course
        .years
        .iter()
        .flat_map(|y| {
            if y.is_split() {
                y.divisions
                    .iter()
                    .map(|d| timetable_key(&course.id, y.year, Some(d)))
                    .collect::<Vec<_>>()
            } else {
                vec![timetable_key(&course.id, y.year, None)]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::CourseYear;

    #[test]
    fn test_timetable_key_forms() {
        assert_eq!(timetable_key("bca", 1, None), "timetable_bca_year1");
        assert_eq!(
            timetable_key("bca", 2, Some("Division B")),
            "timetable_bca_year2_Division B"
        );
    }

    #[test]
    fn test_attendance_key() {
        assert_eq!(attendance_key("Monday", "1712345678901"), "Monday_1712345678901");
    }

    #[test]
    fn test_is_division_qualified() {
        let mut course = Course::new("BCA", 2);
        course.years[1] = CourseYear::split(2);

        assert!(!is_division_qualified(&course, 1));
        assert!(is_division_qualified(&course, 2));
        assert!(!is_division_qualified(&course, 3));
    }

    #[test]
    fn test_parse_timetable_key() {
        assert_eq!(
            parse_timetable_key("timetable_bca_year1"),
            Some(TimetableKey {
                course_id: "bca".to_string(),
                year: 1,
                division: None,
            })
        );
        let qualified = parse_timetable_key("timetable_m-sc_it_year12_Division A").unwrap();
        assert_eq!(qualified.course_id, "m-sc_it");
        assert_eq!(qualified.year, 12);
        assert_eq!(qualified.division.as_deref(), Some("Division A"));
        assert_eq!(qualified.to_key(), "timetable_m-sc_it_year12_Division A");

        assert_eq!(parse_timetable_key("timetable_bca"), None);
        assert_eq!(parse_timetable_key("courses"), None);
    }

    #[test]
    fn test_is_timetable_key() {
        assert!(is_timetable_key("timetable_bca_year1"));
        assert!(is_timetable_key("timetable_anything"));
        assert!(!is_timetable_key("my_timetable"));
    }

    #[test]
    fn test_timetable_keys_for_mixed_course() {
        let mut course = Course::new("MCA", 2);
        course.years[0] = CourseYear::split(1);

        assert_eq!(
            timetable_keys_for(&course),
            vec![
                "timetable_mca_year1_Division A",
                "timetable_mca_year1_Division B",
                "timetable_mca_year2",
            ]
        );
    }
}
