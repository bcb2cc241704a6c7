//! Course records and the division split/merge, including timetable key migration.
//!
//! A year holds either one implicit division, stored under the unqualified
//! timetable key, or exactly `Division A` and `Division B`, each stored under
//! its own qualified key. Every transition writes the new course list and
//! the new timetables in one batch before removing the keys that no longer
//! apply, so an interrupted transition leaves extra keys behind but never
//! loses a timetable.

use crate::core::keys::{timetable_key, COURSES_KEY};
use crate::core::model::{
    course_slug, Course, CourseYear, CredentialAttempt, Entity, Timetable, DIVISION_A, DIVISION_B,
};
use crate::core::workspace::GateOutcome;
use crate::{KeyValueStore, Result, TmsError, Workspace};
use serde_json::Value;

impl<S: KeyValueStore> Workspace<S> {
    /// Courses in stored order. Entries in an unknown shape are skipped.
    pub fn courses(&mut self) -> Result<Vec<Course>> {
        Ok(self
            .course_records()?
            .into_iter()
            .filter_map(|entry| match entry {
                Entity::Known(course) => Some(course),
                Entity::Unknown(_) => None,
            })
            .collect())
    }

    pub fn course(&mut self, course_id: &str) -> Result<Course> {
        self.courses()?
            .into_iter()
            .find(|c| c.id == course_id)
            .ok_or_else(|| TmsError::CourseNotFound(course_id.to_string()))
    }

    /// Adds a course with `duration` unsplit years and an empty timetable for each.
    ///
    /// # Errors
    ///
    /// Returns [`TmsError::InvalidInput`] for a blank title, a zero duration or
    /// a title whose derived ID is already taken.
    pub fn add_course(
        &mut self,
        attempt: &CredentialAttempt,
        title: &str,
        duration: u32,
    ) -> Result<GateOutcome> {
        if !self.verify_admin(attempt)? {
            log::warn!("admin check failed, course '{title}' not added");
            return Ok(GateOutcome::Denied);
        }
        validate_course(title, duration)?;

        let course = Course::new(title.trim(), duration);
        let mut records = self.course_records()?;
        if records.iter().any(|e| e.known().is_some_and(|c| c.id == course.id)) {
            return Err(TmsError::InvalidInput(format!(
                "a course with ID '{}' already exists",
                course.id
            )));
        }

        let mut batch: Vec<(String, Value)> = course
            .years
            .iter()
            .map(|y| Ok((timetable_key(&course.id, y.year, None), empty_timetable()?)))
            .collect::<Result<Vec<_>>>()?;
        log::info!("adding course '{}' with {duration} years", course.id);
        records.push(Entity::Known(course));
        batch.push((COURSES_KEY.to_string(), serde_json::to_value(&records)?));
        self.save_batch(batch)?;
        Ok(GateOutcome::Applied)
    }

    /// Renames a course and changes its duration.
    ///
    /// Existing years keep their divisions and timetables. New years start
    /// unsplit with an empty timetable; timetables of dropped years are deleted.
    pub fn update_course(
        &mut self,
        attempt: &CredentialAttempt,
        course_id: &str,
        title: &str,
        duration: u32,
    ) -> Result<GateOutcome> {
        if !self.verify_admin(attempt)? {
            log::warn!("admin check failed, course '{course_id}' not updated");
            return Ok(GateOutcome::Denied);
        }
        validate_course(title, duration)?;

        let mut records = self.course_records()?;
        let course = find_course(&mut records, course_id)?;
        if course.title == title.trim() && course.duration == duration {
            return Ok(GateOutcome::Unchanged);
        }

        let mut batch = Vec::new();
        let mut stale = Vec::new();
        for year in course.years.iter().filter(|y| y.year > duration) {
            stale.extend(keys_for_year(&course.id, year));
        }
        course.years.retain(|y| y.year <= duration);
        for year in 1..=duration {
            if course.year(year).is_none() {
                course.years.push(CourseYear::single(year));
                batch.push((timetable_key(&course.id, year, None), empty_timetable()?));
            }
        }
        course.years.sort_by_key(|y| y.year);
        course.title = title.trim().to_string();
        course.duration = duration;

        batch.push((COURSES_KEY.to_string(), serde_json::to_value(&records)?));
        self.save_batch(batch)?;
        self.delete_all(&stale)?;
        log::info!("updated course '{course_id}' ({} timetables dropped)", stale.len());
        Ok(GateOutcome::Applied)
    }

    /// Splits `year` of a course into Division A and Division B.
    ///
    /// The existing timetable becomes Division A's and Division B starts empty.
    /// A year that is already split is left as is.
    pub fn split_division(
        &mut self,
        attempt: &CredentialAttempt,
        course_id: &str,
        year: u32,
    ) -> Result<GateOutcome> {
        if !self.verify_admin(attempt)? {
            log::warn!("admin check failed, '{course_id}' year {year} not split");
            return Ok(GateOutcome::Denied);
        }

        let mut records = self.course_records()?;
        let course_year = find_year(&mut records, course_id, year)?;
        if course_year.is_split() {
            return Ok(GateOutcome::Unchanged);
        }
        *course_year = CourseYear::split(year);

        let unqualified = timetable_key(course_id, year, None);
        let current = match self.get_value(&unqualified)? {
            Some(timetable) => timetable,
            None => empty_timetable()?,
        };
        self.save_batch(vec![
            (COURSES_KEY.to_string(), serde_json::to_value(&records)?),
            (timetable_key(course_id, year, Some(DIVISION_A)), current),
            (timetable_key(course_id, year, Some(DIVISION_B)), empty_timetable()?),
        ])?;
        self.delete_data(&unqualified)?;
        log::info!("split '{course_id}' year {year} into two divisions");
        Ok(GateOutcome::Applied)
    }

    /// Merges a split `year` back into one division, keeping Division A's timetable.
    ///
    /// Division B's timetable is discarded. A year with one division is left as is.
    pub fn merge_divisions(
        &mut self,
        attempt: &CredentialAttempt,
        course_id: &str,
        year: u32,
    ) -> Result<GateOutcome> {
        if !self.verify_admin(attempt)? {
            log::warn!("admin check failed, '{course_id}' year {year} not merged");
            return Ok(GateOutcome::Denied);
        }

        let mut records = self.course_records()?;
        let course_year = find_year(&mut records, course_id, year)?;
        if !course_year.is_split() {
            return Ok(GateOutcome::Unchanged);
        }
        let qualified: Vec<String> = course_year
            .divisions
            .iter()
            .map(|d| timetable_key(course_id, year, Some(d)))
            .collect();
        *course_year = CourseYear::single(year);

        let first = timetable_key(course_id, year, Some(DIVISION_A));
        let current = match self.get_value(&first)? {
            Some(timetable) => timetable,
            None => empty_timetable()?,
        };
        self.save_batch(vec![
            (COURSES_KEY.to_string(), serde_json::to_value(&records)?),
            (timetable_key(course_id, year, None), current),
        ])?;
        self.delete_all(&qualified)?;
        log::info!("merged divisions of '{course_id}' year {year}");
        Ok(GateOutcome::Applied)
    }

    fn course_records(&mut self) -> Result<Vec<Entity<Course>>> {
        Ok(self.get_data(COURSES_KEY)?.unwrap_or_default())
    }

    fn delete_all(&mut self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.delete_data(key)?;
        }
        Ok(())
    }
}

fn validate_course(title: &str, duration: u32) -> Result<()> {
    if course_slug(title).is_empty() {
        return Err(TmsError::InvalidInput("course title must not be empty".to_string()));
    }
    if duration == 0 {
        return Err(TmsError::InvalidInput("course duration must be at least one year".to_string()));
    }
    Ok(())
}

fn empty_timetable() -> Result<Value> {
    Ok(serde_json::to_value(Timetable::empty())?)
}

fn keys_for_year(course_id: &str, year: &CourseYear) -> Vec<String> {
    if year.is_split() {
        year.divisions
            .iter()
            .map(|d| timetable_key(course_id, year.year, Some(d)))
            .collect()
    } else {
        vec![timetable_key(course_id, year.year, None)]
    }
}

fn find_course<'a>(records: &'a mut [Entity<Course>], course_id: &str) -> Result<&'a mut Course> {
    records
        .iter_mut()
        .filter_map(Entity::known_mut)
        .find(|c| c.id == course_id)
        .ok_or_else(|| TmsError::CourseNotFound(course_id.to_string()))
}

fn find_year<'a>(
    records: &'a mut [Entity<Course>],
    course_id: &str,
    year: u32,
) -> Result<&'a mut CourseYear> {
    find_course(records, course_id)?
        .year_mut(year)
        .ok_or_else(|| TmsError::YearNotFound {
            course_id: course_id.to_string(),
            year,
        })
}
