//! Weekly timetables and the lectures in them.

use crate::core::keys::TimetableKey;
use crate::core::model::{Lecture, Timetable, DAYS};
use crate::{KeyValueStore, Result, TmsError, Workspace};

impl<S: KeyValueStore> Workspace<S> {
    /// Loads the timetable at `key`, creating and storing an empty one if absent.
    ///
    /// # Errors
    ///
    /// Returns [`TmsError::InvalidInput`] if the stored value is not a timetable.
    pub fn timetable(&mut self, key: &TimetableKey) -> Result<Timetable> {
        let storage_key = key.to_key();
        match self.get_value(&storage_key)? {
            Some(value) => serde_json::from_value(value).map_err(|e| {
                TmsError::InvalidInput(format!("'{storage_key}' does not hold a timetable: {e}"))
            }),
            None => {
                let timetable = Timetable::empty();
                self.save_data(&storage_key, &timetable)?;
                log::debug!("created empty timetable '{storage_key}'");
                Ok(timetable)
            }
        }
    }

    pub fn save_timetable(&mut self, key: &TimetableKey, timetable: &Timetable) -> Result<()> {
        self.save_data(&key.to_key(), timetable)
    }

    /// Appends a lecture to `day`. The scheduled teacher starts out present.
    pub fn add_lecture(
        &mut self,
        key: &TimetableKey,
        day: &str,
        subject: &str,
        time: &str,
        teacher: &str,
    ) -> Result<Lecture> {
        ensure_day(day)?;
        if [subject, time, teacher].iter().any(|field| field.trim().is_empty()) {
            return Err(TmsError::InvalidInput(
                "subject, time and teacher are all required".to_string(),
            ));
        }

        let mut timetable = self.timetable(key)?;
        let lecture = Lecture {
            id: self.next_lecture_id(&timetable),
            subject: subject.to_string(),
            time: time.to_string(),
            teacher: teacher.to_string(),
            is_present: true,
            substitute_teacher: None,
        };
        timetable.lectures_mut(day).push(lecture.clone());
        self.save_timetable(key, &timetable)?;
        Ok(lecture)
    }

    /// Marks the scheduled teacher present or absent. Marking present drops
    /// any substitute.
    pub fn set_teacher_presence(
        &mut self,
        key: &TimetableKey,
        day: &str,
        lecture_id: &str,
        present: bool,
    ) -> Result<()> {
        self.update_lecture(key, day, lecture_id, |lecture| {
            lecture.is_present = present;
            if present {
                lecture.substitute_teacher = None;
            }
        })
    }

    pub fn assign_substitute(
        &mut self,
        key: &TimetableKey,
        day: &str,
        lecture_id: &str,
        substitute: &str,
    ) -> Result<()> {
        if substitute.trim().is_empty() {
            return Err(TmsError::InvalidInput("substitute teacher must not be empty".to_string()));
        }
        self.update_lecture(key, day, lecture_id, |lecture| {
            lecture.substitute_teacher = Some(substitute.to_string());
        })
    }

    /// Removes a lecture. Attendance already recorded against it is kept.
    pub fn delete_lecture(&mut self, key: &TimetableKey, day: &str, lecture_id: &str) -> Result<()> {
        ensure_day(day)?;
        let mut timetable = self.timetable(key)?;
        let lectures = timetable.lectures_mut(day);
        let before = lectures.len();
        lectures.retain(|l| l.id != lecture_id);
        if lectures.len() == before {
            return Err(lecture_not_found(day, lecture_id));
        }
        self.save_timetable(key, &timetable)
    }

    fn update_lecture(
        &mut self,
        key: &TimetableKey,
        day: &str,
        lecture_id: &str,
        apply: impl FnOnce(&mut Lecture),
    ) -> Result<()> {
        ensure_day(day)?;
        let mut timetable = self.timetable(key)?;
        let lecture = timetable
            .lectures_mut(day)
            .iter_mut()
            .find(|l| l.id == lecture_id)
            .ok_or_else(|| lecture_not_found(day, lecture_id))?;
        apply(lecture);
        self.save_timetable(key, &timetable)
    }

    /// Epoch milliseconds, bumped past every ID already issued or present in `timetable`.
    fn next_lecture_id(&mut self, timetable: &Timetable) -> String {
        let newest = timetable
            .days
            .values()
            .flatten()
            .filter_map(|l| l.id.parse::<i64>().ok())
            .max()
            .unwrap_or(0);
        let id = chrono::Utc::now()
            .timestamp_millis()
            .max(self.lecture_clock + 1)
            .max(newest + 1);
        self.lecture_clock = id;
        id.to_string()
    }
}

fn ensure_day(day: &str) -> Result<()> {
    if DAYS.contains(&day) {
        Ok(())
    } else {
        Err(TmsError::InvalidInput(format!("'{day}' is not a teaching day")))
    }
}

fn lecture_not_found(day: &str, lecture_id: &str) -> TmsError {
    TmsError::LectureNotFound {
        day: day.to_string(),
        lecture_id: lecture_id.to_string(),
    }
}
