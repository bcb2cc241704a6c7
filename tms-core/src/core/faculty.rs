//! Faculty records and the admin credential check derived from them.

use crate::core::keys::{ADMIN_CREDENTIALS_KEY, FACULTY_KEY};
use crate::core::model::{
    AdminCredentials, CredentialAttempt, Entity, FacultyMember, NewFacultyMember,
};
use crate::core::workspace::GateOutcome;
use crate::{KeyValueStore, Result, TmsError, Workspace};

/// Members written on first access to an empty faculty list.
pub fn demo_faculty() -> Vec<FacultyMember> {
    let member = |id, name: &str, department: &str, degree: &str, dob: &str, is_admin, email: &str| {
        FacultyMember {
            id,
            name: name.to_string(),
            department: department.to_string(),
            degree: degree.to_string(),
            date_of_birth: dob.to_string(),
            is_admin,
            email: email.to_string(),
        }
    };
    vec![
        member(1, "Dr. Smith", "Mathematics", "Ph.D.", "1975-05-15", true, "dr.smith@example.com"),
        member(2, "Prof. Johnson", "Physics", "Ph.D.", "1980-09-22", false, "prof.johnson@example.com"),
        member(3, "Ms. Brown", "English", "M.A.", "1985-03-10", false, "ms.brown@example.com"),
    ]
}

impl<S: KeyValueStore> Workspace<S> {
    /// Faculty members in stored order, seeding the demo members if none are stored.
    pub fn faculty(&mut self) -> Result<Vec<FacultyMember>> {
        Ok(self
            .faculty_records()?
            .into_iter()
            .filter_map(|entry| match entry {
                Entity::Known(member) => Some(member),
                Entity::Unknown(_) => None,
            })
            .collect())
    }

    /// Adds a member with the next free ID. New members are never admins.
    pub fn add_faculty(
        &mut self,
        attempt: &CredentialAttempt,
        new: NewFacultyMember,
    ) -> Result<GateOutcome> {
        if !self.verify_admin(attempt)? {
            log::warn!("admin check failed, faculty member '{}' not added", new.name);
            return Ok(GateOutcome::Denied);
        }
        if new.name.trim().is_empty() {
            return Err(TmsError::InvalidInput("faculty name must not be empty".to_string()));
        }

        let mut records = self.faculty_records()?;
        let id = records
            .iter()
            .filter_map(|e| e.known().map(|m| m.id))
            .max()
            .unwrap_or(0)
            + 1;
        records.push(Entity::Known(FacultyMember {
            id,
            name: new.name,
            department: new.department,
            degree: new.degree,
            date_of_birth: new.date_of_birth,
            is_admin: false,
            email: new.email,
        }));
        self.save_data(FACULTY_KEY, &records)?;
        log::info!("added faculty member {id}");
        Ok(GateOutcome::Applied)
    }

    /// Replaces the member with `member.id`, then refreshes the admin credentials.
    ///
    /// # Errors
    ///
    /// Returns [`TmsError::FacultyNotFound`] if no stored member has that ID.
    pub fn update_faculty(
        &mut self,
        attempt: &CredentialAttempt,
        member: FacultyMember,
    ) -> Result<GateOutcome> {
        if !self.verify_admin(attempt)? {
            log::warn!("admin check failed, faculty member {} not updated", member.id);
            return Ok(GateOutcome::Denied);
        }

        let mut records = self.faculty_records()?;
        let slot = records
            .iter_mut()
            .filter_map(Entity::known_mut)
            .find(|m| m.id == member.id)
            .ok_or(TmsError::FacultyNotFound(member.id))?;
        if *slot == member {
            return Ok(GateOutcome::Unchanged);
        }
        *slot = member;
        self.save_data(FACULTY_KEY, &records)?;
        self.refresh_admin_credentials()?;
        Ok(GateOutcome::Applied)
    }

    /// Stored credentials, or empty ones if none are stored.
    pub fn admin_credentials(&mut self) -> Result<AdminCredentials> {
        Ok(self
            .get_data::<AdminCredentials>(ADMIN_CREDENTIALS_KEY)?
            .unwrap_or_default())
    }

    /// Derives credentials from the first admin member (name and department)
    /// and stores them. Returns `None` and leaves the record alone if there is
    /// no admin member.
    pub fn refresh_admin_credentials(&mut self) -> Result<Option<AdminCredentials>> {
        let Some(admin) = self.faculty()?.into_iter().find(|m| m.is_admin) else {
            return Ok(None);
        };
        let credentials = AdminCredentials {
            username: admin.name,
            password: admin.department,
        };
        if self.get_data::<AdminCredentials>(ADMIN_CREDENTIALS_KEY)?.as_ref() != Some(&credentials) {
            self.save_data(ADMIN_CREDENTIALS_KEY, &credentials)?;
        }
        Ok(Some(credentials))
    }

    /// Compares `attempt` with the stored credentials.
    ///
    /// This gates UI actions only. The credentials sit in plain text in the
    /// same store as everything else.
    pub fn verify_admin(&mut self, attempt: &CredentialAttempt) -> Result<bool> {
        Ok(self.admin_credentials()?.matches(attempt))
    }

    fn faculty_records(&mut self) -> Result<Vec<Entity<FacultyMember>>> {
        if let Some(records) = self.get_data(FACULTY_KEY)? {
            return Ok(records);
        }
        let records: Vec<Entity<FacultyMember>> =
            demo_faculty().into_iter().map(Entity::Known).collect();
        self.save_data(FACULTY_KEY, &records)?;
        log::info!("seeded {} demo faculty members", records.len());
        self.refresh_admin_credentials()?;
        Ok(records)
    }
}
