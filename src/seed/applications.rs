//! Program applications in every lifecycle status.
//!
//! Applications reference seeded programs and students, so this step runs
//! after both. It still checks its own table first, and when upstream did
//! not produce enough usable rows it skips instead of failing.

use async_trait::async_trait;
use chrono::{Duration, NaiveDateTime, Utc};

use super::{empty_table, Precondition, SeedStep, Seeded};
use crate::error::Result;
use crate::model::ApplicationStatus::{self, Approved, Cancelled, Completed, Pending, Rejected};
use crate::model::{NewApplication, ProgramRow, ProgramStatus, UserRole, UserRow};
use crate::ports::BootstrapStore;

/// Students the fan-out below addresses by position.
pub const REQUIRED_STUDENTS: usize = 8;

const ELIGIBLE_PROGRAMS: i64 = 3;
const APPLIED_DAYS_AGO: i64 = 10;
const REJECTION_REASON: &str = "Rejected: program capacity exceeded";

/// (program position, student position, status) for every application.
const PLAN: [(usize, usize, ApplicationStatus); 11] = [
    (0, 0, Pending),
    (0, 1, Pending),
    (0, 2, Pending),
    (0, 3, Approved),
    (0, 4, Approved),
    (0, 5, Rejected),
    (0, 6, Cancelled),
    (0, 7, Completed),
    (1, 0, Pending),
    (1, 1, Approved),
    (2, 0, Pending),
];

pub struct ApplicationSeed {
    clock: Option<NaiveDateTime>,
}

impl ApplicationSeed {
    pub fn new() -> Self {
        Self { clock: None }
    }

    /// Pin "now" instead of reading the wall clock.
    pub fn at(now: NaiveDateTime) -> Self {
        Self { clock: Some(now) }
    }

    /// Applications for the given eligible programs and students. Programs
    /// beyond the first are optional; missing ones just produce fewer rows.
    pub fn records(
        &self,
        programs: &[ProgramRow],
        students: &[UserRow],
    ) -> Result<Vec<NewApplication>> {
        let now = self.clock.unwrap_or_else(|| Utc::now().naive_utc());
        let applied_at = now - Duration::days(APPLIED_DAYS_AGO);

        let mut applications = Vec::with_capacity(PLAN.len());
        for (program_pos, student_pos, status) in PLAN {
            let (Some(program), Some(student)) =
                (programs.get(program_pos), students.get(student_pos))
            else {
                continue;
            };
            let application = NewApplication::new(
                program.program_id,
                student.user_id,
                status,
                applied_at,
                Some(REJECTION_REASON),
            );
            application.validate()?;
            applications.push(application);
        }
        Ok(applications)
    }
}

impl Default for ApplicationSeed {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SeedStep for ApplicationSeed {
    fn dataset(&self) -> &'static str {
        "applications"
    }

    fn depends_on(&self) -> &'static [&'static str] {
        &["users", "programs"]
    }

    async fn precondition(&self, store: &dyn BootstrapStore) -> Result<Precondition> {
        Ok(empty_table(store.count_applications().await?))
    }

    async fn seed(&self, store: &dyn BootstrapStore) -> Result<Seeded> {
        let programs = store
            .programs_by_status(ProgramStatus::Open, ELIGIBLE_PROGRAMS)
            .await?;
        if programs.is_empty() {
            return Ok(Seeded::DependencyUnmet(
                "no OPEN programs to apply to".to_string(),
            ));
        }

        let students = store.users_by_role(UserRole::Student).await?;
        if students.len() < REQUIRED_STUDENTS {
            return Ok(Seeded::DependencyUnmet(format!(
                "need {REQUIRED_STUDENTS} students, found {}",
                students.len()
            )));
        }

        let applications = self.records(&programs, &students)?;
        tracing::debug!(
            target: "bootstrap.seed",
            dataset = "applications",
            first_program = programs[0].program_id,
            programs = programs.len(),
            records = applications.len(),
            "prepared applications"
        );
        Ok(Seeded::Inserted(
            store.insert_applications(&applications).await?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 10, 1)
            .and_then(|d| d.and_hms_opt(12, 0, 0))
            .unwrap()
    }

    fn programs(n: i64) -> Vec<ProgramRow> {
        (1..=n)
            .map(|id| ProgramRow {
                program_id: id,
                title: format!("Program {id}"),
                status: ProgramStatus::Open,
            })
            .collect()
    }

    fn students() -> Vec<UserRow> {
        (1..=8)
            .map(|id| UserRow {
                user_id: id,
                student_num: 2020000 + id as i32,
                name: format!("Student {id}"),
                role: UserRole::Student,
            })
            .collect()
    }

    fn count(apps: &[NewApplication], program: i64, status: ApplicationStatus) -> usize {
        apps.iter()
            .filter(|a| a.program_id == program && a.status == status)
            .count()
    }

    #[test]
    fn fan_out_across_three_programs() {
        let apps = ApplicationSeed::at(now())
            .records(&programs(3), &students())
            .unwrap();

        assert_eq!(apps.len(), 11);
        assert_eq!(count(&apps, 1, Pending), 3);
        assert_eq!(count(&apps, 1, Approved), 2);
        assert_eq!(count(&apps, 1, Rejected), 1);
        assert_eq!(count(&apps, 1, Cancelled), 1);
        assert_eq!(count(&apps, 1, Completed), 1);
        assert_eq!(apps.iter().filter(|a| a.program_id == 2).count(), 2);
        assert_eq!(apps.iter().filter(|a| a.program_id == 3).count(), 1);
    }

    #[test]
    fn fewer_programs_produce_fewer_rows() {
        let apps = ApplicationSeed::at(now())
            .records(&programs(1), &students())
            .unwrap();
        assert_eq!(apps.len(), 8);
    }

    #[test]
    fn timestamps_follow_the_run_clock() {
        let apps = ApplicationSeed::at(now())
            .records(&programs(3), &students())
            .unwrap();
        let applied = now() - Duration::days(10);

        for app in &apps {
            assert_eq!(app.applied_at, applied);
            app.validate().unwrap();
        }
        let rejected = apps.iter().find(|a| a.status == Rejected).unwrap();
        assert_eq!(rejected.rejection_reason.as_deref(), Some(REJECTION_REASON));
        assert!(rejected.timestamps.completed_at.is_none());
        let completed = apps.iter().find(|a| a.status == Completed).unwrap();
        assert_eq!(completed.timestamps.completed_at, Some(applied + Duration::days(8)));
    }
}
