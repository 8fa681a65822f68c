//! Storage port traits for the bootstrap.
//! Implemented by `database::PgBootstrapStore` and `memory::MemoryStore`.
//! The evolver, the seed steps and the orchestrator depend only on these.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::model::{
    NewApplication, NewSurvey, NewUser, ProgramRow, ProgramStatus, UserRole, UserRow,
};
use crate::schema::ColumnSpec;

/// Live metadata for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnState {
    pub nullable: bool,
}

/// A record (or script statement) that failed inside a tolerant batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub index: usize,
    pub label: String,
    pub error: String,
}

impl RecordFailure {
    pub fn new(index: usize, label: impl Into<String>, error: impl ToString) -> Self {
        Self {
            index,
            label: label.into(),
            error: error.to_string(),
        }
    }
}

/// Result of a batch where individual records may fail without aborting
/// the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub inserted: u64,
    pub failures: Vec<RecordFailure>,
}

#[async_trait]
pub trait SchemaStore: Send + Sync {
    /// Create the baseline tables when absent.
    async fn ensure_baseline(&self) -> Result<()>;

    /// `None` when the column does not exist.
    async fn inspect_column(&self, table: &str, column: &str) -> Result<Option<ColumnState>>;

    async fn add_nullable_column(&self, spec: &ColumnSpec) -> Result<()>;

    /// Apply the spec's backfill rule to rows still holding NULL.
    /// Returns the number of rows updated.
    async fn backfill(&self, spec: &ColumnSpec) -> Result<u64>;

    async fn count_nulls(&self, table: &str, column: &str) -> Result<i64>;

    async fn set_not_null(&self, spec: &ColumnSpec) -> Result<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn count_users(&self) -> Result<i64>;

    async fn insert_users(&self, users: &[NewUser]) -> Result<BatchOutcome>;

    /// Users holding `role`, ordered by id.
    async fn users_by_role(&self, role: UserRole) -> Result<Vec<UserRow>>;
}

#[async_trait]
pub trait ProgramStore: Send + Sync {
    async fn count_programs(&self) -> Result<i64>;

    /// Whether some program has `status` and an application window opening
    /// in `year`.
    async fn has_program_marker(&self, status: ProgramStatus, year: i32) -> Result<bool>;

    /// Delete every program (and rows depending on them) and restart the
    /// program id sequence at 1.
    async fn wipe_programs(&self) -> Result<()>;

    /// Execute each statement independently; a failing statement is
    /// recorded and the rest still run.
    async fn execute_statements(&self, statements: &[String]) -> Result<BatchOutcome>;

    /// Up to `limit` programs with `status`, ordered by id.
    async fn programs_by_status(&self, status: ProgramStatus, limit: i64)
        -> Result<Vec<ProgramRow>>;
}

#[async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn count_applications(&self) -> Result<i64>;

    async fn insert_applications(&self, applications: &[NewApplication]) -> Result<BatchOutcome>;
}

#[async_trait]
pub trait SurveyStore: Send + Sync {
    async fn count_surveys(&self) -> Result<i64>;

    /// Insert a survey with its questions and options atomically.
    /// Returns the new survey id.
    async fn insert_survey(&self, survey: &NewSurvey) -> Result<i64>;
}

/// Everything the bootstrap needs from a database handle.
pub trait BootstrapStore:
    SchemaStore + UserStore + ProgramStore + ApplicationStore + SurveyStore
{
}

impl<T> BootstrapStore for T where
    T: SchemaStore + UserStore + ProgramStore + ApplicationStore + SurveyStore + ?Sized
{
}
