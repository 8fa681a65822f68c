//! Program catalog, loaded from a declarative SQL script.
//!
//! The catalog definition changes between releases, so emptiness is not
//! enough: a catalog with the expected row count but without the current
//! format's marker is wiped (ids restart at 1) and reseeded.

use async_trait::async_trait;

use super::script::{split_statements, ScriptSource};
use super::{Precondition, SeedStep, Seeded};
use crate::error::{BootstrapError, Result};
use crate::model::ProgramStatus;
use crate::ports::BootstrapStore;
use crate::schema::{program_schedule_columns, ColumnRef};

/// Cheap signal that the catalog was seeded from the current script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogFingerprint {
    pub rows: i64,
    pub status: ProgramStatus,
    pub application_year: i32,
}

impl Default for CatalogFingerprint {
    fn default() -> Self {
        Self {
            rows: 50,
            status: ProgramStatus::Open,
            application_year: 2025,
        }
    }
}

pub struct ProgramCatalogSeed {
    source: ScriptSource,
    fingerprint: CatalogFingerprint,
}

impl ProgramCatalogSeed {
    pub fn new(source: ScriptSource) -> Self {
        Self {
            source,
            fingerprint: CatalogFingerprint::default(),
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: CatalogFingerprint) -> Self {
        self.fingerprint = fingerprint;
        self
    }

    /// Load and split the script. A script without statements is an error,
    /// so a stale catalog is never swapped for an empty one.
    fn statements(&self) -> Result<Vec<String>> {
        let statements = split_statements(&self.source.load()?);
        if statements.is_empty() {
            return Err(BootstrapError::InvalidRecord(format!(
                "catalog script {} has no statements",
                self.source.describe()
            )));
        }
        Ok(statements)
    }
}

#[async_trait]
impl SeedStep for ProgramCatalogSeed {
    fn dataset(&self) -> &'static str {
        "programs"
    }

    fn required_columns(&self) -> Vec<ColumnRef> {
        program_schedule_columns()
            .iter()
            .map(|c| c.column_ref())
            .collect()
    }

    async fn precondition(&self, store: &dyn BootstrapStore) -> Result<Precondition> {
        let rows = store.count_programs().await?;
        if rows == 0 {
            return Ok(Precondition::Unmet);
        }

        let fp = &self.fingerprint;
        if rows == fp.rows
            && store
                .has_program_marker(fp.status, fp.application_year)
                .await?
        {
            Ok(Precondition::Satisfied { rows })
        } else {
            Ok(Precondition::Stale { rows })
        }
    }

    async fn prepare(&self) -> Result<()> {
        self.statements().map(drop)
    }

    async fn wipe(&self, store: &dyn BootstrapStore) -> Result<()> {
        store.wipe_programs().await
    }

    async fn seed(&self, store: &dyn BootstrapStore) -> Result<Seeded> {
        let statements = self.statements()?;
        tracing::info!(
            target: "bootstrap.seed",
            dataset = "programs",
            source = %self.source.describe(),
            statements = statements.len(),
            "executing catalog script"
        );
        Ok(Seeded::Inserted(store.execute_statements(&statements).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::ports::{ProgramStore, SchemaStore};
    use crate::schema::evolve;
    use crate::seed::{apply_step, SeedOutcome, SkipReason};

    async fn evolved_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.ensure_baseline().await.unwrap();
        evolve(&store, &program_schedule_columns()).await;
        store
    }

    fn catalog() -> ProgramCatalogSeed {
        ProgramCatalogSeed::new(ScriptSource::embedded())
    }

    #[tokio::test]
    async fn seeds_fifty_programs_then_skips() {
        let store = evolved_store().await;

        let first = apply_step(&catalog(), &store).await.unwrap();
        assert_eq!(first.count(), 50);

        let second = apply_step(&catalog(), &store).await.unwrap();
        assert_eq!(
            second.outcome,
            SeedOutcome::Skipped(SkipReason::AlreadySeeded { rows: 50 })
        );
    }

    #[tokio::test]
    async fn broken_statement_is_skipped() {
        let store = evolved_store().await;
        let script = "\
-- three programs, one malformed
INSERT INTO programs (title, status, application_start_date, application_end_date, program_start_date, program_end_date)
VALUES ('A', 'OPEN', '2025-01-01 00:00:00', '2025-01-10 00:00:00', '2025-01-11 00:00:00', '2025-01-25 00:00:00');
INSERT INTO programz (title) VALUES ('typo');
INSERT INTO programs (title, status, application_start_date, application_end_date, program_start_date, program_end_date)
VALUES ('B', 'CLOSED', '2025-02-01', '2025-02-10', '2025-02-11', '2025-02-25');
";
        let seed = ProgramCatalogSeed::new(ScriptSource::Inline(script.into()));

        let report = apply_step(&seed, &store).await.unwrap();
        assert_eq!(
            report.outcome,
            SeedOutcome::Applied {
                inserted: 2,
                failed: 1,
                replaced: None
            }
        );
    }

    #[tokio::test]
    async fn stale_catalog_is_wiped_and_reseeded() {
        let store = evolved_store().await;
        for i in 0..50 {
            store
                .push_program_window(&format!("Legacy {i}"), (2024, 3, 1), (2024, 3, 20))
                .unwrap();
        }

        let report = apply_step(&catalog(), &store).await.unwrap();

        assert_eq!(
            report.outcome,
            SeedOutcome::Applied {
                inserted: 50,
                failed: 0,
                replaced: Some(50)
            }
        );
        assert_eq!(store.program_ids(), (1..=50).collect::<Vec<i64>>());
        assert!(store
            .has_program_marker(ProgramStatus::Open, 2025)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn missing_script_keeps_stale_catalog() {
        let store = evolved_store().await;
        for i in 0..50 {
            store
                .push_program_window(&format!("Legacy {i}"), (2024, 3, 1), (2024, 3, 20))
                .unwrap();
        }
        let dir = tempfile::tempdir().unwrap();
        let seed = ProgramCatalogSeed::new(ScriptSource::File(dir.path().join("missing.sql")));

        let err = apply_step(&seed, &store).await.unwrap_err();

        assert!(matches!(err, BootstrapError::Io { .. }));
        assert_eq!(store.program_ids(), (1..=50).collect::<Vec<i64>>());
    }

    #[tokio::test]
    async fn empty_script_keeps_stale_catalog() {
        let store = evolved_store().await;
        store
            .push_program_window("Legacy", (2024, 3, 1), (2024, 3, 20))
            .unwrap();
        let seed = ProgramCatalogSeed::new(ScriptSource::Inline("-- nothing yet\n".into()));

        let err = apply_step(&seed, &store).await.unwrap_err();

        assert!(matches!(err, BootstrapError::InvalidRecord(_)));
        assert_eq!(store.program_ids(), vec![1]);
    }

    #[tokio::test]
    async fn wrong_count_is_stale_even_with_marker() {
        let store = evolved_store().await;
        let seed = catalog().with_fingerprint(CatalogFingerprint {
            rows: 51,
            ..Default::default()
        });
        apply_step(&catalog(), &store).await.unwrap();

        assert_eq!(
            seed.precondition(&store).await.unwrap(),
            Precondition::Stale { rows: 50 }
        );
    }

    #[test]
    fn requires_schedule_columns() {
        let cols = catalog().required_columns();
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].column, "program_start_date");
    }
}
