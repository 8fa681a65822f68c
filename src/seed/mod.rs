//! Seed steps: idempotent insertion of fixed datasets.
//!
//! Every dataset follows the same shape:
//! 1. **Precondition**: a read-only check of the dataset's current state.
//! 2. **Prepare**: load and validate the seed source. Nothing is written
//!    when this fails.
//! 3. **Wipe** (stale datasets only): clear rows seeded in an older format.
//! 4. **Seed**: build records from a fixed template list and insert them,
//!    tolerating individual record failures.
//!
//! [`apply_step`] drives that shape and logs the outcome. Preconditions are
//! monotonic: once a dataset is seeded, re-running the step is a no-op.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{BootstrapError, Result};
use crate::ports::{BatchOutcome, BootstrapStore};
use crate::schema::ColumnRef;

mod applications;
mod programs;
pub mod script;
mod surveys;
mod users;

pub use applications::{ApplicationSeed, REQUIRED_STUDENTS};
pub use programs::{CatalogFingerprint, ProgramCatalogSeed};
pub use script::{split_statements, ScriptSource};
pub use surveys::SurveySeed;
pub use users::UserSeed;

/// Current state of a dataset relative to its seed definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Already seeded in the current format.
    Satisfied { rows: i64 },
    /// Nothing there yet.
    Unmet,
    /// Rows present but seeded from an older definition.
    Stale { rows: i64 },
}

/// What a seed pass did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Seeded {
    Inserted(BatchOutcome),
    /// Upstream datasets cannot support this one yet.
    DependencyUnmet(String),
}

#[async_trait]
pub trait SeedStep: Send + Sync {
    /// Logical dataset name, unique within a plan.
    fn dataset(&self) -> &'static str;

    /// Datasets whose rows this one references; they must run first.
    fn depends_on(&self) -> &'static [&'static str] {
        &[]
    }

    /// Evolved columns the seed writes; the step is skipped when their
    /// evolution failed.
    fn required_columns(&self) -> Vec<ColumnRef> {
        Vec::new()
    }

    async fn precondition(&self, store: &dyn BootstrapStore) -> Result<Precondition>;

    /// Check the seed source before anything destructive runs. A stale
    /// dataset is only wiped once this succeeds.
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    async fn wipe(&self, _store: &dyn BootstrapStore) -> Result<()> {
        Err(BootstrapError::Unsupported(format!(
            "dataset '{}' cannot be wiped",
            self.dataset()
        )))
    }

    async fn seed(&self, store: &dyn BootstrapStore) -> Result<Seeded>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    AlreadySeeded { rows: i64 },
    DependencyUnmet { detail: String },
    MissingColumn { column: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SeedOutcome {
    Applied {
        inserted: u64,
        failed: u64,
        /// Row count of a stale dataset that was wiped first.
        replaced: Option<i64>,
    },
    Skipped(SkipReason),
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub dataset: &'static str,
    #[serde(flatten)]
    pub outcome: SeedOutcome,
}

impl SeedReport {
    pub fn new(dataset: &'static str, outcome: SeedOutcome) -> Self {
        Self { dataset, outcome }
    }

    pub fn applied(&self) -> bool {
        matches!(self.outcome, SeedOutcome::Applied { .. })
    }

    /// Rows inserted by this step.
    pub fn count(&self) -> u64 {
        match self.outcome {
            SeedOutcome::Applied { inserted, .. } => inserted,
            _ => 0,
        }
    }
}

/// Run one step: check, prepare, wipe if stale, seed, report.
pub async fn apply_step(step: &dyn SeedStep, store: &dyn BootstrapStore) -> Result<SeedReport> {
    let dataset = step.dataset();

    let precondition = step.precondition(store).await?;
    if let Precondition::Satisfied { rows } = precondition {
        info!(target: "bootstrap.seed", dataset, rows, "dataset already seeded, skipping");
        return Ok(SeedReport::new(
            dataset,
            SeedOutcome::Skipped(SkipReason::AlreadySeeded { rows }),
        ));
    }

    step.prepare().await?;

    let replaced = match precondition {
        Precondition::Satisfied { .. } | Precondition::Unmet => None,
        Precondition::Stale { rows } => {
            warn!(
                target: "bootstrap.seed",
                dataset,
                rows,
                "dataset seeded in an outdated format, wiping before reseed"
            );
            step.wipe(store).await?;
            Some(rows)
        }
    };

    let batch = match step.seed(store).await? {
        Seeded::Inserted(batch) => batch,
        Seeded::DependencyUnmet(detail) => {
            warn!(target: "bootstrap.seed", dataset, %detail, "dependency unmet, skipping");
            return Ok(SeedReport::new(
                dataset,
                SeedOutcome::Skipped(SkipReason::DependencyUnmet { detail }),
            ));
        }
    };

    for failure in &batch.failures {
        error!(
            target: "bootstrap.seed",
            dataset,
            index = failure.index,
            record = %failure.label,
            error = %failure.error,
            "record insert failed"
        );
    }

    let failed = batch.failures.len() as u64;
    if failed == 0 {
        info!(target: "bootstrap.seed", dataset, inserted = batch.inserted, "dataset seeded");
    } else {
        warn!(
            target: "bootstrap.seed",
            dataset,
            inserted = batch.inserted,
            failed,
            "dataset partially seeded"
        );
    }
    debug!(target: "bootstrap.seed", dataset, ?replaced, "seed step finished");

    Ok(SeedReport::new(
        dataset,
        SeedOutcome::Applied {
            inserted: batch.inserted,
            failed,
            replaced,
        },
    ))
}

/// Count-based precondition shared by the "seed when empty" datasets.
pub(crate) fn empty_table(rows: i64) -> Precondition {
    if rows == 0 {
        Precondition::Unmet
    } else {
        Precondition::Satisfied { rows }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    use crate::memory::MemoryStore;
    use crate::ports::RecordFailure;

    struct Fixed {
        precondition: Precondition,
        seeded: Seeded,
    }

    #[async_trait]
    impl SeedStep for Fixed {
        fn dataset(&self) -> &'static str {
            "fixed"
        }

        async fn precondition(&self, _store: &dyn BootstrapStore) -> Result<Precondition> {
            Ok(self.precondition)
        }

        async fn seed(&self, _store: &dyn BootstrapStore) -> Result<Seeded> {
            Ok(self.seeded.clone())
        }
    }

    fn inserted(n: u64) -> Seeded {
        Seeded::Inserted(BatchOutcome {
            inserted: n,
            failures: vec![],
        })
    }

    #[tokio::test]
    async fn satisfied_precondition_skips() {
        let step = Fixed {
            precondition: Precondition::Satisfied { rows: 4 },
            seeded: inserted(4),
        };
        let report = apply_step(&step, &MemoryStore::new()).await.unwrap();
        assert_eq!(
            report.outcome,
            SeedOutcome::Skipped(SkipReason::AlreadySeeded { rows: 4 })
        );
        assert!(!report.applied());
        assert_eq!(report.count(), 0);
    }

    #[tokio::test]
    async fn record_failures_are_counted_not_fatal() {
        let step = Fixed {
            precondition: Precondition::Unmet,
            seeded: Seeded::Inserted(BatchOutcome {
                inserted: 2,
                failures: vec![RecordFailure::new(1, "row 1", "duplicate key")],
            }),
        };
        let report = apply_step(&step, &MemoryStore::new()).await.unwrap();
        assert_eq!(
            report.outcome,
            SeedOutcome::Applied {
                inserted: 2,
                failed: 1,
                replaced: None
            }
        );
        assert_eq!(report.count(), 2);
    }

    #[tokio::test]
    async fn stale_dataset_without_wipe_support_fails() {
        let step = Fixed {
            precondition: Precondition::Stale { rows: 3 },
            seeded: inserted(3),
        };
        let err = apply_step(&step, &MemoryStore::new()).await.unwrap_err();
        assert!(matches!(err, BootstrapError::Unsupported(_)));
    }

    struct Unreadable {
        wiped: AtomicBool,
    }

    #[async_trait]
    impl SeedStep for Unreadable {
        fn dataset(&self) -> &'static str {
            "unreadable"
        }

        async fn precondition(&self, _store: &dyn BootstrapStore) -> Result<Precondition> {
            Ok(Precondition::Stale { rows: 7 })
        }

        async fn prepare(&self) -> Result<()> {
            Err(BootstrapError::InvalidRecord("source missing".into()))
        }

        async fn wipe(&self, _store: &dyn BootstrapStore) -> Result<()> {
            self.wiped.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn seed(&self, _store: &dyn BootstrapStore) -> Result<Seeded> {
            Ok(inserted(7))
        }
    }

    #[tokio::test]
    async fn failed_prepare_never_wipes() {
        let step = Unreadable {
            wiped: AtomicBool::new(false),
        };
        let err = apply_step(&step, &MemoryStore::new()).await.unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidRecord(_)));
        assert!(!step.wiped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn dependency_unmet_is_a_skip() {
        let step = Fixed {
            precondition: Precondition::Unmet,
            seeded: Seeded::DependencyUnmet("no open programs".into()),
        };
        let report = apply_step(&step, &MemoryStore::new()).await.unwrap();
        assert_eq!(
            report.outcome,
            SeedOutcome::Skipped(SkipReason::DependencyUnmet {
                detail: "no open programs".into()
            })
        );
    }

    #[test]
    fn empty_table_precondition() {
        assert_eq!(empty_table(0), Precondition::Unmet);
        assert_eq!(empty_table(9), Precondition::Satisfied { rows: 9 });
    }
}
