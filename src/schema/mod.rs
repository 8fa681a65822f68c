//! Schema evolution: additive column migration with backfill.
//!
//! Each [`ColumnSpec`] is checked against live metadata and, when missing,
//! added as nullable, backfilled, then tightened to NOT NULL once no NULLs
//! remain. Columns are processed in declared order so a backfill may read a
//! column added earlier in the same run.
//!
//! Evolution never fails as a whole: each column gets its own
//! [`ColumnOutcome`] and the caller decides what a failure means downstream.

use serde::Serialize;
use tracing::{error, info, warn};

use crate::ports::SchemaStore;

mod columns;

pub use columns::program_schedule_columns;

/// SQL type of an evolved column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    Timestamp,
    Date,
    Integer,
    Text,
    Boolean,
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Timestamp => "TIMESTAMP",
            Self::Date => "DATE",
            Self::Integer => "INTEGER",
            Self::Text => "TEXT",
            Self::Boolean => "BOOLEAN",
        }
    }
}

/// How existing rows get a value for a freshly added column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BackfillRule {
    None,
    /// `column = source + days`, for rows where `source` is set.
    OffsetDays { source: &'static str, days: i64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ColumnRef {
    pub table: &'static str,
    pub column: &'static str,
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub table: &'static str,
    pub column: &'static str,
    pub column_type: ColumnType,
    pub backfill: BackfillRule,
    pub not_null: bool,
}

impl ColumnSpec {
    pub fn column_ref(&self) -> ColumnRef {
        ColumnRef {
            table: self.table,
            column: self.column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvolutionStage {
    Inspect,
    Add,
    Backfill,
    Verify,
    Tighten,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ColumnOutcome {
    /// Column already present. Its data and nullability are left alone.
    AlreadyApplied,
    /// Column was added by this run.
    Applied {
        backfilled: u64,
        tightened: bool,
    },
    Failed {
        stage: EvolutionStage,
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnReport {
    pub column: ColumnRef,
    #[serde(flatten)]
    pub outcome: ColumnOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EvolutionReport {
    pub columns: Vec<ColumnReport>,
}

impl EvolutionReport {
    /// The failure recorded for `column`, if its evolution failed.
    pub fn failure(&self, column: &ColumnRef) -> Option<&str> {
        self.columns
            .iter()
            .find(|c| &c.column == column)
            .and_then(|c| match &c.outcome {
                ColumnOutcome::Failed { error, .. } => Some(error.as_str()),
                _ => None,
            })
    }

    pub fn applied_count(&self) -> usize {
        self.columns
            .iter()
            .filter(|c| matches!(c.outcome, ColumnOutcome::Applied { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.columns
            .iter()
            .filter(|c| matches!(c.outcome, ColumnOutcome::Failed { .. }))
            .count()
    }

    pub fn is_noop(&self) -> bool {
        self.columns
            .iter()
            .all(|c| c.outcome == ColumnOutcome::AlreadyApplied)
    }
}

/// Bring every declared column to its target shape.
pub async fn evolve<S>(store: &S, columns: &[ColumnSpec]) -> EvolutionReport
where
    S: SchemaStore + ?Sized,
{
    let mut report = EvolutionReport::default();

    for spec in columns {
        let outcome = evolve_column(store, spec).await;
        let column = spec.column_ref();

        match &outcome {
            ColumnOutcome::AlreadyApplied => {
                info!(target: "bootstrap.schema", %column, "column already present, skipping");
            }
            ColumnOutcome::Applied {
                backfilled,
                tightened,
            } => {
                info!(
                    target: "bootstrap.schema",
                    %column,
                    backfilled,
                    tightened,
                    "column evolved"
                );
            }
            ColumnOutcome::Failed { stage, error } => {
                error!(
                    target: "bootstrap.schema",
                    %column,
                    ?stage,
                    error = %error,
                    "column evolution failed"
                );
            }
        }

        report.columns.push(ColumnReport { column, outcome });
    }

    report
}

async fn evolve_column<S>(store: &S, spec: &ColumnSpec) -> ColumnOutcome
where
    S: SchemaStore + ?Sized,
{
    let failed = |stage, error: crate::error::BootstrapError| ColumnOutcome::Failed {
        stage,
        error: error.to_string(),
    };

    // Existing columns are never touched, whatever their nullability.
    match store.inspect_column(spec.table, spec.column).await {
        Err(e) => return failed(EvolutionStage::Inspect, e),
        Ok(Some(_)) => return ColumnOutcome::AlreadyApplied,
        Ok(None) => {
            if let Err(e) = store.add_nullable_column(spec).await {
                return failed(EvolutionStage::Add, e);
            }
        }
    }

    let backfilled = match spec.backfill {
        BackfillRule::None => 0,
        BackfillRule::OffsetDays { .. } => match store.backfill(spec).await {
            Ok(n) => n,
            Err(e) => return failed(EvolutionStage::Backfill, e),
        },
    };

    if !spec.not_null {
        return ColumnOutcome::Applied {
            backfilled,
            tightened: false,
        };
    }

    let remaining = match store.count_nulls(spec.table, spec.column).await {
        Ok(n) => n,
        Err(e) => return failed(EvolutionStage::Verify, e),
    };
    if remaining > 0 {
        warn!(
            target: "bootstrap.schema",
            column = %spec.column_ref(),
            remaining,
            "rows still NULL after backfill, leaving column nullable"
        );
        return ColumnOutcome::Applied {
            backfilled,
            tightened: false,
        };
    }

    if let Err(e) = store.set_not_null(spec).await {
        return failed(EvolutionStage::Tighten, e);
    }

    ColumnOutcome::Applied {
        backfilled,
        tightened: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::ports::{ColumnState, SchemaStore};

    async fn baseline_store() -> MemoryStore {
        let store = MemoryStore::new();
        store.ensure_baseline().await.unwrap();
        store
    }

    #[tokio::test]
    async fn adds_backfills_and_tightens_in_order() {
        let store = baseline_store().await;
        store
            .push_program_window("Old program", (2024, 3, 1), (2024, 3, 10))
            .unwrap();

        let report = evolve(&store, &program_schedule_columns()).await;

        assert_eq!(report.applied_count(), 2);
        for c in &report.columns {
            assert_eq!(
                c.outcome,
                ColumnOutcome::Applied {
                    backfilled: 1,
                    tightened: true
                }
            );
        }
        let (start, end) = store.program_schedule(1).unwrap();
        assert_eq!(start.unwrap().to_string(), "2024-03-11 00:00:00");
        assert_eq!(end.unwrap().to_string(), "2024-03-25 00:00:00");
    }

    #[tokio::test]
    async fn second_run_is_a_noop() {
        let store = baseline_store().await;
        evolve(&store, &program_schedule_columns()).await;
        let before = store.schema_snapshot();

        let report = evolve(&store, &program_schedule_columns()).await;

        assert!(report.is_noop());
        assert_eq!(store.schema_snapshot(), before);
    }

    #[tokio::test]
    async fn inspect_failure_never_adds_blindly() {
        let store = baseline_store().await;
        store.fail("inspect_column:programs.program_start_date");

        let report = evolve(&store, &program_schedule_columns()).await;

        let start = &report.columns[0];
        assert!(matches!(
            start.outcome,
            ColumnOutcome::Failed {
                stage: EvolutionStage::Inspect,
                ..
            }
        ));
        store.clear_faults();
        assert!(store
            .inspect_column("programs", "program_start_date")
            .await
            .unwrap()
            .is_none());
        // The end date reads the missing start column, so its backfill fails too.
        assert!(matches!(
            report.columns[1].outcome,
            ColumnOutcome::Failed {
                stage: EvolutionStage::Backfill,
                ..
            }
        ));
        assert_eq!(report.failed_count(), 2);
    }

    #[tokio::test]
    async fn existing_nullable_column_is_left_untouched() {
        let store = baseline_store().await;
        for column in &program_schedule_columns() {
            store.add_nullable_column(column).await.unwrap();
        }
        let id = store
            .push_program_window("Old program", (2024, 3, 1), (2024, 3, 10))
            .unwrap();
        let before = store.schema_snapshot();

        let report = evolve(&store, &program_schedule_columns()).await;

        assert!(report.is_noop());
        assert_eq!(store.schema_snapshot(), before);
        assert_eq!(store.program_schedule(id).unwrap(), (None, None));
        assert_eq!(
            store
                .inspect_column("programs", "program_end_date")
                .await
                .unwrap(),
            Some(ColumnState { nullable: true })
        );
    }

    #[tokio::test]
    async fn failed_tighten_is_not_retried_next_run() {
        let store = baseline_store().await;
        store
            .push_program_window("Old program", (2024, 3, 1), (2024, 3, 10))
            .unwrap();
        store.fail("set_not_null:programs.program_end_date");

        let first = evolve(&store, &program_schedule_columns()).await;
        assert!(matches!(
            first.columns[1].outcome,
            ColumnOutcome::Failed {
                stage: EvolutionStage::Tighten,
                ..
            }
        ));

        store.clear_faults();
        let second = evolve(&store, &program_schedule_columns()).await;
        assert!(second.is_noop());
        assert_eq!(
            store
                .inspect_column("programs", "program_end_date")
                .await
                .unwrap(),
            Some(ColumnState { nullable: true })
        );
    }

    #[tokio::test]
    async fn null_sources_leave_column_nullable() {
        let store = baseline_store().await;
        store.push_program_without_window("Undated program").unwrap();

        let report = evolve(&store, &program_schedule_columns()).await;

        assert_eq!(
            report.columns[0].outcome,
            ColumnOutcome::Applied {
                backfilled: 0,
                tightened: false
            }
        );
        assert_eq!(
            store
                .inspect_column("programs", "program_start_date")
                .await
                .unwrap(),
            Some(ColumnState { nullable: true })
        );
    }

    #[test]
    fn report_failure_lookup() {
        let start = program_schedule_columns()[0].column_ref();
        let report = EvolutionReport {
            columns: vec![ColumnReport {
                column: start,
                outcome: ColumnOutcome::Failed {
                    stage: EvolutionStage::Add,
                    error: "permission denied".into(),
                },
            }],
        };
        assert_eq!(report.failure(&start), Some("permission denied"));
        assert!(!report.is_noop());
    }
}
