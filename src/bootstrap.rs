//! Bootstrap orchestrator.
//!
//! Runs once at process start: baseline tables, then schema evolution, then
//! every seed step in plan order. Each phase sits behind a fault boundary so
//! an error or panic in one is logged and recorded, and the rest still run.
//! [`Bootstrap::run`] therefore has no error return.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::BootstrapConfig;
use crate::error::{BootstrapError, Result};
use crate::ports::BootstrapStore;
use crate::schema::{
    evolve, program_schedule_columns, ColumnOutcome, ColumnReport, ColumnSpec, EvolutionReport,
    EvolutionStage,
};
use crate::seed::{
    apply_step, ApplicationSeed, ProgramCatalogSeed, ScriptSource, SeedOutcome, SeedReport,
    SeedStep, SkipReason, SurveySeed, UserSeed,
};

/// An ordered bootstrap plan.
pub struct Bootstrap {
    columns: Vec<ColumnSpec>,
    steps: Vec<Box<dyn SeedStep>>,
}

impl std::fmt::Debug for Bootstrap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bootstrap")
            .field("columns", &self.columns)
            .field("steps", &self.datasets())
            .finish()
    }
}

impl Bootstrap {
    /// Build a plan, rejecting duplicate datasets, dependencies that are not
    /// declared earlier, and required columns missing from `columns`.
    pub fn new(columns: Vec<ColumnSpec>, steps: Vec<Box<dyn SeedStep>>) -> Result<Self> {
        validate_plan(&columns, &steps)?;
        Ok(Self { columns, steps })
    }

    /// Program schedule columns, then users, programs, applications, surveys.
    pub fn standard(config: &BootstrapConfig) -> Result<Self> {
        let catalog = match &config.seed_script {
            Some(path) => ScriptSource::File(path.clone()),
            None => ScriptSource::embedded(),
        };
        Self::new(
            program_schedule_columns(),
            vec![
                Box::new(UserSeed::new(
                    config.bcrypt_cost,
                    config.admin_password.clone(),
                )),
                Box::new(ProgramCatalogSeed::new(catalog)),
                Box::new(ApplicationSeed::new()),
                Box::new(SurveySeed::new()),
            ],
        )
    }

    pub fn datasets(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.dataset()).collect()
    }

    pub async fn run(&self, store: &dyn BootstrapStore) -> BootstrapRun {
        info!(
            target: "bootstrap",
            columns = self.columns.len(),
            datasets = ?self.datasets(),
            "starting bootstrap"
        );

        let baseline_error = match guarded(store.ensure_baseline()).await {
            Ok(()) => None,
            Err(e) => {
                error!(target: "bootstrap", error = %e, "baseline tables not ensured, continuing");
                Some(e.to_string())
            }
        };

        let evolution = match guarded(async { Ok(evolve(store, &self.columns).await) }).await {
            Ok(report) => report,
            Err(e) => {
                error!(target: "bootstrap", error = %e, "schema evolution aborted, continuing");
                abandoned(&self.columns, &e)
            }
        };

        let mut steps = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let dataset = step.dataset();

            if let Some(skip) = missing_column(step.as_ref(), &evolution) {
                warn!(
                    target: "bootstrap",
                    dataset,
                    ?skip,
                    "required column unavailable, skipping dataset"
                );
                steps.push(SeedReport::new(dataset, SeedOutcome::Skipped(skip)));
                continue;
            }

            let report = match guarded(apply_step(step.as_ref(), store)).await {
                Ok(report) => report,
                Err(e) => {
                    error!(
                        target: "bootstrap",
                        dataset,
                        error = %e,
                        "seed step failed, continuing"
                    );
                    SeedReport::new(
                        dataset,
                        SeedOutcome::Failed {
                            error: e.to_string(),
                        },
                    )
                }
            };
            steps.push(report);
        }

        let run = BootstrapRun {
            baseline_error,
            evolution,
            steps,
        };
        info!(
            target: "bootstrap",
            columns_applied = run.evolution.applied_count(),
            columns_failed = run.evolution.failed_count(),
            rows_inserted = run.rows_inserted(),
            steps_failed = run.failed_steps(),
            "bootstrap finished"
        );
        run
    }
}

fn validate_plan(columns: &[ColumnSpec], steps: &[Box<dyn SeedStep>]) -> Result<()> {
    let mut declared: Vec<&'static str> = Vec::with_capacity(steps.len());

    for step in steps {
        let dataset = step.dataset();
        if declared.contains(&dataset) {
            return Err(BootstrapError::Plan(format!(
                "dataset '{dataset}' declared twice"
            )));
        }
        if let Some(dep) = step.depends_on().iter().find(|d| !declared.contains(d)) {
            return Err(BootstrapError::Plan(format!(
                "'{dataset}' depends on '{dep}', which is not declared before it"
            )));
        }
        if let Some(col) = step
            .required_columns()
            .into_iter()
            .find(|c| !columns.iter().any(|spec| spec.column_ref() == *c))
        {
            return Err(BootstrapError::Plan(format!(
                "'{dataset}' requires column {col}, which is not evolved"
            )));
        }
        declared.push(dataset);
    }
    Ok(())
}

/// Skip reason when any column the step writes failed to evolve.
fn missing_column(step: &dyn SeedStep, evolution: &EvolutionReport) -> Option<SkipReason> {
    step.required_columns().into_iter().find_map(|column| {
        evolution
            .failure(&column)
            .map(|error| SkipReason::MissingColumn {
                column: column.to_string(),
                error: error.to_string(),
            })
    })
}

/// Report for an evolution pass that never completed.
fn abandoned(columns: &[ColumnSpec], error: &BootstrapError) -> EvolutionReport {
    EvolutionReport {
        columns: columns
            .iter()
            .map(|spec| ColumnReport {
                column: spec.column_ref(),
                outcome: ColumnOutcome::Failed {
                    stage: EvolutionStage::Inspect,
                    error: error.to_string(),
                },
            })
            .collect(),
    }
}

/// Await `fut`, turning a panic into [`BootstrapError::Panicked`].
async fn guarded<T, F>(fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(BootstrapError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// Run report
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootstrapRun {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline_error: Option<String>,
    pub evolution: EvolutionReport,
    pub steps: Vec<SeedReport>,
}

impl BootstrapRun {
    pub fn step(&self, dataset: &str) -> Option<&SeedReport> {
        self.steps.iter().find(|s| s.dataset == dataset)
    }

    pub fn rows_inserted(&self) -> u64 {
        self.steps.iter().map(SeedReport::count).sum()
    }

    pub fn failed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, SeedOutcome::Failed { .. }))
            .count()
    }

    /// Nothing failed anywhere: baseline, columns, steps or single records.
    pub fn is_clean(&self) -> bool {
        self.baseline_error.is_none()
            && self.evolution.failed_count() == 0
            && self.steps.iter().all(|s| match s.outcome {
                SeedOutcome::Applied { failed, .. } => failed == 0,
                SeedOutcome::Skipped(_) => true,
                SeedOutcome::Failed { .. } => false,
            })
    }
}

/// Terminal summary of a run.
pub fn format_bootstrap_run(run: &BootstrapRun) -> String {
    let mut lines = Vec::new();

    lines.push("── Bootstrap Report ────────────────────────────────".into());
    if let Some(error) = &run.baseline_error {
        lines.push(format!("  baseline: FAILED ({error})"));
    }

    lines.push("  Schema".into());
    for c in &run.evolution.columns {
        let detail = match &c.outcome {
            ColumnOutcome::AlreadyApplied => "already applied".to_string(),
            ColumnOutcome::Applied {
                backfilled,
                tightened,
            } => format!(
                "added, {backfilled} rows backfilled{}",
                if *tightened { ", NOT NULL" } else { ", left nullable" }
            ),
            ColumnOutcome::Failed { stage, error } => format!("FAILED at {stage:?}: {error}"),
        };
        lines.push(format!("    {:<34} {detail}", c.column.to_string()));
    }

    lines.push("  Seed data".into());
    for s in &run.steps {
        let detail = match &s.outcome {
            SeedOutcome::Applied {
                inserted,
                failed,
                replaced,
            } => {
                let mut d = format!("{inserted} inserted");
                if *failed > 0 {
                    d.push_str(&format!(", {failed} failed"));
                }
                if let Some(rows) = replaced {
                    d.push_str(&format!(", replaced {rows} stale rows"));
                }
                d
            }
            SeedOutcome::Skipped(SkipReason::AlreadySeeded { rows }) => {
                format!("skipped, {rows} rows present")
            }
            SeedOutcome::Skipped(SkipReason::DependencyUnmet { detail }) => {
                format!("skipped, {detail}")
            }
            SeedOutcome::Skipped(SkipReason::MissingColumn { column, .. }) => {
                format!("skipped, column {column} unavailable")
            }
            SeedOutcome::Failed { error } => format!("FAILED: {error}"),
        };
        lines.push(format!("    {:<34} {detail}", s.dataset));
    }

    lines.push(format!("  Rows inserted:                   {}", run.rows_inserted()));

    lines.join("\n")
}
