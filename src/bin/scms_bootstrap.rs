//! scms-bootstrap: bring an SCMS database to a usable state.
//!
//! Reads config from env vars (and `.env`), see `BootstrapConfig`. Flags
//! override the environment.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use scms_bootstrap::database::{mask_database_url, DatabaseConfig, DatabaseManager};
use scms_bootstrap::memory::MemoryStore;
use scms_bootstrap::{format_bootstrap_run, Bootstrap, BootstrapConfig, BootstrapRun};

/// Run schema evolution and seed data against the SCMS database
#[derive(Parser, Debug)]
#[command(name = "scms-bootstrap")]
#[command(about = "Evolve the SCMS schema and seed initial data")]
struct Args {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Program catalog script (default: the script built into the binary)
    #[arg(long, env = "SCMS_SEED_SCRIPT")]
    seed_script: Option<PathBuf>,

    /// Run against an empty in-memory store instead of the database
    #[arg(long, short = 'n')]
    dry_run: bool,

    /// Print the run report as JSON
    #[arg(long)]
    json: bool,

    /// Exit non-zero when any column, step or record failed
    #[arg(long)]
    strict: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,scms_bootstrap=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = BootstrapConfig::from_env();
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    if args.seed_script.is_some() {
        config.seed_script = args.seed_script;
    }

    let plan = Bootstrap::standard(&config).context("building bootstrap plan")?;

    let run = if args.dry_run {
        tracing::info!(target: "bootstrap", "dry run against an in-memory store");
        plan.run(&MemoryStore::new()).await
    } else {
        let db = DatabaseManager::new(DatabaseConfig::from(&config))
            .await
            .with_context(|| {
                format!(
                    "connecting to {}",
                    mask_database_url(&config.database_url)
                )
            })?;
        let run = plan.run(&db.store()).await;
        db.close().await;
        run
    };

    print_run(&run, args.json)?;

    if args.strict && !run.is_clean() {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

fn print_run(run: &BootstrapRun, json: bool) -> Result<()> {
    if json {
        let text = serde_json::to_string_pretty(run).context("serialising run report")?;
        println!("{text}");
    } else {
        println!("{}", format_bootstrap_run(run));
    }
    Ok(())
}
