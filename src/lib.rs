//! SCMS startup bootstrap.
//!
//! Brings the co-curricular program management database to a usable state
//! when the service starts:
//!
//! - **Schema evolution** ([`schema`]): additive columns, backfilled from
//!   existing data and tightened to NOT NULL once complete.
//! - **Seed steps** ([`seed`]): idempotent datasets (accounts, the program
//!   catalog, applications, surveys), each guarded by a precondition.
//! - **Orchestration** ([`bootstrap`]): runs both in order with per-step
//!   fault isolation and returns a [`BootstrapRun`] report.
//!
//! Storage is reached only through the [`ports`] traits. [`memory::MemoryStore`]
//! implements them in-process; the `database` feature adds
//! [`database::PgBootstrapStore`] on sqlx/Postgres.
//!
//! ```no_run
//! use scms_bootstrap::{format_bootstrap_run, Bootstrap, BootstrapConfig};
//! use scms_bootstrap::memory::MemoryStore;
//!
//! # async fn demo() -> scms_bootstrap::Result<()> {
//! let plan = Bootstrap::standard(&BootstrapConfig::from_env())?;
//! let run = plan.run(&MemoryStore::new()).await;
//! println!("{}", format_bootstrap_run(&run));
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod config;
pub mod credential;
#[cfg(feature = "database")]
pub mod database;
pub mod error;
pub mod memory;
pub mod model;
pub mod ports;
pub mod schema;
pub mod seed;

pub use bootstrap::{format_bootstrap_run, Bootstrap, BootstrapRun};
pub use config::BootstrapConfig;
pub use error::{BootstrapError, Result};
pub use ports::BootstrapStore;
