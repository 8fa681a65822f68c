//! Database connection and management module
//!
//! Connection pooling for the Postgres store, plus [`PgBootstrapStore`], the
//! sqlx implementation of every bootstrap port.

use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::config::BootstrapConfig;

mod pg_store;

pub use pg_store::PgBootstrapStore;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub connection_timeout: Duration,
    pub idle_timeout: Option<Duration>,
}

impl From<&BootstrapConfig> for DatabaseConfig {
    fn from(config: &BootstrapConfig) -> Self {
        Self {
            database_url: config.database_url.clone(),
            max_connections: config.max_connections.max(1),
            connection_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
        }
    }
}

/// Database connection manager
pub struct DatabaseManager {
    pool: PgPool,
}

impl DatabaseManager {
    pub async fn new(config: DatabaseConfig) -> Result<Self, sqlx::Error> {
        info!(
            target: "bootstrap",
            url = %mask_database_url(&config.database_url),
            max_connections = config.max_connections,
            "connecting to database"
        );

        let mut pool_options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout);

        if let Some(idle_timeout) = config.idle_timeout {
            pool_options = pool_options.idle_timeout(idle_timeout);
        }

        let pool = pool_options
            .connect(&config.database_url)
            .await
            .map_err(|e| {
                warn!(target: "bootstrap", "failed to connect to database: {}", e);
                e
            })?;

        let manager = Self { pool };
        manager.test_connection().await?;
        Ok(manager)
    }

    /// A bootstrap store sharing this manager's pool.
    pub fn store(&self) -> PgBootstrapStore {
        PgBootstrapStore::new(self.pool.clone())
    }

    /// Round-trip a trivial query through the pool.
    pub async fn test_connection(&self) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| ())
    }

    pub async fn close(self) {
        info!(target: "bootstrap", "closing database connection pool");
        self.pool.close().await;
    }
}

/// Mask the password in a database URL for logging
pub fn mask_database_url(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        // Unparsable: show nothing that could hold a credential.
        Err(_) => "***".to_string(),
    }
}
