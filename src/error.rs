//! Error handling for the bootstrap subsystem
//!
//! Every fallible operation in the crate returns [`BootstrapError`]. The
//! orchestrator turns these into logged step outcomes; nothing here ever
//! escapes process startup.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, BootstrapError>;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credential hashing failed: {0}")]
    Credential(#[from] bcrypt::BcryptError),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("invalid bootstrap plan: {0}")]
    Plan(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("injected fault: {0}")]
    Injected(String),

    #[error("step panicked: {0}")]
    Panicked(String),

    #[error("internal: {0}")]
    Internal(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_plan() {
        let e = BootstrapError::Plan("applications depends on undeclared users".into());
        assert_eq!(
            e.to_string(),
            "invalid bootstrap plan: applications depends on undeclared users"
        );
    }

    #[test]
    fn display_io_includes_path() {
        let e = BootstrapError::Io {
            path: PathBuf::from("seeds/programs.sql"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
        };
        assert_eq!(
            e.to_string(),
            "failed to read seeds/programs.sql: no such file"
        );
    }

    #[test]
    fn display_internal() {
        let e = BootstrapError::Internal(anyhow::anyhow!("boom"));
        assert_eq!(e.to_string(), "internal: boom");
    }
}
