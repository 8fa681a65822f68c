//! Bootstrap configuration
//!
//! Reads config from env vars (a `.env` file is honoured by the binary):
//!   DATABASE_URL        : Postgres connection string
//!   DATABASE_POOL_SIZE  : max pool connections (default: 5)
//!   SCMS_SEED_SCRIPT    : catalog seed script path (default: embedded script)
//!   SCMS_BCRYPT_COST    : hash cost for seeded credentials
//!   SCMS_ADMIN_PASSWORD : initial administrator credential

use std::path::PathBuf;

/// Lowest and highest cost accepted by bcrypt.
const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// `None` selects the catalog script compiled into the binary.
    pub seed_script: Option<PathBuf>,
    pub bcrypt_cost: u32,
    pub admin_password: Option<String>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost:5432/scms".to_string(),
            max_connections: 5,
            seed_script: None,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            admin_password: None,
        }
    }
}

impl BootstrapConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup. Unset or
    /// unparsable values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bcrypt_cost = lookup("SCMS_BCRYPT_COST")
            .and_then(|s| s.trim().parse::<u32>().ok())
            .map(|cost| cost.clamp(MIN_BCRYPT_COST, MAX_BCRYPT_COST))
            .unwrap_or(defaults.bcrypt_cost);

        Self {
            database_url: lookup("DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: lookup("DATABASE_POOL_SIZE")
                .and_then(|s| s.trim().parse().ok())
                .unwrap_or(defaults.max_connections),
            seed_script: lookup("SCMS_SEED_SCRIPT")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            bcrypt_cost,
            admin_password: lookup("SCMS_ADMIN_PASSWORD").filter(|s| !s.is_empty()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = BootstrapConfig::from_lookup(|_| None);
        assert_eq!(config.database_url, "postgresql://localhost:5432/scms");
        assert_eq!(config.max_connections, 5);
        assert!(config.seed_script.is_none());
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert!(config.admin_password.is_none());
    }

    #[test]
    fn values_are_read_from_lookup() {
        let config = BootstrapConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgresql://db:5432/campus"),
            ("DATABASE_POOL_SIZE", "12"),
            ("SCMS_SEED_SCRIPT", "/etc/scms/programs.sql"),
            ("SCMS_BCRYPT_COST", "6"),
            ("SCMS_ADMIN_PASSWORD", "s3cret"),
        ]));
        assert_eq!(config.database_url, "postgresql://db:5432/campus");
        assert_eq!(config.max_connections, 12);
        assert_eq!(
            config.seed_script,
            Some(PathBuf::from("/etc/scms/programs.sql"))
        );
        assert_eq!(config.bcrypt_cost, 6);
        assert_eq!(config.admin_password.as_deref(), Some("s3cret"));
    }

    #[test]
    fn bcrypt_cost_is_clamped() {
        let low = BootstrapConfig::from_lookup(lookup_from(&[("SCMS_BCRYPT_COST", "1")]));
        assert_eq!(low.bcrypt_cost, 4);
        let high = BootstrapConfig::from_lookup(lookup_from(&[("SCMS_BCRYPT_COST", "99")]));
        assert_eq!(high.bcrypt_cost, 31);
    }

    #[test]
    fn garbage_values_fall_back() {
        let config = BootstrapConfig::from_lookup(lookup_from(&[
            ("DATABASE_POOL_SIZE", "lots"),
            ("SCMS_BCRYPT_COST", "high"),
            ("SCMS_SEED_SCRIPT", "   "),
            ("SCMS_ADMIN_PASSWORD", ""),
        ]));
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
        assert!(config.seed_script.is_none());
        assert!(config.admin_password.is_none());
    }
}
