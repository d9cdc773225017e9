//! Configuration management

use crate::graph::{GRCH37, GRCH38};
use crate::identity::GeneKeyStrategy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Default directory for dated fixture folders.
pub const DEFAULT_FIXTURE_DIR: &str = "./fixtures";

/// Default audit trail file.
pub const DEFAULT_AUDIT_LOG: &str = "./logs/panel_audit.jsonl";

/// Default reference build of exon regions.
pub const DEFAULT_EXON_REFERENCE: &str = GRCH37;

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 4;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub gene_key: GeneKeyStrategy,
    pub fixture_dir: PathBuf,
    pub audit_log: PathBuf,
    pub exon_reference: String,
    /// Tag stamped on clinical indication links
    pub ci_version: String,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Only needed when checking against a live store
    pub url: Option<String>,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Config {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let gene_key = match std::env::var("PANEL_GENE_KEY") {
            Ok(value) => value.parse()?,
            Err(_) => GeneKeyStrategy::default(),
        };

        let config = Config {
            gene_key,
            fixture_dir: std::env::var("PANEL_FIXTURE_DIR")
                .unwrap_or_else(|_| DEFAULT_FIXTURE_DIR.to_string())
                .into(),
            audit_log: std::env::var("PANEL_AUDIT_LOG")
                .unwrap_or_else(|_| DEFAULT_AUDIT_LOG.to_string())
                .into(),
            exon_reference: std::env::var("PANEL_EXON_REFERENCE")
                .unwrap_or_else(|_| DEFAULT_EXON_REFERENCE.to_string()),
            ci_version: std::env::var("PANEL_CI_VERSION").unwrap_or_else(|_| today()),
            database: DatabaseConfig {
                url: std::env::var("PANEL_DATABASE_URL").ok().filter(|url| !url.is_empty()),
                max_connections: std::env::var("PANEL_DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_MAX_CONNECTIONS),
                connect_timeout_secs: std::env::var("PANEL_DATABASE_CONNECT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.exon_reference != GRCH37 && self.exon_reference != GRCH38 {
            anyhow::bail!(
                "Exon reference must be {} or {}, got '{}'",
                GRCH37,
                GRCH38,
                self.exon_reference
            );
        }

        if self.ci_version.trim().is_empty() {
            anyhow::bail!("Clinical indication version tag cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.fixture_dir.as_os_str().is_empty() {
            anyhow::bail!("Fixture directory cannot be empty");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gene_key: GeneKeyStrategy::default(),
            fixture_dir: DEFAULT_FIXTURE_DIR.into(),
            audit_log: DEFAULT_AUDIT_LOG.into(),
            exon_reference: DEFAULT_EXON_REFERENCE.to_string(),
            ci_version: today(),
            database: DatabaseConfig {
                url: None,
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
            },
        }
    }
}

fn today() -> String {
    chrono::Local::now().format("%y%m%d").to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 6] = [
        "PANEL_GENE_KEY",
        "PANEL_FIXTURE_DIR",
        "PANEL_AUDIT_LOG",
        "PANEL_EXON_REFERENCE",
        "PANEL_CI_VERSION",
        "PANEL_DATABASE_URL",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn test_defaults() {
        clear_env();
        let config = Config::from_env().unwrap();
        assert_eq!(config.gene_key, GeneKeyStrategy::HgncId);
        assert_eq!(config.fixture_dir, PathBuf::from(DEFAULT_FIXTURE_DIR));
        assert_eq!(config.exon_reference, "GRCh37");
        assert_eq!(config.ci_version.len(), 6);
        assert!(config.database.url.is_none());
    }

    #[test]
    #[serial]
    fn test_environment_overrides() {
        clear_env();
        std::env::set_var("PANEL_GENE_KEY", "symbol");
        std::env::set_var("PANEL_CI_VERSION", "230401");
        std::env::set_var("PANEL_DATABASE_URL", "postgresql://localhost/panels");

        let config = Config::from_env().unwrap();
        assert_eq!(config.gene_key, GeneKeyStrategy::Symbol);
        assert_eq!(config.ci_version, "230401");
        assert_eq!(config.database.url.as_deref(), Some("postgresql://localhost/panels"));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_invalid_values_are_rejected() {
        clear_env();
        std::env::set_var("PANEL_GENE_KEY", "ensembl");
        assert!(Config::from_env().is_err());

        clear_env();
        std::env::set_var("PANEL_EXON_REFERENCE", "hg19");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("Exon reference"));
        clear_env();
    }
}
