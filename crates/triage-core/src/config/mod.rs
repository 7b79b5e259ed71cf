//! Server configuration with layered resolution.
//!
//! Resolution order (highest priority first):
//! 1. Caller overrides (applied via `apply_overrides`)
//! 2. Environment variables (`TRIAGE_*`)
//! 3. Project config (`triage.toml` in the data directory)
//! 4. Compiled defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Default grace period after which an abandoned run lock is reusable.
pub const DEFAULT_LOCK_GRACE_SECONDS: i64 = 30 * 60;

/// Per-product resource ceilings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProductConfig {
    /// Hard cap on distinct run names. `None` means unlimited.
    pub run_limit: Option<u64>,
    /// Hard cap on reports storable in one run. `None` means unlimited.
    pub report_limit: Option<u64>,
}

/// Mass-store pipeline knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Seconds after which an abandoned run lock may be taken over.
    pub lock_grace_seconds: i64,
    /// Background store worker threads.
    pub worker_count: usize,
    /// Milliseconds the shutdown drain loop waits for queued tasks.
    pub drain_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_grace_seconds: DEFAULT_LOCK_GRACE_SECONDS,
            worker_count: 2,
            drain_timeout_ms: 5_000,
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub product: ProductConfig,
    pub store: StoreConfig,
    /// Root directory for task-scoped scratch space.
    pub data_dir: Option<PathBuf>,
}

/// Caller overrides applied on top of file/env configuration.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub run_limit: Option<u64>,
    pub report_limit: Option<u64>,
    pub worker_count: Option<usize>,
}

impl ServerConfig {
    /// Load configuration with layered resolution (see module docs).
    pub fn load(root: &Path, overrides: Option<&ConfigOverrides>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let project_config_path = root.join("triage.toml");
        if project_config_path.exists() {
            Self::merge_toml_file(&mut config, &project_config_path)?;
        }

        Self::apply_env_overrides(&mut config);

        if let Some(ov) = overrides {
            Self::apply_overrides(&mut config, ov);
        }

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML string (for testing).
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| ConfigError::ParseError {
                path: "<string>".to_string(),
                message: e.to_string(),
            })?;
        Self::validate(&config)?;
        Ok(config)
    }

    fn merge_toml_file(config: &mut Self, path: &Path) -> Result<(), ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        *config = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    fn apply_env_overrides(config: &mut Self) {
        if let Some(v) = env_u64("TRIAGE_RUN_LIMIT") {
            config.product.run_limit = Some(v);
        }
        if let Some(v) = env_u64("TRIAGE_REPORT_LIMIT") {
            config.product.report_limit = Some(v);
        }
        if let Some(v) = env_u64("TRIAGE_LOCK_GRACE_SECONDS") {
            config.store.lock_grace_seconds = v as i64;
        }
        if let Some(v) = env_u64("TRIAGE_STORE_WORKERS") {
            config.store.worker_count = v as usize;
        }
    }

    fn apply_overrides(config: &mut Self, ov: &ConfigOverrides) {
        if let Some(v) = ov.run_limit {
            config.product.run_limit = Some(v);
        }
        if let Some(v) = ov.report_limit {
            config.product.report_limit = Some(v);
        }
        if let Some(v) = ov.worker_count {
            config.store.worker_count = v;
        }
    }

    /// Validate the final configuration values.
    pub fn validate(config: &Self) -> Result<(), ConfigError> {
        if config.store.lock_grace_seconds <= 0 {
            return Err(ConfigError::ValidationFailed {
                field: "store.lock_grace_seconds".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if config.store.worker_count == 0 {
            return Err(ConfigError::ValidationFailed {
                field: "store.worker_count".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if config.product.report_limit == Some(0) {
            return Err(ConfigError::ValidationFailed {
                field: "product.report_limit".to_string(),
                message: "must be positive when set".to_string(),
            });
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(ServerConfig::validate(&config).is_ok());
        assert_eq!(config.store.lock_grace_seconds, DEFAULT_LOCK_GRACE_SECONDS);
        assert!(config.product.report_limit.is_none());
    }

    #[test]
    fn toml_roundtrip() {
        let config = ServerConfig::from_toml(
            r#"
            [product]
            run_limit = 50
            report_limit = 100000

            [store]
            lock_grace_seconds = 600
            worker_count = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.product.run_limit, Some(50));
        assert_eq!(config.product.report_limit, Some(100000));
        assert_eq!(config.store.lock_grace_seconds, 600);
        assert_eq!(config.store.worker_count, 4);
    }

    #[test]
    fn zero_workers_rejected() {
        let err = ServerConfig::from_toml("[store]\nworker_count = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationFailed { .. }));
    }

    #[test]
    fn overrides_win() {
        let mut config = ServerConfig::default();
        ServerConfig::apply_overrides(
            &mut config,
            &ConfigOverrides {
                run_limit: Some(3),
                report_limit: None,
                worker_count: Some(8),
            },
        );
        assert_eq!(config.product.run_limit, Some(3));
        assert_eq!(config.store.worker_count, 8);
    }
}
