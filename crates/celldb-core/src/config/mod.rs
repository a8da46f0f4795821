use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;

use crate::error::{CellDbError, Result};

mod env;
mod file;

pub const DATABASE_PATH_ENV: &str = "CELLDB_DATABASE_PATH";
pub const MAX_OBSERVATIONS_ENV: &str = "CELLDB_MAX_OBSERVATIONS";
pub const RETENTION_DAYS_ENV: &str = "CELLDB_RETENTION_DAYS";
pub const AUTO_CONTRIBUTE_ENV: &str = "CELLDB_AUTO_CONTRIBUTE";
pub const CONTRIBUTION_INTERVAL_SECS_ENV: &str = "CELLDB_CONTRIBUTION_INTERVAL_SECS";
pub const MIN_ACCURACY_ENV: &str = "CELLDB_MIN_ACCURACY";
pub const MAINTENANCE_DEBOUNCE_MS_ENV: &str = "CELLDB_MAINTENANCE_DEBOUNCE_MS";

pub const DEFAULT_DATABASE_PATH: &str = "/tmp/celldb_cell_observations.sqlite3";
pub const DEFAULT_MAX_OBSERVATIONS: usize = 10_000;
pub const DEFAULT_RETENTION_DAYS: u32 = 30;
pub const MAX_RETENTION_DAYS: u32 = 36_500;
pub const DEFAULT_CONTRIBUTION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
pub const DEFAULT_MIN_ACCURACY_M: f64 = 100.0;
pub const DEFAULT_MAINTENANCE_DEBOUNCE: Duration = Duration::from_millis(250);

/// Options recognized by the observation database.
///
/// `auto_contribute` and `contribution_interval` are carried for the external
/// uploader; nothing in this crate reads them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellDbConfig {
    pub database_path: PathBuf,
    pub max_observations: usize,
    pub retention_days: u32,
    pub auto_contribute: bool,
    pub contribution_interval: Duration,
    /// Insert-time filter: fixes with a larger accuracy radius are dropped.
    pub min_accuracy: f64,
    pub maintenance_debounce: Duration,
}

impl Default for CellDbConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            max_observations: DEFAULT_MAX_OBSERVATIONS,
            retention_days: DEFAULT_RETENTION_DAYS,
            auto_contribute: false,
            contribution_interval: DEFAULT_CONTRIBUTION_INTERVAL,
            min_accuracy: DEFAULT_MIN_ACCURACY_M,
            maintenance_debounce: DEFAULT_MAINTENANCE_DEBOUNCE,
        }
    }
}

impl CellDbConfig {
    #[must_use]
    pub fn with_database_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.database_path = path.into();
        self
    }

    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides().validated()
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: file::CellDbConfigFile = toml::from_str(raw)?;
        file.apply(Self::default()).validated()
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Environment variables win over whatever the receiver already holds.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        Self {
            database_path: env::read_non_empty_env(DATABASE_PATH_ENV)
                .map_or(self.database_path, PathBuf::from),
            max_observations: env::read_env_usize(
                MAX_OBSERVATIONS_ENV,
                self.max_observations,
                1,
            ),
            retention_days: env::read_env_u32(RETENTION_DAYS_ENV, self.retention_days, 1),
            auto_contribute: env::read_env_bool(AUTO_CONTRIBUTE_ENV, self.auto_contribute),
            contribution_interval: env::read_env_u64(CONTRIBUTION_INTERVAL_SECS_ENV)
                .map_or(self.contribution_interval, Duration::from_secs),
            min_accuracy: env::read_env_f64(MIN_ACCURACY_ENV).unwrap_or(self.min_accuracy),
            maintenance_debounce: env::read_env_u64(MAINTENANCE_DEBOUNCE_MS_ENV)
                .map_or(self.maintenance_debounce, Duration::from_millis),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(CellDbError::Validation(
                "database_path must not be empty".to_string(),
            ));
        }
        if self.max_observations == 0 {
            return Err(CellDbError::Validation(
                "max_observations must be at least 1".to_string(),
            ));
        }
        if self.retention_days == 0 || self.retention_days > MAX_RETENTION_DAYS {
            return Err(CellDbError::Validation(format!(
                "retention_days must be between 1 and {MAX_RETENTION_DAYS}, got {}",
                self.retention_days
            )));
        }
        if !self.min_accuracy.is_finite() || self.min_accuracy <= 0.0 {
            return Err(CellDbError::Validation(format!(
                "min_accuracy must be a positive number of meters, got {}",
                self.min_accuracy
            )));
        }
        Ok(())
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    pub(crate) fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}
