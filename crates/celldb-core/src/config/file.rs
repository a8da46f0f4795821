use std::time::Duration;

use serde::Deserialize;

use super::CellDbConfig;

/// On-disk shape of the config file. Every key is optional and falls back to
/// the value already present in the base config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(super) struct CellDbConfigFile {
    pub(super) database_path: Option<String>,
    pub(super) max_observations: Option<usize>,
    pub(super) retention_days: Option<u32>,
    pub(super) auto_contribute: Option<bool>,
    pub(super) contribution_interval_secs: Option<u64>,
    pub(super) min_accuracy: Option<f64>,
    pub(super) maintenance_debounce_ms: Option<u64>,
}

impl CellDbConfigFile {
    pub(super) fn apply(self, mut base: CellDbConfig) -> CellDbConfig {
        if let Some(path) = self.database_path {
            base.database_path = path.into();
        }
        if let Some(value) = self.max_observations {
            base.max_observations = value;
        }
        if let Some(value) = self.retention_days {
            base.retention_days = value;
        }
        if let Some(value) = self.auto_contribute {
            base.auto_contribute = value;
        }
        if let Some(secs) = self.contribution_interval_secs {
            base.contribution_interval = Duration::from_secs(secs);
        }
        if let Some(value) = self.min_accuracy {
            base.min_accuracy = value;
        }
        if let Some(ms) = self.maintenance_debounce_ms {
            base.maintenance_debounce = Duration::from_millis(ms);
        }
        base
    }
}
