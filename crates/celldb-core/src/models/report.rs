use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Observation;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StoreOutcome {
    Stored { id: i64 },
    Filtered { accuracy: f64, min_accuracy: f64 },
}

impl StoreOutcome {
    pub fn stored_id(self) -> Option<i64> {
        match self {
            Self::Stored { id } => Some(id),
            Self::Filtered { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationStats {
    pub total_observations: u64,
    pub contributed_observations: u64,
    pub unique_cells: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest: Option<DateTime<Utc>>,
}

impl ObservationStats {
    pub fn pending_observations(&self) -> u64 {
        self.total_observations
            .saturating_sub(self.contributed_observations)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub capacity_deleted: u64,
    pub retention_deleted: u64,
    pub remaining: u64,
    pub retention_cutoff: DateTime<Utc>,
    pub ran_at: DateTime<Utc>,
}

impl MaintenanceReport {
    pub fn deleted_total(&self) -> u64 {
        self.capacity_deleted.saturating_add(self.retention_deleted)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContributionSummary {
    pub total_observations: usize,
    pub unique_cells: usize,
    pub average_accuracy: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest: Option<DateTime<Utc>>,
}

/// Upload unit handed to the external uploader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContributionBatch {
    /// `YYYY-MM-DD` (UTC) of batch preparation.
    pub date: String,
    pub observations: Vec<Observation>,
    pub summary: ContributionSummary,
}

impl ContributionBatch {
    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.observations.iter().map(|obs| obs.id).collect()
    }
}
