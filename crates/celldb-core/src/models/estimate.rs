use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateMethod {
    WeightedAverage,
}

impl EstimateMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WeightedAverage => "weighted_average",
        }
    }
}

/// Position derived from stored observations of one cell. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationEstimate {
    pub latitude: f64,
    pub longitude: f64,
    /// Root-mean-square distance (meters) of the observations from the centroid.
    pub accuracy_m: f64,
    /// Mean squared distance (square meters) of the observations from the centroid.
    pub spread_m2: f64,
    /// In `[0, 1]`.
    pub confidence: f64,
    pub observation_count: usize,
    pub method: EstimateMethod,
    pub source: String,
    pub valid: bool,
    pub computed_at: DateTime<Utc>,
}
