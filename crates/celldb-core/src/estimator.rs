//! Weighted-centroid position estimate for a single cell identity.
//!
//! Each stored fix is weighted by `1 / (accuracy + 1)`. The spread is the mean
//! squared great-circle distance of the fixes from the centroid; its square
//! root is reported as `accuracy_m` so that it is comparable with GPS accuracy.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{CellDbError, Result};
use crate::events::{CellDbEvent, EventSink};
use crate::models::{CellKey, EstimateMethod, LocationEstimate, Observation};
use crate::state::SqliteObservationStore;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;
pub const ESTIMATE_SOURCE: &str = "local_database";

const COUNT_HALF_CONFIDENCE_OBSERVATIONS: f64 = 10.0;
const ZERO_CONFIDENCE_ACCURACY_M: f64 = 1000.0;

#[derive(Clone)]
pub struct LocationEstimator {
    store: SqliteObservationStore,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for LocationEstimator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationEstimator").finish_non_exhaustive()
    }
}

impl LocationEstimator {
    pub fn new(store: SqliteObservationStore, sink: Arc<dyn EventSink>) -> Self {
        Self { store, sink }
    }

    pub fn estimate(&self, key: CellKey) -> Result<LocationEstimate> {
        let observations = self.store.query_by_cell(key)?;
        let Some(estimate) = estimate_from(&observations, Utc::now()) else {
            self.sink.emit(&CellDbEvent::EstimateMiss { cell: key });
            return Err(CellDbError::NotFound(format!(
                "no observations for cell {key}"
            )));
        };

        tracing::debug!(
            cell = %key,
            observations = estimate.observation_count,
            confidence = estimate.confidence,
            accuracy_m = estimate.accuracy_m,
            "cell location estimated"
        );
        self.sink.emit(&CellDbEvent::EstimateComputed {
            cell: key,
            observation_count: estimate.observation_count,
            confidence: estimate.confidence,
        });
        Ok(estimate)
    }
}

/// Returns `None` for an empty slice.
pub fn estimate_from(
    observations: &[Observation],
    computed_at: DateTime<Utc>,
) -> Option<LocationEstimate> {
    let first = observations.first()?;

    // Accumulate offsets from the first fix so identical coordinates reproduce
    // that coordinate bit for bit.
    let mut total_weight = 0.0;
    let mut lat_offset = 0.0;
    let mut lon_offset = 0.0;
    for obs in observations {
        let weight = observation_weight(obs.accuracy);
        total_weight += weight;
        lat_offset += (obs.latitude - first.latitude) * weight;
        lon_offset += (obs.longitude - first.longitude) * weight;
    }
    let latitude = first.latitude + lat_offset / total_weight;
    let longitude = first.longitude + lon_offset / total_weight;

    let count = observations.len();
    let spread_m2 = if count == 1 {
        0.0
    } else {
        let sum_sq: f64 = observations
            .iter()
            .map(|obs| {
                let distance =
                    haversine_distance_m(latitude, longitude, obs.latitude, obs.longitude);
                distance * distance
            })
            .sum();
        sum_sq / count as f64
    };

    let average_accuracy =
        observations.iter().map(|obs| obs.accuracy).sum::<f64>() / count as f64;

    Some(LocationEstimate {
        latitude,
        longitude,
        accuracy_m: spread_m2.sqrt(),
        spread_m2,
        confidence: confidence(count, average_accuracy),
        observation_count: count,
        method: EstimateMethod::WeightedAverage,
        source: ESTIMATE_SOURCE.to_string(),
        valid: true,
        computed_at,
    })
}

pub fn observation_weight(accuracy: f64) -> f64 {
    1.0 / (accuracy + 1.0)
}

/// Mean of a count factor (0.5 at ten fixes, saturating toward 1) and an
/// accuracy factor (zero at an average of 1000 m or worse), clamped to `[0, 1]`.
pub fn confidence(observation_count: usize, average_accuracy: f64) -> f64 {
    if observation_count == 0 {
        return 0.0;
    }
    let n = observation_count as f64;
    let count_factor = 1.0 - 1.0 / (1.0 + n / COUNT_HALF_CONFIDENCE_OBSERVATIONS);
    let accuracy_factor = (1.0 - average_accuracy / ZERO_CONFIDENCE_ACCURACY_M).max(0.0);
    ((count_factor + accuracy_factor) / 2.0).clamp(0.0, 1.0)
}

/// Great-circle distance in meters (haversine).
pub fn haversine_distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
    EARTH_RADIUS_M * c
}
