mod estimate;
mod observation;
mod report;

pub use estimate::{EstimateMethod, LocationEstimate};
pub use observation::{
    CellKey, GpsFix, IdentityField, NewObservation, Observation, ParsedCell, ServingCell,
    SignalMetrics,
};
pub use report::{
    ContributionBatch, ContributionSummary, MaintenanceReport, ObservationStats, StoreOutcome,
};
