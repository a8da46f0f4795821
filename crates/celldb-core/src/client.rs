use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::config::CellDbConfig;
use crate::contribution::ContributionSelector;
use crate::error::{CellDbError, Result};
use crate::estimator::LocationEstimator;
use crate::events::{CellDbEvent, EventSink, NoopEventSink};
use crate::maintenance::{MaintenanceCounters, MaintenancePolicy, MaintenanceWorker, run_sweep};
use crate::models::{
    CellKey, ContributionBatch, GpsFix, LocationEstimate, MaintenanceReport, NewObservation,
    Observation, ObservationStats, ServingCell, StoreOutcome,
};
use crate::state::SqliteObservationStore;

/// Observation database for one device: store, estimator, uploader contract
/// and the background maintenance worker, wired from one explicit config.
#[derive(Clone)]
pub struct CellDatabase {
    config: Arc<CellDbConfig>,
    state: SqliteObservationStore,
    estimator: LocationEstimator,
    contribution: ContributionSelector,
    maintenance: Arc<MaintenanceWorker>,
    sink: Arc<dyn EventSink>,
    parse_fallbacks: Arc<AtomicU64>,
}

impl std::fmt::Debug for CellDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellDatabase")
            .field("database_path", &self.config.database_path)
            .finish_non_exhaustive()
    }
}

impl CellDatabase {
    pub fn open(config: CellDbConfig) -> Result<Self> {
        Self::open_with_sink(config, Arc::new(NoopEventSink))
    }

    pub fn open_with_sink(config: CellDbConfig, sink: Arc<dyn EventSink>) -> Result<Self> {
        config.validate()?;
        let state = SqliteObservationStore::open(&config.database_path)?;
        let maintenance = MaintenanceWorker::spawn(
            state.clone(),
            MaintenancePolicy::from_config(&config),
            config.maintenance_debounce,
            Arc::clone(&sink),
        )?;

        tracing::info!(
            database_path = %config.database_path.display(),
            max_observations = config.max_observations,
            retention_days = config.retention_days,
            min_accuracy = config.min_accuracy,
            "cell observation database opened"
        );

        Ok(Self {
            estimator: LocationEstimator::new(state.clone(), Arc::clone(&sink)),
            contribution: ContributionSelector::new(state.clone(), Arc::clone(&sink)),
            maintenance: Arc::new(maintenance),
            config: Arc::new(config),
            state,
            sink,
            parse_fallbacks: Arc::new(AtomicU64::new(0)),
        })
    }

    pub fn config(&self) -> &CellDbConfig {
        &self.config
    }

    pub fn state(&self) -> &SqliteObservationStore {
        &self.state
    }

    pub fn store(&self, observation: &NewObservation) -> Result<StoreOutcome> {
        self.store_observation(&observation.fix, observation.cell.as_ref())
    }

    /// Inserts one fix for the serving cell unless the fix is less accurate
    /// than `min_accuracy`, in which case nothing is written and
    /// [`StoreOutcome::Filtered`] is returned. A successful insert signals the
    /// maintenance worker.
    pub fn store_observation(
        &self,
        fix: &GpsFix,
        cell: Option<&ServingCell>,
    ) -> Result<StoreOutcome> {
        let Some(cell) = cell else {
            return Err(CellDbError::MissingInput(
                "no serving cell information available".to_string(),
            ));
        };

        let min_accuracy = self.config.min_accuracy;
        if !passes_accuracy_filter(fix.accuracy, min_accuracy) {
            tracing::debug!(
                accuracy = fix.accuracy,
                min_accuracy,
                "cell observation skipped: accuracy too low"
            );
            self.sink.emit(&CellDbEvent::ObservationFiltered {
                accuracy: fix.accuracy,
                min_accuracy,
            });
            return Ok(StoreOutcome::Filtered {
                accuracy: fix.accuracy,
                min_accuracy,
            });
        }

        let parsed = cell.parse();
        for (field, raw) in &parsed.fallbacks {
            self.parse_fallbacks.fetch_add(1, Ordering::AcqRel);
            tracing::warn!(
                field = field.as_str(),
                raw = %raw,
                "unparsable cell identity field stored as zero"
            );
            self.sink.emit(&CellDbEvent::IdentityParseFallback {
                field: *field,
                raw: raw.clone(),
            });
        }

        let id = self
            .state
            .insert_observation_at(fix, &parsed, Utc::now())
            .inspect_err(|err| tracing::error!(error = %err, "failed to store cell observation"))?;

        tracing::debug!(
            id,
            cell = %parsed.key,
            gps_accuracy = fix.accuracy,
            gps_source = %fix.source,
            "cell observation stored"
        );
        self.sink.emit(&CellDbEvent::ObservationStored {
            id,
            cell: parsed.key,
            accuracy: fix.accuracy,
        });
        self.maintenance.signal();
        Ok(StoreOutcome::Stored { id })
    }

    pub fn query_by_cell(
        &self,
        cell_id: i64,
        mcc: i64,
        mnc: i64,
        lac: i64,
    ) -> Result<Vec<Observation>> {
        self.state.query_by_cell(CellKey::new(cell_id, mcc, mnc, lac))
    }

    pub fn estimate(
        &self,
        cell_id: i64,
        mcc: i64,
        mnc: i64,
        lac: i64,
    ) -> Result<LocationEstimate> {
        self.estimator.estimate(CellKey::new(cell_id, mcc, mnc, lac))
    }

    pub fn query_uncontributed(&self, limit: usize) -> Result<Vec<Observation>> {
        self.contribution.query_uncontributed(limit)
    }

    pub fn mark_contributed(&self, ids: &[i64]) -> Result<usize> {
        self.contribution.mark_contributed(ids)
    }

    pub fn prepare_contribution_batch(&self, limit: usize) -> Result<ContributionBatch> {
        self.contribution.prepare_batch(limit)
    }

    pub fn statistics(&self) -> Result<ObservationStats> {
        self.state.statistics()
    }

    /// Runs one capacity + retention sweep on the calling thread.
    pub fn run_maintenance_now(&self) -> Result<MaintenanceReport> {
        let report = run_sweep(
            &self.state,
            MaintenancePolicy::from_config(&self.config),
            Utc::now(),
        )?;
        self.sink.emit(&CellDbEvent::MaintenanceCompleted(report.clone()));
        Ok(report)
    }

    pub fn maintenance_counters(&self) -> MaintenanceCounters {
        self.maintenance.counters()
    }

    /// Number of identity fields that were stored as zero because they did not parse.
    pub fn parse_fallback_count(&self) -> u64 {
        self.parse_fallbacks.load(Ordering::Acquire)
    }

    /// Stops the maintenance worker for every clone of this handle and drops
    /// this handle's storage reference. A signaled sweep still runs without
    /// waiting out the debounce window, but close does not wait for it; a
    /// process that exits right after close may cut it short.
    pub fn close(self) -> Result<()> {
        self.maintenance.shutdown()?;
        tracing::info!(
            database_path = %self.config.database_path.display(),
            "cell observation database closed"
        );
        Ok(())
    }
}

/// Accepts finite accuracies in `(-1, min_accuracy]`; at `-1` and below the
/// estimator weight `1 / (accuracy + 1)` is undefined or negative.
fn passes_accuracy_filter(accuracy: f64, min_accuracy: f64) -> bool {
    accuracy.is_finite() && accuracy > -1.0 && accuracy <= min_accuracy
}
