//! Read/mark contract for the external uploader.
//!
//! Two uploaders may read the same pending rows before either marks them;
//! marking is idempotent and the upload endpoint tolerates duplicates.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use crate::error::Result;
use crate::events::{CellDbEvent, EventSink};
use crate::models::{ContributionBatch, ContributionSummary, Observation};
use crate::state::SqliteObservationStore;

#[derive(Clone)]
pub struct ContributionSelector {
    store: SqliteObservationStore,
    sink: Arc<dyn EventSink>,
}

impl std::fmt::Debug for ContributionSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContributionSelector")
            .finish_non_exhaustive()
    }
}

impl ContributionSelector {
    pub fn new(store: SqliteObservationStore, sink: Arc<dyn EventSink>) -> Self {
        Self { store, sink }
    }

    pub fn query_uncontributed(&self, limit: usize) -> Result<Vec<Observation>> {
        self.store.query_uncontributed(limit)
    }

    /// Returns the number of rows that changed state; repeats count as zero.
    pub fn mark_contributed(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let newly_marked = self.store.mark_contributed(ids, Utc::now())?;
        tracing::info!(
            requested = ids.len(),
            newly_marked,
            "observations marked as contributed"
        );
        self.sink.emit(&CellDbEvent::ObservationsContributed {
            requested: ids.len(),
            newly_marked,
        });
        Ok(newly_marked)
    }

    pub fn prepare_batch(&self, limit: usize) -> Result<ContributionBatch> {
        let observations = self.store.query_uncontributed(limit)?;
        let summary = summarize(&observations);
        Ok(ContributionBatch {
            date: Utc::now().format("%Y-%m-%d").to_string(),
            observations,
            summary,
        })
    }
}

pub fn summarize(observations: &[Observation]) -> ContributionSummary {
    if observations.is_empty() {
        return ContributionSummary::default();
    }
    let unique_cells = observations
        .iter()
        .map(Observation::key)
        .collect::<HashSet<_>>()
        .len();
    let average_accuracy =
        observations.iter().map(|obs| obs.accuracy).sum::<f64>() / observations.len() as f64;
    ContributionSummary {
        total_observations: observations.len(),
        unique_cells,
        average_accuracy,
        oldest: observations.iter().map(|obs| obs.timestamp).min(),
        newest: observations.iter().map(|obs| obs.timestamp).max(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::events::testing::RecordingSink;
    use crate::models::{GpsFix, ServingCell};

    fn seeded_selector() -> (ContributionSelector, Arc<RecordingSink>, Vec<i64>) {
        let store = SqliteObservationStore::open_in_memory().expect("open");
        let t0 = Utc
            .with_ymd_and_hms(2026, 5, 1, 8, 0, 0)
            .single()
            .expect("time");
        let mut ids = Vec::new();
        for (i, (cell_id, accuracy)) in [("11", 10.0), ("11", 20.0), ("12", 30.0)]
            .into_iter()
            .enumerate()
        {
            let cell = ServingCell::new(cell_id, "240", "1", "23", "LTE").parse();
            let offset = i64::try_from(i).expect("small");
            ids.push(
                store
                    .insert_observation_at(
                        &GpsFix::new(59.0, 18.0, accuracy, "test"),
                        &cell,
                        t0 + Duration::minutes(offset),
                    )
                    .expect("insert"),
            );
        }
        let sink = Arc::new(RecordingSink::default());
        (ContributionSelector::new(store, sink.clone()), sink, ids)
    }

    #[test]
    fn batch_summarizes_pending_rows() {
        let (selector, _sink, ids) = seeded_selector();
        let batch = selector.prepare_batch(10).expect("batch");
        assert_eq!(batch.ids(), ids);
        assert_eq!(batch.summary.total_observations, 3);
        assert_eq!(batch.summary.unique_cells, 2);
        assert!((batch.summary.average_accuracy - 20.0).abs() < 1e-9);
        assert!(batch.summary.oldest < batch.summary.newest);
        assert_eq!(batch.date.len(), 10);
    }

    #[test]
    fn marking_twice_reports_zero_on_repeat() {
        let (selector, sink, ids) = seeded_selector();
        assert_eq!(selector.mark_contributed(&ids[..2]).expect("mark"), 2);
        assert_eq!(selector.mark_contributed(&ids[..2]).expect("re-mark"), 0);
        assert_eq!(selector.mark_contributed(&[]).expect("empty"), 0);

        let pending = selector.query_uncontributed(10).expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, ids[2]);

        let contributed_events: Vec<_> = sink
            .events()
            .into_iter()
            .filter(|event| matches!(event, CellDbEvent::ObservationsContributed { .. }))
            .collect();
        assert_eq!(contributed_events.len(), 2);
    }

    #[test]
    fn empty_batch_has_default_summary() {
        let (selector, _sink, ids) = seeded_selector();
        selector.mark_contributed(&ids).expect("mark all");
        let batch = selector.prepare_batch(10).expect("batch");
        assert!(batch.is_empty());
        assert_eq!(batch.summary, ContributionSummary::default());
    }
}
