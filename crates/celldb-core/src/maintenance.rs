//! Capacity and retention sweeps run by one dedicated worker thread.
//!
//! Inserts signal the worker through a bounded channel with room for a single
//! pending signal; a signal that finds the slot occupied is coalesced into the
//! sweep that is already pending. The worker debounces on the trailing edge:
//! it sweeps once no signal has arrived for the debounce window, or once
//! `MAX_DEBOUNCE_FACTOR` windows have passed since the first signal.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::CellDbConfig;
use crate::error::{CellDbError, Result};
use crate::events::{CellDbEvent, EventSink};
use crate::models::MaintenanceReport;
use crate::state::SqliteObservationStore;

const MAX_DEBOUNCE_FACTOR: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaintenancePolicy {
    pub max_observations: usize,
    pub retention: chrono::Duration,
}

impl MaintenancePolicy {
    pub fn from_config(config: &CellDbConfig) -> Self {
        Self {
            max_observations: config.max_observations,
            retention: config.retention(),
        }
    }
}

/// Runs both trims. The retention trim runs even when the capacity trim fails;
/// the first failure is returned after both have been attempted.
///
/// A retention window reaching past the earliest representable time deletes
/// nothing by age.
pub fn run_sweep(
    store: &SqliteObservationStore,
    policy: MaintenancePolicy,
    now: DateTime<Utc>,
) -> Result<MaintenanceReport> {
    let capacity = store.trim_capacity(policy.max_observations);
    if let Err(err) = &capacity {
        tracing::warn!(error = %err, "capacity trim failed");
    }
    let (retention_cutoff, retention) = match now.checked_sub_signed(policy.retention) {
        Some(cutoff) => (cutoff, store.trim_retention(cutoff)),
        None => {
            tracing::debug!("retention window exceeds representable time; age trim skipped");
            (DateTime::<Utc>::MIN_UTC, Ok(0))
        }
    };
    if let Err(err) = &retention {
        tracing::warn!(error = %err, cutoff = %retention_cutoff, "retention trim failed");
    }

    let report = MaintenanceReport {
        capacity_deleted: capacity?,
        retention_deleted: retention?,
        remaining: store.count_observations()?,
        retention_cutoff,
        ran_at: now,
    };
    if report.deleted_total() > 0 {
        tracing::info!(
            capacity_deleted = report.capacity_deleted,
            retention_deleted = report.retention_deleted,
            remaining = report.remaining,
            "observation maintenance removed rows"
        );
    }
    Ok(report)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MaintenanceCounters {
    pub signals_sent: u64,
    pub signals_coalesced: u64,
    pub sweeps_completed: u64,
    pub sweeps_failed: u64,
}

#[derive(Debug, Default)]
struct SharedCounters {
    signals_sent: AtomicU64,
    signals_coalesced: AtomicU64,
    sweeps_completed: AtomicU64,
    sweeps_failed: AtomicU64,
}

impl SharedCounters {
    fn snapshot(&self) -> MaintenanceCounters {
        MaintenanceCounters {
            signals_sent: self.signals_sent.load(Ordering::Acquire),
            signals_coalesced: self.signals_coalesced.load(Ordering::Acquire),
            sweeps_completed: self.sweeps_completed.load(Ordering::Acquire),
            sweeps_failed: self.sweeps_failed.load(Ordering::Acquire),
        }
    }
}

pub struct MaintenanceWorker {
    sender: Mutex<Option<SyncSender<()>>>,
    counters: Arc<SharedCounters>,
}

impl std::fmt::Debug for MaintenanceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceWorker")
            .field("counters", &self.counters.snapshot())
            .finish_non_exhaustive()
    }
}

impl MaintenanceWorker {
    pub fn spawn(
        store: SqliteObservationStore,
        policy: MaintenancePolicy,
        debounce: Duration,
        sink: Arc<dyn EventSink>,
    ) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<()>(1);
        let counters = Arc::new(SharedCounters::default());
        let worker_counters = Arc::clone(&counters);
        thread::Builder::new()
            .name("celldb-maintenance".to_string())
            .spawn(move || {
                maintenance_loop(
                    &store,
                    policy,
                    debounce,
                    sink.as_ref(),
                    &worker_counters,
                    &receiver,
                );
            })?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            counters,
        })
    }

    /// Requests a sweep without blocking. Returns `false` when the worker has
    /// been shut down.
    pub fn signal(&self) -> bool {
        let Ok(guard) = self.sender.lock() else {
            return false;
        };
        let Some(sender) = guard.as_ref() else {
            return false;
        };
        match sender.try_send(()) {
            Ok(()) => {
                self.counters.signals_sent.fetch_add(1, Ordering::AcqRel);
                true
            }
            Err(TrySendError::Full(())) => {
                self.counters
                    .signals_coalesced
                    .fetch_add(1, Ordering::AcqRel);
                true
            }
            Err(TrySendError::Disconnected(())) => {
                tracing::debug!("maintenance worker is gone; signal dropped");
                false
            }
        }
    }

    pub fn counters(&self) -> MaintenanceCounters {
        self.counters.snapshot()
    }

    /// Disconnects the worker. A sweep already signaled still runs, right away
    /// instead of after the debounce window; it is not waited for.
    pub fn shutdown(&self) -> Result<()> {
        let mut guard = self
            .sender
            .lock()
            .map_err(|_| CellDbError::mutex_poisoned("maintenance sender"))?;
        guard.take();
        Ok(())
    }
}

fn maintenance_loop(
    store: &SqliteObservationStore,
    policy: MaintenancePolicy,
    debounce: Duration,
    sink: &dyn EventSink,
    counters: &SharedCounters,
    receiver: &mpsc::Receiver<()>,
) {
    let max_delay = debounce.saturating_mul(MAX_DEBOUNCE_FACTOR);
    while receiver.recv().is_ok() {
        let first_signal = Instant::now();
        loop {
            let waited = first_signal.elapsed();
            if waited >= max_delay {
                break;
            }
            match receiver.recv_timeout(debounce.min(max_delay - waited)) {
                Ok(()) => {}
                // A signal is still owed; sweep now and let the outer recv see the disconnect.
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }

        match run_sweep(store, policy, Utc::now()) {
            Ok(report) => {
                sink.emit(&CellDbEvent::MaintenanceCompleted(report));
                counters.sweeps_completed.fetch_add(1, Ordering::AcqRel);
            }
            Err(err) => {
                tracing::warn!(error = %err, "observation maintenance abandoned");
                sink.emit(&CellDbEvent::MaintenanceFailed {
                    error: err.to_string(),
                });
                counters.sweeps_failed.fetch_add(1, Ordering::AcqRel);
            }
        }
    }
    tracing::debug!("maintenance worker stopped");
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as ChronoDuration, TimeZone};

    use super::*;
    use crate::events::testing::RecordingSink;
    use crate::models::{GpsFix, ServingCell};

    fn seed(store: &SqliteObservationStore, count: i64, start: DateTime<Utc>) {
        let cell = ServingCell::new("1001", "240", "1", "23", "LTE").parse();
        for i in 0..count {
            store
                .insert_observation_at(
                    &GpsFix::new(59.0, 18.0, 5.0, "test"),
                    &cell,
                    start + ChronoDuration::seconds(i),
                )
                .expect("insert");
        }
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        condition()
    }

    #[test]
    fn sweep_applies_capacity_then_retention() {
        let store = SqliteObservationStore::open_in_memory().expect("open");
        let now = Utc
            .with_ymd_and_hms(2026, 6, 1, 0, 0, 0)
            .single()
            .expect("time");
        seed(&store, 5, now - ChronoDuration::days(40));
        seed(&store, 20, now - ChronoDuration::days(1));

        let policy = MaintenancePolicy {
            max_observations: 22,
            retention: ChronoDuration::days(30),
        };
        let report = run_sweep(&store, policy, now).expect("sweep");
        assert_eq!(report.capacity_deleted, 3);
        assert_eq!(report.retention_deleted, 2);
        assert_eq!(report.remaining, 20);
        assert_eq!(report.retention_cutoff, now - ChronoDuration::days(30));
    }

    #[test]
    fn sweep_with_unrepresentable_retention_skips_age_trim() {
        let store = SqliteObservationStore::open_in_memory().expect("open");
        let now = Utc::now();
        seed(&store, 3, now - ChronoDuration::days(400));

        let policy = MaintenancePolicy {
            max_observations: 100,
            retention: ChronoDuration::days(200_000_000),
        };
        let report = run_sweep(&store, policy, now).expect("sweep");
        assert_eq!(report.retention_deleted, 0);
        assert_eq!(report.remaining, 3);
        assert_eq!(report.retention_cutoff, DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn worker_sweeps_after_signal() {
        let store = SqliteObservationStore::open_in_memory().expect("open");
        seed(&store, 150, Utc::now() - ChronoDuration::hours(1));
        let sink = Arc::new(RecordingSink::default());
        let worker = MaintenanceWorker::spawn(
            store.clone(),
            MaintenancePolicy {
                max_observations: 100,
                retention: ChronoDuration::days(30),
            },
            Duration::from_millis(10),
            sink.clone(),
        )
        .expect("spawn");

        assert!(worker.signal());
        assert!(wait_for(|| worker.counters().sweeps_completed >= 1));
        assert_eq!(store.count_observations().expect("count"), 100);
        assert!(sink.events().iter().any(|event| matches!(
            event,
            CellDbEvent::MaintenanceCompleted(report) if report.capacity_deleted == 50
        )));
    }

    #[test]
    fn rapid_signals_coalesce_into_few_sweeps() {
        let store = SqliteObservationStore::open_in_memory().expect("open");
        let worker = MaintenanceWorker::spawn(
            store,
            MaintenancePolicy {
                max_observations: 10,
                retention: ChronoDuration::days(30),
            },
            Duration::from_millis(200),
            Arc::new(crate::events::NoopEventSink),
        )
        .expect("spawn");

        for _ in 0..50 {
            worker.signal();
        }
        assert!(wait_for(|| worker.counters().sweeps_completed >= 1));
        let counters = worker.counters();
        assert!(counters.signals_coalesced > 0);
        assert!(counters.sweeps_completed <= 2);
    }

    #[test]
    fn signaled_sweep_still_runs_when_shut_down_during_debounce() {
        let store = SqliteObservationStore::open_in_memory().expect("open");
        seed(&store, 15, Utc::now() - ChronoDuration::hours(1));
        let worker = MaintenanceWorker::spawn(
            store.clone(),
            MaintenancePolicy {
                max_observations: 10,
                retention: ChronoDuration::days(30),
            },
            Duration::from_secs(30),
            Arc::new(crate::events::NoopEventSink),
        )
        .expect("spawn");

        assert!(worker.signal());
        worker.shutdown().expect("shutdown");
        assert!(wait_for(|| worker.counters().sweeps_completed == 1));
        assert_eq!(store.count_observations().expect("count"), 10);
    }

    #[test]
    fn shutdown_stops_accepting_signals() {
        let store = SqliteObservationStore::open_in_memory().expect("open");
        let worker = MaintenanceWorker::spawn(
            store,
            MaintenancePolicy {
                max_observations: 10,
                retention: ChronoDuration::days(30),
            },
            Duration::from_millis(5),
            Arc::new(crate::events::NoopEventSink),
        )
        .expect("spawn");

        worker.shutdown().expect("shutdown");
        assert!(!worker.signal());
    }
}
