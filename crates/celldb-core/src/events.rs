//! Side-channel notifications for the external metrics collector.
//!
//! The database never depends on what a sink does with an event; sinks must
//! not block for long because they run on the caller's thread (or on the
//! maintenance worker for maintenance events).

use serde::Serialize;

use crate::models::{CellKey, IdentityField, MaintenanceReport};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CellDbEvent {
    ObservationStored {
        id: i64,
        cell: CellKey,
        accuracy: f64,
    },
    ObservationFiltered {
        accuracy: f64,
        min_accuracy: f64,
    },
    IdentityParseFallback {
        field: IdentityField,
        raw: String,
    },
    EstimateComputed {
        cell: CellKey,
        observation_count: usize,
        confidence: f64,
    },
    EstimateMiss {
        cell: CellKey,
    },
    ObservationsContributed {
        requested: usize,
        newly_marked: usize,
    },
    MaintenanceCompleted(MaintenanceReport),
    MaintenanceFailed {
        error: String,
    },
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &CellDbEvent);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &CellDbEvent) {}
}

/// Forwards every event to `tracing` at debug level under the `celldb.events` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &CellDbEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => tracing::debug!(target: "celldb.events", %payload, "celldb event"),
            Err(err) => tracing::debug!(
                target: "celldb.events",
                error = %err,
                "celldb event not serializable"
            ),
        }
    }
}
