// Public fallible APIs in this crate share one concrete error contract (`CellDbError`).
// Repeating per-function `# Errors` boilerplate obscures behavior more than it clarifies.
#![allow(
    clippy::missing_errors_doc,
    reason = "crate-wide fallible API uses one explicit error type; per-item boilerplate would duplicate contract"
)]

pub mod client;
pub mod config;
pub mod contribution;
pub mod error;
pub mod estimator;
pub mod events;
pub mod maintenance;
pub mod models;
pub mod state;

pub use client::CellDatabase;
pub use config::CellDbConfig;
pub use error::{CellDbError, Result};
pub use events::{CellDbEvent, EventSink, NoopEventSink, TracingEventSink};
