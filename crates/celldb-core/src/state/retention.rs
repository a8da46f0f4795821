use chrono::{DateTime, Utc};
use rusqlite::params;

use crate::error::Result;

use super::{SqliteObservationStore, format_timestamp, usize_to_i64_saturating};

impl SqliteObservationStore {
    /// Deletes the oldest rows until at most `max_observations` remain.
    ///
    /// Count and delete share one transaction; a second concurrent call sees
    /// the already-trimmed table and deletes nothing.
    pub fn trim_capacity(&self, max_observations: usize) -> Result<u64> {
        let max_observations = usize_to_i64_saturating(max_observations);
        self.with_tx(|tx| {
            let count: i64 =
                tx.query_row("SELECT COUNT(*) FROM cell_observations", [], |row| {
                    row.get(0)
                })?;
            let excess = count.saturating_sub(max_observations);
            if excess <= 0 {
                return Ok(0);
            }
            let deleted = tx.execute(
                r"
                DELETE FROM cell_observations
                WHERE id IN (
                    SELECT id FROM cell_observations
                    ORDER BY timestamp ASC, id ASC
                    LIMIT ?1
                )
                ",
                params![excess],
            )?;
            Ok(u64::try_from(deleted).unwrap_or(u64::MAX))
        })
    }

    /// Deletes every row stamped strictly before `cutoff`.
    pub fn trim_retention(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let cutoff = format_timestamp(cutoff);
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM cell_observations WHERE timestamp < ?1",
                params![cutoff],
            )?;
            Ok(u64::try_from(deleted).unwrap_or(u64::MAX))
        })
    }
}
