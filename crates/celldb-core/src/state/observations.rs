use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};

use crate::error::Result;
use crate::models::{CellKey, GpsFix, Observation, ObservationStats, ParsedCell, SignalMetrics};

use super::{
    MAX_CELL_QUERY_ROWS, SqliteObservationStore, count_to_u64, format_timestamp, parse_timestamp,
    usize_to_i64_saturating,
};

const OBSERVATION_COLUMNS: &str = r"
    id, timestamp, gps_latitude, gps_longitude, gps_accuracy, gps_source,
    cell_id, cell_mcc, cell_mnc, cell_lac, cell_technology,
    signal_rssi, signal_rsrp, signal_rsrq, signal_sinr,
    contributed, contributed_at
";

// Stays under SQLite's default host-parameter limit.
const MARK_CHUNK_SIZE: usize = 500;

impl SqliteObservationStore {
    /// Appends one row stamped with `timestamp`. No accuracy policy is applied here.
    pub fn insert_observation_at(
        &self,
        fix: &GpsFix,
        cell: &ParsedCell,
        timestamp: DateTime<Utc>,
    ) -> Result<i64> {
        let timestamp = format_timestamp(timestamp);
        self.with_conn(|conn| {
            conn.execute(
                r"
                INSERT INTO cell_observations(
                    timestamp, gps_latitude, gps_longitude, gps_accuracy, gps_source,
                    cell_id, cell_mcc, cell_mnc, cell_lac, cell_technology,
                    signal_rssi, signal_rsrp, signal_rsrq, signal_sinr
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
                ",
                params![
                    timestamp,
                    fix.latitude,
                    fix.longitude,
                    fix.accuracy,
                    fix.source,
                    cell.key.cell_id,
                    cell.key.mcc,
                    cell.key.mnc,
                    cell.key.lac,
                    cell.technology,
                    non_zero(cell.signal.rssi),
                    non_zero(cell.signal.rsrp),
                    non_zero(cell.signal.rsrq),
                    non_zero(cell.signal.sinr),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn get_observation(&self, id: i64) -> Result<Option<Observation>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {OBSERVATION_COLUMNS} FROM cell_observations WHERE id = ?1"),
                    params![id],
                    observation_from_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Most recent first, at most [`MAX_CELL_QUERY_ROWS`] rows.
    pub fn query_by_cell(&self, key: CellKey) -> Result<Vec<Observation>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                r"
                SELECT {OBSERVATION_COLUMNS}
                FROM cell_observations
                WHERE cell_id = ?1 AND cell_mcc = ?2 AND cell_mnc = ?3 AND cell_lac = ?4
                ORDER BY timestamp DESC, id DESC
                LIMIT ?5
                "
            ))?;
            let rows = stmt.query_map(
                params![
                    key.cell_id,
                    key.mcc,
                    key.mnc,
                    key.lac,
                    usize_to_i64_saturating(MAX_CELL_QUERY_ROWS)
                ],
                observation_from_row,
            )?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Oldest first so uploads drain in arrival order.
    pub fn query_uncontributed(&self, limit: usize) -> Result<Vec<Observation>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                r"
                SELECT {OBSERVATION_COLUMNS}
                FROM cell_observations
                WHERE contributed = 0
                ORDER BY timestamp ASC, id ASC
                LIMIT ?1
                "
            ))?;
            let rows = stmt.query_map(
                params![usize_to_i64_saturating(limit)],
                observation_from_row,
            )?;

            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        })
    }

    /// Flags the given rows as contributed. Rows already flagged keep their
    /// original timestamp. Returns how many rows changed state.
    pub fn mark_contributed(&self, ids: &[i64], at: DateTime<Utc>) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let at = format_timestamp(at);
        self.with_tx(|tx| {
            let mut affected = 0;
            for chunk in ids.chunks(MARK_CHUNK_SIZE) {
                let placeholders = (0..chunk.len())
                    .map(|index| format!("?{}", index + 2))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    r"
                    UPDATE cell_observations
                    SET contributed = 1, contributed_at = ?1
                    WHERE contributed = 0 AND id IN ({placeholders})
                    "
                );
                let values = std::iter::once(rusqlite::types::Value::Text(at.clone())).chain(
                    chunk
                        .iter()
                        .map(|id| rusqlite::types::Value::Integer(*id)),
                );
                affected += tx.execute(&sql, params_from_iter(values))?;
            }
            Ok(affected)
        })
    }

    pub fn count_observations(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count = conn.query_row("SELECT COUNT(*) FROM cell_observations", [], |row| {
                row.get::<_, i64>(0)
            })?;
            Ok(count_to_u64(count))
        })
    }

    pub fn statistics(&self) -> Result<ObservationStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                r"
                SELECT
                    COUNT(*),
                    COALESCE(SUM(contributed), 0),
                    (
                        SELECT COUNT(*) FROM (
                            SELECT DISTINCT cell_id, cell_mcc, cell_mnc, cell_lac
                            FROM cell_observations
                        )
                    ),
                    AVG(gps_accuracy),
                    MIN(timestamp),
                    MAX(timestamp)
                FROM cell_observations
                ",
                [],
                |row| {
                    Ok(ObservationStats {
                        total_observations: count_to_u64(row.get(0)?),
                        contributed_observations: count_to_u64(row.get(1)?),
                        unique_cells: count_to_u64(row.get(2)?),
                        average_accuracy: row.get(3)?,
                        oldest: optional_timestamp(row, 4)?,
                        newest: optional_timestamp(row, 5)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }
}

fn non_zero(value: i32) -> Option<i32> {
    (value != 0).then_some(value)
}

fn timestamp_column(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw = row.get::<_, String>(index)?;
    parse_timestamp(&raw)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err)))
}

fn optional_timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(index)? {
        Some(raw) => parse_timestamp(&raw).map(Some).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err))
        }),
        None => Ok(None),
    }
}

fn observation_from_row(row: &Row<'_>) -> rusqlite::Result<Observation> {
    Ok(Observation {
        id: row.get(0)?,
        timestamp: timestamp_column(row, 1)?,
        latitude: row.get(2)?,
        longitude: row.get(3)?,
        accuracy: row.get(4)?,
        source: row.get(5)?,
        cell_id: row.get(6)?,
        mcc: row.get(7)?,
        mnc: row.get(8)?,
        lac: row.get(9)?,
        technology: row.get(10)?,
        signal: SignalMetrics {
            rssi: row.get::<_, Option<i32>>(11)?.unwrap_or(0),
            rsrp: row.get::<_, Option<i32>>(12)?.unwrap_or(0),
            rsrq: row.get::<_, Option<i32>>(13)?.unwrap_or(0),
            sinr: row.get::<_, Option<i32>>(14)?.unwrap_or(0),
        },
        contributed: row.get::<_, i64>(15)? != 0,
        contributed_at: optional_timestamp(row, 16)?,
    })
}
