use rusqlite::Connection;

use crate::error::{CellDbError, Result};

use super::SqliteObservationStore;

const MIGRATION_SCHEMA_SQL: &str = r"
    PRAGMA journal_mode = WAL;
    CREATE TABLE IF NOT EXISTS cell_observations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        timestamp TEXT NOT NULL,
        gps_latitude REAL NOT NULL,
        gps_longitude REAL NOT NULL,
        gps_accuracy REAL NOT NULL,
        gps_source TEXT NOT NULL,
        cell_id INTEGER NOT NULL,
        cell_mcc INTEGER NOT NULL,
        cell_mnc INTEGER NOT NULL,
        cell_lac INTEGER NOT NULL,
        cell_technology TEXT NOT NULL,
        signal_rssi INTEGER,
        signal_rsrp INTEGER,
        signal_rsrq INTEGER,
        signal_sinr INTEGER,
        contributed INTEGER NOT NULL DEFAULT 0 CHECK(contributed IN (0, 1)),
        contributed_at TEXT
    );
";

const MIGRATION_INDEX_SQL: &str = r"
    CREATE INDEX IF NOT EXISTS idx_cell_observations_timestamp
    ON cell_observations(timestamp);
    CREATE INDEX IF NOT EXISTS idx_cell_observations_cell
    ON cell_observations(cell_id, cell_mcc, cell_mnc, cell_lac);
    CREATE INDEX IF NOT EXISTS idx_cell_observations_contributed
    ON cell_observations(contributed);
";

const REQUIRED_COLUMNS: [&str; 17] = [
    "id",
    "timestamp",
    "gps_latitude",
    "gps_longitude",
    "gps_accuracy",
    "gps_source",
    "cell_id",
    "cell_mcc",
    "cell_mnc",
    "cell_lac",
    "cell_technology",
    "signal_rssi",
    "signal_rsrp",
    "signal_rsrq",
    "signal_sinr",
    "contributed",
    "contributed_at",
];

impl SqliteObservationStore {
    pub fn migrate(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| CellDbError::mutex_poisoned("sqlite"))?;
        conn.execute_batch(MIGRATION_SCHEMA_SQL)?;
        for column in REQUIRED_COLUMNS {
            ensure_required_column(&conn, "cell_observations", column)?;
        }
        conn.execute_batch(MIGRATION_INDEX_SQL)?;
        drop(conn);
        Ok(())
    }
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for row in rows {
        if row? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn ensure_required_column(conn: &Connection, table: &str, column: &str) -> Result<()> {
    if has_column(conn, table, column)? {
        Ok(())
    } else {
        Err(CellDbError::Validation(format!(
            "unsupported {table} schema: {column} is missing; reset the observation database"
        )))
    }
}
