use chrono::{Duration, TimeZone, Utc};
use tempfile::tempdir;

use crate::models::{CellKey, GpsFix, ParsedCell, ServingCell, SignalMetrics};

use super::*;

fn lte_cell(cell_id: i64, lac: i64) -> ParsedCell {
    ServingCell::new(cell_id.to_string(), "240", "1", lac.to_string(), "LTE")
        .with_signal(SignalMetrics {
            rssi: -67,
            rsrp: -95,
            rsrq: -11,
            sinr: 0,
        })
        .parse()
}

fn fix(latitude: f64, accuracy: f64) -> GpsFix {
    GpsFix::new(latitude, 18.07, accuracy, "rutos")
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).single().expect("valid time")
}

#[test]
fn migrate_and_insert() {
    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("cells.sqlite3");
    let store = SqliteObservationStore::open(db_path).expect("open failed");

    let id = store
        .insert_observation_at(&fix(59.33, 5.0), &lte_cell(1001, 23), base_time())
        .expect("insert failed");
    assert!(id > 0);

    let row = store
        .get_observation(id)
        .expect("get failed")
        .expect("row exists");
    assert_eq!(row.key(), CellKey::new(1001, 240, 1, 23));
    assert_eq!(row.timestamp, base_time());
    assert_eq!(row.technology, "LTE");
    assert_eq!(row.signal.rsrp, -95);
    assert_eq!(row.signal.sinr, 0);
    assert!(!row.contributed);
    assert!(row.contributed_at.is_none());
}

#[cfg(unix)]
#[test]
fn open_hardens_database_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("nested").join("cells.sqlite3");
    let _store = SqliteObservationStore::open(&db_path).expect("open failed");

    let mode = std::fs::metadata(&db_path)
        .expect("metadata")
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(mode, 0o600);
}

#[test]
fn open_rejects_incompatible_schema() {
    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("legacy.sqlite3");
    {
        let conn = Connection::open(&db_path).expect("raw open");
        conn.execute_batch(
            "CREATE TABLE cell_observations (id INTEGER PRIMARY KEY, timestamp TEXT NOT NULL);",
        )
        .expect("legacy schema");
    }

    let err = SqliteObservationStore::open(&db_path).expect_err("schema must be rejected");
    assert_eq!(err.code(), "VALIDATION_FAILED");
}

#[test]
fn query_by_cell_matches_exact_tuple_most_recent_first() {
    let store = SqliteObservationStore::open_in_memory().expect("open");
    let t0 = base_time();
    store
        .insert_observation_at(&fix(59.30, 5.0), &lte_cell(1001, 23), t0)
        .expect("insert");
    store
        .insert_observation_at(&fix(59.31, 5.0), &lte_cell(1001, 23), t0 + Duration::minutes(5))
        .expect("insert");
    store
        .insert_observation_at(&fix(59.32, 5.0), &lte_cell(1001, 24), t0 + Duration::minutes(10))
        .expect("insert other lac");

    let rows = store
        .query_by_cell(CellKey::new(1001, 240, 1, 23))
        .expect("query");
    assert_eq!(rows.len(), 2);
    assert!(rows[0].timestamp > rows[1].timestamp);
    assert!((rows[0].latitude - 59.31).abs() < 1e-9);

    let none = store
        .query_by_cell(CellKey::new(1001, 240, 2, 23))
        .expect("query");
    assert!(none.is_empty());
}

#[test]
fn query_by_cell_is_capped() {
    let store = SqliteObservationStore::open_in_memory().expect("open");
    let t0 = base_time();
    for i in 0..(MAX_CELL_QUERY_ROWS + 20) {
        let offset = i64::try_from(i).expect("small index");
        store
            .insert_observation_at(&fix(59.0, 5.0), &lte_cell(7, 1), t0 + Duration::seconds(offset))
            .expect("insert");
    }

    let rows = store.query_by_cell(CellKey::new(7, 240, 1, 1)).expect("query");
    assert_eq!(rows.len(), MAX_CELL_QUERY_ROWS);
    assert_eq!(rows[0].timestamp, t0 + Duration::seconds(119));
}

#[test]
fn query_uncontributed_is_oldest_first_and_limited() {
    let store = SqliteObservationStore::open_in_memory().expect("open");
    let t0 = base_time();
    let late = store
        .insert_observation_at(&fix(59.0, 5.0), &lte_cell(1, 1), t0 + Duration::hours(2))
        .expect("insert");
    let early = store
        .insert_observation_at(&fix(59.0, 5.0), &lte_cell(2, 1), t0)
        .expect("insert");
    let middle = store
        .insert_observation_at(&fix(59.0, 5.0), &lte_cell(3, 1), t0 + Duration::hours(1))
        .expect("insert");

    let rows = store.query_uncontributed(10).expect("query");
    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    assert_eq!(ids, vec![early, middle, late]);

    let limited = store.query_uncontributed(2).expect("query");
    assert_eq!(limited.len(), 2);
    assert!(store.query_uncontributed(0).expect("query").is_empty());
}

#[test]
fn mark_contributed_is_idempotent() {
    let store = SqliteObservationStore::open_in_memory().expect("open");
    let t0 = base_time();
    let a = store
        .insert_observation_at(&fix(59.0, 5.0), &lte_cell(1, 1), t0)
        .expect("insert");
    let b = store
        .insert_observation_at(&fix(59.0, 5.0), &lte_cell(1, 1), t0 + Duration::seconds(1))
        .expect("insert");
    let _c = store
        .insert_observation_at(&fix(59.0, 5.0), &lte_cell(1, 1), t0 + Duration::seconds(2))
        .expect("insert");

    let first_mark = t0 + Duration::days(1);
    assert_eq!(store.mark_contributed(&[a, b], first_mark).expect("mark"), 2);
    assert_eq!(
        store
            .mark_contributed(&[a, b], first_mark + Duration::hours(1))
            .expect("re-mark"),
        0
    );
    assert_eq!(store.mark_contributed(&[], first_mark).expect("empty"), 0);

    let row = store.get_observation(a).expect("get").expect("row");
    assert!(row.contributed);
    assert_eq!(row.contributed_at, Some(first_mark));

    let stats = store.statistics().expect("stats");
    assert_eq!(stats.contributed_observations, 2);
    assert_eq!(store.query_uncontributed(10).expect("query").len(), 1);
}

#[test]
fn mark_contributed_handles_large_id_sets() {
    let store = SqliteObservationStore::open_in_memory().expect("open");
    let t0 = base_time();
    let mut ids = Vec::new();
    for i in 0..1_200 {
        ids.push(
            store
                .insert_observation_at(&fix(59.0, 5.0), &lte_cell(1, 1), t0 + Duration::seconds(i))
                .expect("insert"),
        );
    }

    assert_eq!(store.mark_contributed(&ids, t0).expect("mark"), 1_200);
    assert!(store.query_uncontributed(10).expect("query").is_empty());
}

#[test]
fn statistics_on_empty_and_populated_store() {
    let store = SqliteObservationStore::open_in_memory().expect("open");
    let empty = store.statistics().expect("stats");
    assert_eq!(empty.total_observations, 0);
    assert_eq!(empty.unique_cells, 0);
    assert!(empty.average_accuracy.is_none());
    assert!(empty.oldest.is_none());

    let t0 = base_time();
    store
        .insert_observation_at(&fix(59.0, 10.0), &lte_cell(1, 1), t0)
        .expect("insert");
    store
        .insert_observation_at(&fix(59.0, 20.0), &lte_cell(1, 1), t0 + Duration::hours(1))
        .expect("insert");
    store
        .insert_observation_at(&fix(59.0, 30.0), &lte_cell(2, 1), t0 + Duration::hours(2))
        .expect("insert");

    let stats = store.statistics().expect("stats");
    assert_eq!(stats.total_observations, 3);
    assert_eq!(stats.contributed_observations, 0);
    assert_eq!(stats.unique_cells, 2);
    let avg = stats.average_accuracy.expect("average");
    assert!((avg - 20.0).abs() < 1e-9);
    assert_eq!(stats.oldest, Some(t0));
    assert_eq!(stats.newest, Some(t0 + Duration::hours(2)));
}

#[test]
fn trim_capacity_removes_exactly_the_oldest_excess() {
    let store = SqliteObservationStore::open_in_memory().expect("open");
    let t0 = base_time();
    // Insert out of time order so id order and timestamp order disagree.
    for i in (0..150).rev() {
        store
            .insert_observation_at(&fix(59.0, 5.0), &lte_cell(1, 1), t0 + Duration::seconds(i))
            .expect("insert");
    }

    assert_eq!(store.trim_capacity(100).expect("trim"), 50);
    assert_eq!(store.count_observations().expect("count"), 100);

    let stats = store.statistics().expect("stats");
    assert_eq!(stats.oldest, Some(t0 + Duration::seconds(50)));
    assert_eq!(stats.newest, Some(t0 + Duration::seconds(149)));

    assert_eq!(store.trim_capacity(100).expect("second trim"), 0);
}

#[test]
fn trim_retention_respects_cutoff_boundary() {
    let store = SqliteObservationStore::open_in_memory().expect("open");
    let cutoff = base_time();
    let old = store
        .insert_observation_at(&fix(59.0, 5.0), &lte_cell(1, 1), cutoff - Duration::microseconds(1))
        .expect("insert");
    let at_cutoff = store
        .insert_observation_at(&fix(59.0, 5.0), &lte_cell(1, 1), cutoff)
        .expect("insert");
    let newer = store
        .insert_observation_at(&fix(59.0, 5.0), &lte_cell(1, 1), cutoff + Duration::days(1))
        .expect("insert");

    assert_eq!(store.trim_retention(cutoff).expect("trim"), 1);
    assert!(store.get_observation(old).expect("get").is_none());
    assert!(store.get_observation(at_cutoff).expect("get").is_some());
    assert!(store.get_observation(newer).expect("get").is_some());
    assert_eq!(store.trim_retention(cutoff).expect("again"), 0);
}

#[test]
fn timestamps_round_trip_with_fixed_width() {
    let value = Utc
        .with_ymd_and_hms(2026, 1, 2, 3, 4, 5)
        .single()
        .expect("valid");
    let formatted = format_timestamp(value);
    assert_eq!(formatted, "2026-01-02T03:04:05.000000Z");
    assert_eq!(parse_timestamp(&formatted).expect("parse"), value);
}
