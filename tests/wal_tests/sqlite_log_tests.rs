//! Tests for the SQLite transaction log
//!
//! These tests verify:
//! - Table creation is idempotent
//! - Database-assigned sequences are increasing and replay in order
//! - Values with tabs and newlines are stored verbatim
//! - Replay rejects corrupt rows
//! - Lifecycle errors mirror the file backend
//! - Write failures after start arrive on the error channel

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use kvlog::config::{Config, SqliteParams};
use kvlog::wal::{Event, EventType, SqliteTransactionLog, TransactionLog};
use kvlog::KvError;
use rusqlite::Connection;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_db() -> (TempDir, SqliteParams) {
    let temp_dir = TempDir::new().unwrap();
    let params = SqliteParams {
        path: temp_dir.path().join("transactions.db"),
    };
    (temp_dir, params)
}

fn open_running(params: &SqliteParams) -> SqliteTransactionLog {
    let mut log = SqliteTransactionLog::open(params, &Config::default()).unwrap();
    for event in log.read_events().unwrap() {
        event.unwrap();
    }
    log.run().unwrap();
    log
}

fn replay_all(params: &SqliteParams) -> Vec<Event> {
    let mut log = SqliteTransactionLog::open(params, &Config::default()).unwrap();
    log.read_events()
        .unwrap()
        .collect::<kvlog::Result<Vec<_>>>()
        .unwrap()
}

fn raw_connection(path: &Path) -> Connection {
    Connection::open(path).unwrap()
}

// =============================================================================
// Open Tests
// =============================================================================

#[test]
fn test_open_creates_table() {
    let (_temp, params) = setup_temp_db();

    let _log = SqliteTransactionLog::open(&params, &Config::default()).unwrap();

    let count: i64 = raw_connection(&params.path)
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'transactions'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn test_open_twice_keeps_rows() {
    let (_temp, params) = setup_temp_db();

    let mut log = open_running(&params);
    log.write_put("a", "1").unwrap();
    log.close().unwrap();

    let log = SqliteTransactionLog::open(&params, &Config::default()).unwrap();
    drop(log);

    assert_eq!(replay_all(&params).len(), 1);
}

#[test]
fn test_open_unreachable_database_fails() {
    let temp_dir = TempDir::new().unwrap();
    let params = SqliteParams {
        path: PathBuf::from(temp_dir.path()).join("missing").join("db.sqlite"),
    };

    let result = SqliteTransactionLog::open(&params, &Config::default());

    assert!(matches!(result, Err(KvError::Database(_))));
}

// =============================================================================
// Writing Tests
// =============================================================================

#[test]
fn test_close_persists_events_in_order() {
    let (_temp, params) = setup_temp_db();

    let mut log = open_running(&params);
    for i in 1..=4 {
        log.write_put(&format!("key{}", i), &format!("value{}", i))
            .unwrap();
    }
    log.close().unwrap();

    let events = replay_all(&params);
    assert_eq!(events.len(), 4);
    for (i, event) in events.iter().enumerate() {
        assert_eq!(event.sequence, i as u64 + 1);
        assert_eq!(event.key, format!("key{}", i + 1));
    }
}

#[test]
fn test_delete_row_has_empty_value() {
    let (_temp, params) = setup_temp_db();

    let mut log = open_running(&params);
    log.write_put("k", "v").unwrap();
    log.write_delete("k").unwrap();
    log.close().unwrap();

    let events = replay_all(&params);
    assert_eq!(events[1].event_type, EventType::Delete);
    assert_eq!(events[1].value, "");
}

#[test]
fn test_last_sequence_tracks_database() {
    let (_temp, params) = setup_temp_db();

    let mut log = open_running(&params);
    log.write_put("a", "1").unwrap();
    log.write_put("b", "2").unwrap();
    log.wait();
    assert_eq!(log.last_sequence(), 2);
    log.close().unwrap();

    // Without replay the cursor is seeded from MAX(sequence)
    let mut log = SqliteTransactionLog::open(&params, &Config::default()).unwrap();
    log.run().unwrap();
    assert_eq!(log.last_sequence(), 2);
    log.write_put("c", "3").unwrap();
    log.close().unwrap();

    let sequences: Vec<u64> = replay_all(&params).iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3]);
}

#[test]
fn test_values_stored_verbatim() {
    let (_temp, params) = setup_temp_db();
    let value = "v with a tab\t and newline\n";

    let mut log = open_running(&params);
    log.write_put("k", value).unwrap();
    log.close().unwrap();

    let stored: String = raw_connection(&params.path)
        .query_row("SELECT value FROM transactions", [], |row| row.get(0))
        .unwrap();
    assert_eq!(stored, value);
    assert_eq!(replay_all(&params)[0].value, value);
}

#[test]
fn test_concurrent_writers_get_unique_increasing_sequences() {
    let (_temp, params) = setup_temp_db();

    let mut log = open_running(&params);
    thread::scope(|s| {
        for t in 0..4 {
            let log = &log;
            s.spawn(move || {
                for i in 0..25 {
                    log.write_put(&format!("t{}-k{}", t, i), "v").unwrap();
                }
            });
        }
    });
    log.close().unwrap();

    let events = replay_all(&params);
    assert_eq!(events.len(), 100);
    assert!(events.windows(2).all(|w| w[0].sequence < w[1].sequence));
}

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_write_before_run_fails() {
    let (_temp, params) = setup_temp_db();
    let log = SqliteTransactionLog::open(&params, &Config::default()).unwrap();

    assert!(matches!(log.write_put("k", "v"), Err(KvError::LogNotRunning)));
}

#[test]
fn test_run_twice_fails() {
    let (_temp, params) = setup_temp_db();
    let mut log = open_running(&params);

    assert!(matches!(log.run(), Err(KvError::AlreadyRunning)));
    log.close().unwrap();
    assert!(matches!(log.write_delete("k"), Err(KvError::LogClosed)));
}

#[test]
fn test_write_failure_after_run_reported_on_error_channel() {
    let (_temp, params) = setup_temp_db();
    let mut log = open_running(&params);
    let errors = log.errors();

    raw_connection(&params.path)
        .execute("DROP TABLE transactions", [])
        .unwrap();

    // Enqueue still succeeds; the failure surfaces asynchronously
    log.write_put("k", "v").unwrap();
    log.wait();

    let error = errors.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(error, KvError::Database(_)));
    assert_eq!(log.last_sequence(), 0);
    log.close().unwrap();
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_replay_rejects_unknown_event_type() {
    let (_temp, params) = setup_temp_db();
    drop(SqliteTransactionLog::open(&params, &Config::default()).unwrap());

    raw_connection(&params.path)
        .execute(
            "INSERT INTO transactions (event_type, key, value) VALUES (9, 'k', 'v')",
            [],
        )
        .unwrap();

    let mut log = SqliteTransactionLog::open(&params, &Config::default()).unwrap();
    let result: kvlog::Result<Vec<Event>> = log.read_events().unwrap().collect();

    assert!(matches!(result, Err(KvError::UnknownEventType(9))));
}

#[test]
fn test_replay_rejects_mistyped_row() {
    let (_temp, params) = setup_temp_db();
    drop(SqliteTransactionLog::open(&params, &Config::default()).unwrap());

    raw_connection(&params.path)
        .execute(
            "INSERT INTO transactions (event_type, key, value) VALUES ('put', 'k', 'v')",
            [],
        )
        .unwrap();

    let mut log = SqliteTransactionLog::open(&params, &Config::default()).unwrap();
    let result: kvlog::Result<Vec<Event>> = log.read_events().unwrap().collect();

    assert!(matches!(result, Err(KvError::Parse { line: 1, .. })));
}
