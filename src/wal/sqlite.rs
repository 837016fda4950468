//! SQLite-backed transaction log
//!
//! Events are rows of one append-only table whose auto-increment primary
//! key is the sequence number, so ordering is assigned by the database.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags, Row};

use super::cursor::{OrderCheck, SequenceCursor};
use super::pipeline::{EventSink, WritePipeline};
use super::{Event, EventStream, EventType, TransactionLog};
use crate::config::{Config, SqliteParams};
use crate::error::{KvError, Result};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS transactions (
    sequence   INTEGER PRIMARY KEY AUTOINCREMENT,
    event_type SMALLINT NOT NULL,
    key        TEXT NOT NULL,
    value      TEXT NOT NULL
)";

const INSERT_EVENT: &str = "INSERT INTO transactions (event_type, key, value) VALUES (?1, ?2, ?3)";

const SELECT_EVENTS: &str =
    "SELECT sequence, event_type, key, value FROM transactions ORDER BY sequence";

const SELECT_LAST_SEQUENCE: &str = "SELECT COALESCE(MAX(sequence), 0) FROM transactions";

/// Transaction log stored in a SQLite `transactions` table
pub struct SqliteTransactionLog {
    path: PathBuf,

    /// Append connection; moved into the writer thread by `run`
    conn: Mutex<Option<Connection>>,

    queue_capacity: usize,

    cursor: Arc<SequenceCursor>,
    replay_started: bool,
    pipeline: Option<WritePipeline>,
    closed: bool,

    errors_tx: Sender<KvError>,
    errors_rx: Receiver<KvError>,
}

impl SqliteTransactionLog {
    /// Connect to the database and create the table if it is missing
    ///
    /// The database must be a file: replay reads through its own
    /// connection, which an in-memory database would not share.
    pub fn open(params: &SqliteParams, config: &Config) -> Result<Self> {
        config.validate()?;

        let conn = Connection::open(&params.path)?;
        conn.execute_batch(CREATE_TABLE)?;
        let (errors_tx, errors_rx) = channel::bounded(config.error_capacity);

        tracing::info!(path = %params.path.display(), "opened transaction log database");

        Ok(Self {
            path: params.path.clone(),
            conn: Mutex::new(Some(conn)),
            queue_capacity: config.queue_capacity,
            cursor: Arc::new(SequenceCursor::default()),
            replay_started: false,
            pipeline: None,
            closed: false,
            errors_tx,
            errors_rx,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn pipeline(&self) -> Result<&WritePipeline> {
        match &self.pipeline {
            Some(pipeline) => Ok(pipeline),
            None if self.closed => Err(KvError::LogClosed),
            None => Err(KvError::LogNotRunning),
        }
    }
}

impl TransactionLog for SqliteTransactionLog {
    fn write_put(&self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(KvError::EmptyKey);
        }
        self.pipeline()?.submit(Event::put(key, value))
    }

    fn write_delete(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(KvError::EmptyKey);
        }
        self.pipeline()?.submit(Event::delete(key))
    }

    fn run(&mut self) -> Result<()> {
        if self.closed {
            return Err(KvError::LogClosed);
        }
        if self.pipeline.is_some() {
            return Err(KvError::AlreadyRunning);
        }
        self.replay_started = true;

        let conn = self.conn.lock().take().ok_or(KvError::LogClosed)?;
        if !self.cursor.is_replayed() {
            let last: i64 = conn.query_row(SELECT_LAST_SEQUENCE, [], |row| row.get(0))?;
            self.cursor.advance(last.max(0) as u64);
            self.cursor.mark_replayed();
        }

        self.pipeline = Some(WritePipeline::start(
            "kvlog-sqlite",
            SqliteSink { conn },
            self.queue_capacity,
            self.errors_tx.clone(),
            Arc::clone(&self.cursor),
        )?);
        Ok(())
    }

    fn read_events(&mut self) -> Result<EventStream> {
        if self.replay_started || self.pipeline.is_some() || self.closed {
            return Err(KvError::ReplayUnavailable);
        }
        self.replay_started = true;

        let path = self.path.clone();
        let cursor = Arc::clone(&self.cursor);

        EventStream::spawn("kvlog-sqlite", move |sender| {
            match stream_rows(&path, &cursor, sender) {
                Ok(true) => cursor.mark_replayed(),
                Ok(false) => {}
                Err(e) => {
                    let _ = sender.send(Err(e));
                }
            }
        })
    }

    fn errors(&self) -> Receiver<KvError> {
        self.errors_rx.clone()
    }

    fn wait(&self) {
        if let Some(pipeline) = &self.pipeline {
            pipeline.wait();
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let result = match self.pipeline.take() {
            Some(mut pipeline) => pipeline.shutdown(),
            None => Ok(()),
        };
        self.conn.lock().take();

        tracing::info!(
            path = %self.path.display(),
            last_sequence = self.cursor.last(),
            "closed transaction log database"
        );
        result
    }

    fn last_sequence(&self) -> u64 {
        self.cursor.last()
    }
}

/// Stream every row to `sender` in sequence order
///
/// Returns `Ok(false)` when the consumer went away before the end.
fn stream_rows(
    path: &Path,
    cursor: &SequenceCursor,
    sender: &Sender<Result<Event>>,
) -> Result<bool> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    let mut stmt = conn.prepare(SELECT_EVENTS)?;
    let mut rows = stmt.query([])?;

    let mut order = OrderCheck::default();
    let mut row_no = 0u64;
    while let Some(row) = rows.next()? {
        row_no += 1;
        let event = event_from_row(row, row_no)?;
        order.observe(event.sequence)?;
        cursor.advance(event.sequence);
        if sender.send(Ok(event)).is_err() {
            return Ok(false);
        }
    }
    Ok(true)
}

fn event_from_row(row: &Row<'_>, row_no: u64) -> Result<Event> {
    let parse_err = |e: rusqlite::Error| KvError::Parse {
        line: row_no,
        reason: e.to_string(),
    };

    let sequence: i64 = row.get(0).map_err(parse_err)?;
    let code: i64 = row.get(1).map_err(parse_err)?;
    let key: String = row.get(2).map_err(parse_err)?;
    let value: Option<String> = row.get(3).map_err(parse_err)?;

    let sequence = u64::try_from(sequence).map_err(|_| KvError::Parse {
        line: row_no,
        reason: format!("negative sequence {}", sequence),
    })?;

    Ok(Event {
        sequence,
        event_type: EventType::from_code(code)?,
        key,
        value: value.unwrap_or_default(),
    })
}

/// Writer-side half of the SQLite log, owned by the worker thread
struct SqliteSink {
    conn: Connection,
}

impl EventSink for SqliteSink {
    fn persist(&mut self, event: Event) -> Result<u64> {
        let mut stmt = self.conn.prepare_cached(INSERT_EVENT)?;
        stmt.execute(params![event.event_type.code(), event.key, event.value])?;
        Ok(self.conn.last_insert_rowid() as u64)
    }
}
