//! Transaction Log Module
//!
//! Provides durability through an append-only log of mutations.
//!
//! ## Responsibilities
//! - Queue Put/Delete events without blocking callers on storage I/O
//! - Assign strictly increasing sequence numbers
//! - Persist events from a single writer thread, in enqueue order
//! - Replay persisted events in order, rejecting out-of-sequence records
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ sequence \t event_type \t key \t value \n    │  event_type: 1 = Delete
//! │ sequence \t event_type \t key \t value \n    │              2 = Put
//! │ ...                                          │
//! └──────────────────────────────────────────────┘
//! ```
//! Keys and values are `%XX`-escaped so tabs and newlines cannot split a
//! record.
//!
//! ## Lifecycle
//! `open` → `read_events` (drain) → `run` → `write_*`... → `wait` → `close`

mod cursor;
mod escape;
mod event;
mod file;
mod pipeline;
mod recovery;
mod sqlite;
mod stream;

pub use escape::{escape, unescape};
pub use event::{Event, EventType, FIELD_DELIMITER};
pub use file::FileTransactionLog;
pub use recovery::{bootstrap, verify, RecoveryReport};
pub use sqlite::SqliteTransactionLog;
pub use stream::EventStream;

use crossbeam::channel::Receiver;

use crate::config::{Config, LogBackend};
use crate::error::{KvError, Result};

/// Durable, ordered log of store mutations
///
/// Writes are fire-and-forget: they return once the event is queued, and
/// failures to persist it surface later on [`errors`](Self::errors).
pub trait TransactionLog: Send + Sync {
    /// Queue a Put event; blocks only while the queue is full
    fn write_put(&self, key: &str, value: &str) -> Result<()>;

    /// Queue a Delete event; blocks only while the queue is full
    fn write_delete(&self, key: &str) -> Result<()>;

    /// Start the writer thread. Call once, after replay.
    fn run(&mut self) -> Result<()>;

    /// Stream every persisted event in sequence order. Call once, before `run`.
    fn read_events(&mut self) -> Result<EventStream>;

    /// Write failures observed by the writer thread
    fn errors(&self) -> Receiver<KvError>;

    /// Block until every queued event has been persisted or has failed
    fn wait(&self);

    /// Drain the queue, stop the writer and release the backing store
    fn close(&mut self) -> Result<()>;

    /// Highest sequence number replayed or written so far
    fn last_sequence(&self) -> u64;
}

/// Open the backend selected by `config`
pub fn open_log(config: &Config) -> Result<Box<dyn TransactionLog>> {
    match &config.backend {
        LogBackend::File { path } => Ok(Box::new(FileTransactionLog::open(path, config)?)),
        LogBackend::Sqlite(params) => Ok(Box::new(SqliteTransactionLog::open(params, config)?)),
    }
}
