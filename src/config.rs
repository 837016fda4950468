//! Configuration for kvlog
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{KvError, Result};

/// Default depth of the event queue between writers and the log worker
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Default depth of the asynchronous error channel
pub const DEFAULT_ERROR_CAPACITY: usize = 16;

/// Main configuration for a kvlog instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Log Configuration
    // -------------------------------------------------------------------------
    /// Which transaction log backend to open
    pub backend: LogBackend,

    /// Sync strategy: how often the file backend fsyncs
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Pipeline Configuration
    // -------------------------------------------------------------------------
    /// Bounded queue depth; writers block once this many events are pending
    pub queue_capacity: usize,

    /// Asynchronous write failures buffered before further ones are dropped
    pub error_capacity: usize,
}

/// Transaction log backend selection
#[derive(Debug, Clone)]
pub enum LogBackend {
    /// Tab-separated, append-only text file
    File { path: PathBuf },

    /// Append-only `transactions` table in a SQLite database
    Sqlite(SqliteParams),
}

/// Connection parameters for the relational backend
#[derive(Debug, Clone)]
pub struct SqliteParams {
    /// Database file; created if missing
    pub path: PathBuf,
}

/// File log sync strategy
///
/// Every event is flushed to the OS as it is written; this controls fsync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every write (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced entries (balanced durability/performance)
    EveryNEntries { count: usize },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: LogBackend::File {
                path: PathBuf::from("./transaction.log"),
            },
            sync_strategy: SyncStrategy::EveryNEntries { count: 100 },
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            error_capacity: DEFAULT_ERROR_CAPACITY,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(KvError::Config("queue_capacity must be at least 1".into()));
        }
        if self.error_capacity == 0 {
            return Err(KvError::Config("error_capacity must be at least 1".into()));
        }
        if let SyncStrategy::EveryNEntries { count: 0 } = self.sync_strategy {
            return Err(KvError::Config("sync count must be at least 1".into()));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Use the file backend at `path`
    pub fn log_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.backend = LogBackend::File { path: path.into() };
        self
    }

    /// Use the SQLite backend with the database at `path`
    pub fn sqlite(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.backend = LogBackend::Sqlite(SqliteParams { path: path.into() });
        self
    }

    /// Set the backend directly
    pub fn backend(mut self, backend: LogBackend) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set the file sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the event queue depth
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// Set the error channel depth
    pub fn error_capacity(mut self, capacity: usize) -> Self {
        self.config.error_capacity = capacity;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
