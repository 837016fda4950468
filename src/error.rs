//! Error types for kvlog
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using KvError
pub type Result<T> = std::result::Result<T, KvError>;

/// Unified error type for kvlog operations
#[derive(Debug, Error)]
pub enum KvError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    // -------------------------------------------------------------------------
    // Store Errors
    // -------------------------------------------------------------------------
    #[error("no value for key '{0}'")]
    KeyNotFound(String),

    #[error("key must not be empty")]
    EmptyKey,

    // -------------------------------------------------------------------------
    // Replay Errors
    // -------------------------------------------------------------------------
    #[error("malformed log record at line {line}: {reason}")]
    Parse { line: u64, reason: String },

    #[error("transaction numbers out of sequence: {found} follows {previous}")]
    OutOfSequence { previous: u64, found: u64 },

    #[error("value decoding failure: {0}")]
    Decode(String),

    #[error("unknown event type: {0}")]
    UnknownEventType(i64),

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("transaction log is not running")]
    LogNotRunning,

    #[error("transaction log is already running")]
    AlreadyRunning,

    #[error("transaction log is closed")]
    LogClosed,

    #[error("events can only be read once, before the log is running")]
    ReplayUnavailable,

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl KvError {
    /// True for the ordinary "no such key" result
    pub fn is_not_found(&self) -> bool {
        matches!(self, KvError::KeyNotFound(_))
    }
}
