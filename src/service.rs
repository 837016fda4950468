//! Service Module
//!
//! The facade request handlers talk to.
//!
//! ## Responsibilities
//! - Replay the transaction log into a fresh store on open
//! - Pair each store mutation with its durability record
//! - Log asynchronous write failures
//! - Drain and close the log on shutdown

use std::thread::{self, JoinHandle};

use crossbeam::channel::Receiver;

use crate::config::Config;
use crate::error::{KvError, Result};
use crate::store::KeyStore;
use crate::wal::{self, RecoveryReport, TransactionLog};

/// A key-value store made durable by a transaction log
///
/// ## Write ordering
/// Mutations update the in-memory store first, then enqueue an event. A
/// write that later fails to persist is reported by the error monitor and
/// is not rolled back; callers get availability, not write-through.
pub struct KvService {
    store: KeyStore,
    log: Box<dyn TransactionLog>,
    recovery: RecoveryReport,

    /// Drains the log's error channel until the log is dropped
    monitor: Option<JoinHandle<u64>>,
}

impl KvService {
    /// Open the configured log, replay it and start accepting writes
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let log = wal::open_log(&config)?;
        Self::with_log(log)
    }

    /// Build a service around an already opened, not yet replayed log
    pub fn with_log(mut log: Box<dyn TransactionLog>) -> Result<Self> {
        let store = KeyStore::new();
        let recovery = wal::bootstrap(log.as_mut(), &store)?;
        let monitor = spawn_error_monitor(log.errors())?;

        Ok(Self {
            store,
            log,
            recovery,
            monitor: Some(monitor),
        })
    }

    /// Set `key` to `value`
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            return Err(KvError::EmptyKey);
        }
        self.store.put(key, value);
        self.log.write_put(key, value)
    }

    /// Current value of `key`, or `KvError::KeyNotFound`
    pub fn get(&self, key: &str) -> Result<String> {
        self.store.get(key)
    }

    /// Remove `key`; removing an absent key still records the delete
    pub fn delete(&self, key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(KvError::EmptyKey);
        }
        self.store.delete(key);
        self.log.write_delete(key)
    }

    /// Block until every write so far has reached the log
    pub fn flush(&self) {
        self.log.wait();
    }

    /// Drain the log, close it and stop the error monitor
    ///
    /// Returns how many asynchronous write failures the monitor saw over
    /// the service's lifetime.
    pub fn shutdown(mut self) -> Result<u64> {
        self.log.wait();
        let result = self.log.close();
        let last_sequence = self.log.last_sequence();

        // Dropping the log drops the last error sender
        drop(self.log);
        let failures = match self.monitor.take() {
            Some(handle) => handle.join().unwrap_or(0),
            None => 0,
        };

        tracing::info!(last_sequence, failures, "service shut down");
        result.map(|()| failures)
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    /// What the startup replay found
    pub fn recovery(&self) -> &RecoveryReport {
        &self.recovery
    }

    pub fn last_sequence(&self) -> u64 {
        self.log.last_sequence()
    }
}

/// Log every asynchronous write failure until the channel disconnects
///
/// Returns the number of failures seen.
fn spawn_error_monitor(errors: Receiver<KvError>) -> Result<JoinHandle<u64>> {
    let handle = thread::Builder::new()
        .name("kvlog-error-monitor".to_string())
        .spawn(move || {
            let mut failures = 0u64;
            for error in errors.iter() {
                failures += 1;
                tracing::error!(error = %error, failures, "durability write failed");
            }
            failures
        })?;
    Ok(handle)
}
