//! Log Recovery
//!
//! Rebuilds the in-memory store by replaying the transaction log at startup.

use super::{EventType, TransactionLog};
use crate::error::Result;
use crate::store::KeyStore;

/// Result of a replay
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Number of events read from the log
    pub events_replayed: u64,

    pub puts: u64,

    pub deletes: u64,

    /// Highest sequence seen; 0 for an empty log
    pub last_sequence: u64,
}

/// Replay `log` into `store`, then start the log's writer
///
/// Must run before the store serves any traffic. The first replay error
/// aborts startup: a corrupt or out-of-order log is never partially applied
/// and then extended.
pub fn bootstrap<L>(log: &mut L, store: &KeyStore) -> Result<RecoveryReport>
where
    L: TransactionLog + ?Sized,
{
    let report = replay(log, Some(store))?;
    log.run()?;

    tracing::info!(
        events = report.events_replayed,
        puts = report.puts,
        deletes = report.deletes,
        last_sequence = report.last_sequence,
        keys = store.len(),
        "transaction log replayed"
    );
    Ok(report)
}

/// Read the whole log and check it without applying anything
///
/// Consumes the handle's one replay; the log is not started.
pub fn verify<L>(log: &mut L) -> Result<RecoveryReport>
where
    L: TransactionLog + ?Sized,
{
    replay(log, None)
}

fn replay<L>(log: &mut L, store: Option<&KeyStore>) -> Result<RecoveryReport>
where
    L: TransactionLog + ?Sized,
{
    let mut report = RecoveryReport::default();

    for event in log.read_events()? {
        let event = event?;
        match event.event_type {
            EventType::Put => {
                report.puts += 1;
                if let Some(store) = store {
                    store.put(event.key, event.value);
                }
            }
            EventType::Delete => {
                report.deletes += 1;
                if let Some(store) = store {
                    store.delete(&event.key);
                }
            }
        }
        report.events_replayed += 1;
        report.last_sequence = event.sequence;
    }

    Ok(report)
}
