//! Sequence bookkeeping shared by replay and the writer

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::error::{KvError, Result};

/// Highest sequence a log handle has observed
///
/// Advanced by the replay thread while reading and by the writer after each
/// persisted event. `replayed` is set once a replay reaches the end of the
/// log cleanly, meaning `last` covers every persisted record.
#[derive(Debug, Default)]
pub(crate) struct SequenceCursor {
    last: AtomicU64,
    replayed: AtomicBool,
}

impl SequenceCursor {
    pub(crate) fn last(&self) -> u64 {
        self.last.load(Ordering::Acquire)
    }

    pub(crate) fn advance(&self, sequence: u64) {
        self.last.fetch_max(sequence, Ordering::AcqRel);
    }

    pub(crate) fn mark_replayed(&self) {
        self.replayed.store(true, Ordering::Release);
    }

    pub(crate) fn is_replayed(&self) -> bool {
        self.replayed.load(Ordering::Acquire)
    }
}

/// Rejects any record whose sequence does not exceed its predecessor's
#[derive(Debug, Default)]
pub(crate) struct OrderCheck {
    previous: u64,
}

impl OrderCheck {
    pub(crate) fn observe(&mut self, sequence: u64) -> Result<()> {
        if sequence <= self.previous {
            return Err(KvError::OutOfSequence {
                previous: self.previous,
                found: sequence,
            });
        }
        self.previous = sequence;
        Ok(())
    }
}
