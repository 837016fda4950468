//! Replay stream
//!
//! Persisted events are read by a background thread and handed to the
//! caller through a bounded channel. The stream stops after the first error.

use std::thread;

use crossbeam::channel::{self, Receiver, Sender};

use super::Event;
use crate::error::Result;

/// Events buffered between the replay thread and its consumer
const REPLAY_BUFFER: usize = 64;

/// Lazy, single-pass iterator over persisted events in sequence order
///
/// Yields `Ok(event)` for each record, then at most one `Err` and ends.
/// Dropping the stream early stops the producer at its next send.
pub struct EventStream {
    receiver: Receiver<Result<Event>>,
    failed: bool,
}

impl EventStream {
    /// Run `produce` on a named background thread
    pub(crate) fn spawn<F>(name: &str, produce: F) -> Result<Self>
    where
        F: FnOnce(&Sender<Result<Event>>) + Send + 'static,
    {
        let (sender, receiver) = channel::bounded(REPLAY_BUFFER);
        thread::Builder::new()
            .name(format!("{}-replay", name))
            .spawn(move || produce(&sender))?;

        Ok(Self {
            receiver,
            failed: false,
        })
    }
}

impl Iterator for EventStream {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.receiver.recv() {
            Ok(Ok(event)) => Some(Ok(event)),
            Ok(Err(e)) => {
                self.failed = true;
                Some(Err(e))
            }
            // Producer finished and dropped its sender
            Err(_) => None,
        }
    }
}
