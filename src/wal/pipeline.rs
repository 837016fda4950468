//! Asynchronous write pipeline
//!
//! Producers push events into a bounded crossbeam channel; exactly one
//! worker thread drains it and hands each event to an [`EventSink`].
//!
//! ```text
//!  write_put ──┐
//!  write_put ──┼──► bounded(capacity) ──► worker ──► sink (file / sqlite)
//!  write_del ──┘        (blocks when full)    │
//!                                             └──► errors channel
//! ```
//!
//! One consumer means events are persisted in enqueue order, which is what
//! keeps sequence numbers monotonic.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender, TrySendError};
use parking_lot::{Condvar, Mutex};

use super::cursor::SequenceCursor;
use super::Event;
use crate::error::{KvError, Result};

/// Backing store the worker writes into
pub(crate) trait EventSink: Send + 'static {
    /// Persist one event, returning the sequence it was stored under
    fn persist(&mut self, event: Event) -> Result<u64>;

    /// Durability step run after a successful `persist`
    ///
    /// A failure here is reported, but the event already counts as written.
    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called once after the queue has closed and drained
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Count of events enqueued but not yet handled by the worker
#[derive(Default)]
struct InFlight {
    state: Mutex<InFlightState>,
    drained: Condvar,
}

#[derive(Default)]
struct InFlightState {
    pending: usize,

    /// Worker has exited; nothing left will ever be handled
    stopped: bool,
}

impl InFlight {
    fn add(&self) {
        self.state.lock().pending += 1;
    }

    fn done(&self) {
        let mut state = self.state.lock();
        state.pending = state.pending.saturating_sub(1);
        if state.pending == 0 {
            self.drained.notify_all();
        }
    }

    fn stop(&self) {
        self.state.lock().stopped = true;
        self.drained.notify_all();
    }

    fn wait(&self) {
        let mut state = self.state.lock();
        while state.pending > 0 && !state.stopped {
            self.drained.wait(&mut state);
        }
    }
}

/// Releases waiters when the worker exits, including by panic
struct StopOnExit(Arc<InFlight>);

impl Drop for StopOnExit {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Handle to a running writer thread
pub(crate) struct WritePipeline {
    sender: Option<Sender<Event>>,
    in_flight: Arc<InFlight>,
    worker: Option<JoinHandle<Result<()>>>,
}

impl WritePipeline {
    /// Spawn the writer thread for `sink`
    pub(crate) fn start<S: EventSink>(
        name: &str,
        sink: S,
        capacity: usize,
        errors: Sender<KvError>,
        cursor: Arc<SequenceCursor>,
    ) -> Result<Self> {
        let (sender, receiver) = channel::bounded(capacity);
        let in_flight = Arc::new(InFlight::default());

        let worker = Worker {
            sink,
            receiver,
            errors,
            cursor,
            in_flight: Arc::clone(&in_flight),
        };
        let handle = thread::Builder::new()
            .name(format!("{}-writer", name))
            .spawn(move || worker.run())?;

        tracing::debug!(writer = name, capacity, "transaction log writer started");

        Ok(Self {
            sender: Some(sender),
            in_flight,
            worker: Some(handle),
        })
    }

    /// Enqueue an event, blocking while the queue is full
    pub(crate) fn submit(&self, event: Event) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(KvError::LogClosed)?;
        self.in_flight.add();
        if sender.send(event).is_err() {
            // Worker is gone; nothing will ever mark this one done
            self.in_flight.done();
            return Err(KvError::LogClosed);
        }
        Ok(())
    }

    /// Block until every submitted event has been handled
    pub(crate) fn wait(&self) {
        self.in_flight.wait();
    }

    /// Drain, close the queue and join the worker
    ///
    /// Returns the sink's final flush result.
    pub(crate) fn shutdown(&mut self) -> Result<()> {
        self.wait();
        self.sender.take();

        match self.worker.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                Err(KvError::Io(std::io::Error::other(
                    "transaction log writer panicked",
                )))
            }),
            None => Ok(()),
        }
    }
}

impl Drop for WritePipeline {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(error = %e, "transaction log shutdown failed");
        }
    }
}

struct Worker<S> {
    sink: S,
    receiver: Receiver<Event>,
    errors: Sender<KvError>,
    cursor: Arc<SequenceCursor>,
    in_flight: Arc<InFlight>,
}

impl<S: EventSink> Worker<S> {
    fn run(mut self) -> Result<()> {
        let _stop = StopOnExit(Arc::clone(&self.in_flight));

        for event in self.receiver.iter() {
            let event_type = event.event_type;
            match self.sink.persist(event) {
                Ok(sequence) => {
                    self.cursor.advance(sequence);
                    tracing::trace!(sequence, %event_type, "event persisted");
                    if let Err(e) = self.sink.commit() {
                        report(&self.errors, e);
                    }
                }
                Err(e) => report(&self.errors, e),
            }
            self.in_flight.done();
        }

        self.sink.finish()
    }
}

/// Surface a write failure out of band
///
/// Failures are always logged; the channel copy is dropped when nobody has
/// drained earlier ones.
fn report(errors: &Sender<KvError>, error: KvError) {
    tracing::error!(error = %error, "transaction log write failed");
    match errors.try_send(error) {
        Ok(()) => {}
        Err(TrySendError::Full(dropped)) => {
            tracing::warn!(error = %dropped, "error channel full; dropping write failure");
        }
        Err(TrySendError::Disconnected(_)) => {}
    }
}
