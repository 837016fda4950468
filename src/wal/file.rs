//! File-backed transaction log
//!
//! One tab-separated line per event, appended to a single file. Sequence
//! numbers are assigned locally by the writer, continuing from the last
//! record found on disk.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, Sender};

use super::cursor::{OrderCheck, SequenceCursor};
use super::pipeline::{EventSink, WritePipeline};
use super::{Event, EventStream, TransactionLog};
use crate::config::{Config, SyncStrategy};
use crate::error::{KvError, Result};

/// Transaction log stored as an append-only text file
pub struct FileTransactionLog {
    path: PathBuf,

    /// Append handle; moved into the writer thread by `run`
    file: Option<File>,

    sync_strategy: SyncStrategy,
    queue_capacity: usize,

    cursor: Arc<SequenceCursor>,
    replay_started: bool,
    pipeline: Option<WritePipeline>,
    closed: bool,

    errors_tx: Sender<KvError>,
    errors_rx: Receiver<KvError>,
}

impl FileTransactionLog {
    /// Open or create the log file at `path`
    ///
    /// Existing records are preserved; new ones are only ever appended.
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let (errors_tx, errors_rx) = channel::bounded(config.error_capacity);

        tracing::info!(path = %path.display(), "opened transaction log file");

        Ok(Self {
            path,
            file: Some(file),
            sync_strategy: config.sync_strategy,
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

    /// Scan the whole file to find the last sequence on disk
    ///
    /// Used when `run` is called without a completed replay, so the writer
    /// never reuses or falls behind a persisted sequence number.
    fn seed_sequence(&self) -> Result<()> {
        let mut records = 0u64;
        for event in RecordReader::new(File::open(&self.path)?) {
            self.cursor.advance(event?.sequence);
            records += 1;
        }
        self.cursor.mark_replayed();

        tracing::warn!(
            records,
            last_sequence = self.cursor.last(),
            "log started without replay; seeded sequence counter from disk"
        );
        Ok(())
    }

    fn pipeline(&self) -> Result<&WritePipeline> {
        match &self.pipeline {
            Some(pipeline) => Ok(pipeline),
            None if self.closed => Err(KvError::LogClosed),
            None => Err(KvError::LogNotRunning),
        }
    }
}

impl TransactionLog for FileTransactionLog {
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
        if !self.cursor.is_replayed() {
            self.seed_sequence()?;
        }
        self.replay_started = true;

        let file = self.file.take().ok_or(KvError::LogClosed)?;
        let sink = FileSink::new(file, self.cursor.last(), self.sync_strategy)?;

        self.pipeline = Some(WritePipeline::start(
            "kvlog-file",
            sink,
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

        let file = File::open(&self.path)?;
        let cursor = Arc::clone(&self.cursor);

        EventStream::spawn("kvlog-file", move |sender| {
            for record in RecordReader::new(file) {
                match record {
                    Ok(event) => {
                        cursor.advance(event.sequence);
                        if sender.send(Ok(event)).is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        let _ = sender.send(Err(e));
                        return;
                    }
                }
            }
            cursor.mark_replayed();
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
        self.file.take();

        tracing::info!(
            path = %self.path.display(),
            last_sequence = self.cursor.last(),
            "closed transaction log file"
        );
        result
    }

    fn last_sequence(&self) -> u64 {
        self.cursor.last()
    }
}

/// Parses and order-checks records line by line
///
/// Every record must end in `\n`; a final line without one is the tail of
/// an interrupted append and is rejected like any other malformed record.
struct RecordReader {
    reader: BufReader<File>,
    buf: String,
    line_no: u64,
    order: OrderCheck,
    done: bool,
}

impl RecordReader {
    fn new(file: File) -> Self {
        Self {
            reader: BufReader::new(file),
            buf: String::new(),
            line_no: 0,
            order: OrderCheck::default(),
            done: false,
        }
    }

    fn decode(&mut self) -> Result<Event> {
        let line = self
            .buf
            .strip_suffix('\n')
            .ok_or_else(|| KvError::Parse {
                line: self.line_no,
                reason: "record has no line terminator (torn write)".to_string(),
            })?;
        let event = Event::from_line(line, self.line_no)?;
        self.order.observe(event.sequence)?;
        Ok(event)
    }
}

impl Iterator for RecordReader {
    type Item = Result<Event>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        self.buf.clear();
        let record = match self.reader.read_line(&mut self.buf) {
            Ok(0) => return None,
            Ok(_) => {
                self.line_no += 1;
                self.decode()
            }
            Err(e) => Err(e.into()),
        };
        if record.is_err() {
            self.done = true;
        }
        Some(record)
    }
}

/// Writer-side half of the file log, owned by the worker thread
///
/// Lines go straight to the file with no userspace buffer, so a failed
/// append never leaves bytes behind to be written later under a reused
/// sequence number.
struct FileSink {
    file: File,

    /// File length up to the end of the last complete record
    committed_len: u64,

    /// Set when an append failed and its partial bytes may still be on disk
    needs_repair: bool,

    last_sequence: u64,
    sync_strategy: SyncStrategy,
    unsynced: usize,
}

impl FileSink {
    fn new(file: File, last_sequence: u64, sync_strategy: SyncStrategy) -> Result<Self> {
        let committed_len = file.metadata()?.len();
        Ok(Self {
            file,
            committed_len,
            needs_repair: false,
            last_sequence,
            sync_strategy,
            unsynced: 0,
        })
    }

    /// Cut the file back to the last complete record
    fn repair(&mut self) -> Result<()> {
        self.file.set_len(self.committed_len)?;
        self.needs_repair = false;
        tracing::warn!(
            committed_len = self.committed_len,
            "truncated partial record after failed append"
        );
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        self.unsynced = 0;
        Ok(())
    }
}

impl EventSink for FileSink {
    fn persist(&mut self, mut event: Event) -> Result<u64> {
        // Never append after a torn record
        if self.needs_repair {
            self.repair()?;
        }

        let sequence = self.last_sequence + 1;
        event.sequence = sequence;
        let line = event.to_line();

        if let Err(e) = self.file.write_all(line.as_bytes()) {
            self.needs_repair = true;
            if let Err(repair) = self.repair() {
                tracing::error!(error = %repair, "could not truncate partial record");
            }
            return Err(e.into());
        }

        self.committed_len += line.len() as u64;
        self.last_sequence = sequence;
        self.unsynced += 1;
        Ok(sequence)
    }

    fn commit(&mut self) -> Result<()> {
        match self.sync_strategy {
            SyncStrategy::EveryWrite => self.sync(),
            SyncStrategy::EveryNEntries { count } if self.unsynced >= count => self.sync(),
            SyncStrategy::EveryNEntries { .. } => Ok(()),
        }
    }

    fn finish(&mut self) -> Result<()> {
        if self.unsynced > 0 {
            self.sync()?;
        }
        Ok(())
    }
}
