//! Transaction log events
//!
//! Defines the record persisted for every mutation and its text encoding.

use std::fmt;

use super::escape::{escape, unescape};
use crate::error::{KvError, Result};

/// Field delimiter of the file format
pub const FIELD_DELIMITER: char = '\t';

/// Fields per record: sequence, event type, key, value
const FIELD_COUNT: usize = 4;

/// Kind of mutation an event records
///
/// The discriminants are the on-disk codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Delete = 1,
    Put = 2,
}

impl EventType {
    /// Numeric code stored in the log
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn from_code(code: i64) -> Result<Self> {
        match code {
            1 => Ok(EventType::Delete),
            2 => Ok(EventType::Put),
            other => Err(KvError::UnknownEventType(other)),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Delete => f.write_str("DELETE"),
            EventType::Put => f.write_str("PUT"),
        }
    }
}

/// A single entry in the transaction log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Assigned by the log; strictly increasing, 0 until persisted
    pub sequence: u64,

    pub event_type: EventType,

    /// The key affected by the mutation
    pub key: String,

    /// New value for a Put; empty for a Delete
    pub value: String,
}

impl Event {
    /// An unsequenced Put event
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            event_type: EventType::Put,
            key: key.into(),
            value: value.into(),
        }
    }

    /// An unsequenced Delete event
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            event_type: EventType::Delete,
            key: key.into(),
            value: String::new(),
        }
    }

    /// Encode as one log line, including the trailing newline
    ///
    /// Format: `sequence\tevent_type\tkey\tvalue\n`
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\n",
            self.sequence,
            self.event_type.code(),
            escape(&self.key),
            escape(&self.value)
        )
    }

    /// Decode one log line (without its newline)
    ///
    /// `line_no` is 1-based and only used for error reporting.
    pub fn from_line(line: &str, line_no: u64) -> Result<Self> {
        let parse_err = |reason: String| KvError::Parse {
            line: line_no,
            reason,
        };

        let fields: Vec<&str> = line.split(FIELD_DELIMITER).collect();
        if fields.len() != FIELD_COUNT {
            return Err(parse_err(format!(
                "expected {} fields, found {}",
                FIELD_COUNT,
                fields.len()
            )));
        }

        let sequence = fields[0]
            .parse::<u64>()
            .map_err(|e| parse_err(format!("bad sequence '{}': {}", fields[0], e)))?;
        let code = fields[1]
            .parse::<i64>()
            .map_err(|e| parse_err(format!("bad event type '{}': {}", fields[1], e)))?;
        let event_type = EventType::from_code(code)?;

        let key = unescape(fields[2])?.into_owned();
        if key.is_empty() {
            return Err(parse_err("empty key".to_string()));
        }
        let value = unescape(fields[3])?.into_owned();

        Ok(Self {
            sequence,
            event_type,
            key,
            value,
        })
    }
}
