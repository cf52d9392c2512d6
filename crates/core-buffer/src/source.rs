//! Upstream record source contract.
//!
//! The screen buffer consumes records through this pair of traits and nothing
//! else; SQL drivers, in-memory stores, and test fakes all plug in here. The
//! source is owned by the fetch thread for the duration of a run, so
//! implementations need `Send` but not `Sync`.

use core_record::Record;
use thiserror::Error;

/// Failures surfaced by a record source. Connection failures are fatal to the
/// fetch thread; query failures are transient (logged, then the loop resumes
/// waiting).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("record source connection failed: {reason}")]
    Connect { reason: String },
    #[error("record query failed: {reason}")]
    Query { reason: String },
}

impl SourceError {
    pub fn connect(reason: impl Into<String>) -> Self {
        SourceError::Connect {
            reason: reason.into(),
        }
    }

    pub fn query(reason: impl Into<String>) -> Self {
        SourceError::Query {
            reason: reason.into(),
        }
    }
}

/// A prepared range query being drained one record at a time. `Ok(None)`
/// signals end-of-stream; a short stream (fewer records than asked for) tells
/// the buffer that direction is exhausted from that anchor.
pub trait RecordCursor {
    fn fetch_record(&mut self) -> Result<Option<Record>, SourceError>;
}

/// Produces records in either direction from an anchor id.
///
/// Semantics of [`RecordSource::prepare_query`]:
/// * `anchor == None`: start from the newest record (callers pass
///   `descending = true`).
/// * `descending == true`: records with `id < anchor`, strictly decreasing.
/// * `descending == false`: records with `id > anchor`, strictly increasing.
/// * At most `count` records.
///
/// Timeouts are the source's responsibility; the buffer imposes none.
pub trait RecordSource: Send {
    fn start_connection(&mut self) -> Result<(), SourceError>;
    fn stop_connection(&mut self) -> Result<(), SourceError>;
    fn prepare_query(
        &mut self,
        anchor: Option<u64>,
        descending: bool,
        count: usize,
    ) -> Result<Box<dyn RecordCursor + '_>, SourceError>;
}

/// Cursor over an already materialized batch. Convenient for sources that
/// execute the whole bounded query up front (the SQLite source does, since
/// `count` bounds the batch).
pub struct BatchCursor {
    records: std::collections::VecDeque<Record>,
}

impl BatchCursor {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records: records.into(),
        }
    }
}

impl RecordCursor for BatchCursor {
    fn fetch_record(&mut self) -> Result<Option<Record>, SourceError> {
        Ok(self.records.pop_front())
    }
}
