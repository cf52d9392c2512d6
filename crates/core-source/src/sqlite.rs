//! SQLite-backed record source.
//!
//! The connection is opened in `start_connection` and dropped in
//! `stop_connection`, so the handle lives entirely on the fetch thread.
//! Queries are rendered by `core-query` and executed eagerly: the plan bounds
//! `count`, so materializing the batch keeps the cursor free of statement
//! lifetimes at O(batch) cost.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE logs (
//!     id           INTEGER PRIMARY KEY,
//!     facility_num INTEGER,
//!     level_num    INTEGER,
//!     host         TEXT,
//!     datetime     TEXT,    -- '%Y-%m-%d %H:%M:%S'
//!     program      TEXT,
//!     pid          INTEGER,
//!     message      TEXT
//! )
//! ```

use chrono::NaiveDateTime;
use core_buffer::{BatchCursor, RecordCursor, RecordSource, SourceError};
use core_query::Filter;
use core_record::{Facility, Record, Severity};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use tracing::debug;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct SqliteSource {
    path: PathBuf,
    filter: Filter,
    /// When set, anchorless queries start here instead of at the newest
    /// record (timestamp jumps).
    origin: Option<u64>,
    conn: Option<Connection>,
}

impl SqliteSource {
    pub fn new(path: impl Into<PathBuf>, filter: Filter) -> Self {
        Self {
            path: path.into(),
            filter,
            origin: None,
            conn: None,
        }
    }

    pub fn with_origin(mut self, origin: Option<u64>) -> Self {
        self.origin = origin;
        self
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }
}

impl RecordSource for SqliteSource {
    fn start_connection(&mut self) -> Result<(), SourceError> {
        let conn = Connection::open(&self.path)
            .map_err(|e| SourceError::connect(e.to_string()))?;
        debug!(target: "source.sql", path = %self.path.display(), "connection_opened");
        self.conn = Some(conn);
        Ok(())
    }

    fn stop_connection(&mut self) -> Result<(), SourceError> {
        if self.conn.take().is_some() {
            debug!(target: "source.sql", path = %self.path.display(), "connection_closed");
        }
        Ok(())
    }

    fn prepare_query(
        &mut self,
        anchor: Option<u64>,
        descending: bool,
        count: usize,
    ) -> Result<Box<dyn RecordCursor + '_>, SourceError> {
        let conn = self
            .conn
            .as_ref()
            .ok_or_else(|| SourceError::query("not connected"))?;
        let sql = match (anchor, self.origin) {
            (None, Some(origin)) => self.filter.select_from_origin(origin, count),
            _ => self.filter.select(anchor, descending, count),
        };
        debug!(target: "source.sql", sql = %sql, "query");
        let records = run_select(conn, &sql)?;
        Ok(Box::new(BatchCursor::new(records)))
    }
}

fn run_select(conn: &Connection, sql: &str) -> Result<Vec<Record>, SourceError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| SourceError::query(e.to_string()))?;
    let rows = stmt
        .query_map([], record_from_row)
        .map_err(|e| SourceError::query(e.to_string()))?;
    let mut records = Vec::new();
    for row in rows {
        records.push(row.map_err(|e| SourceError::query(e.to_string()))?);
    }
    Ok(records)
}

fn record_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Record> {
    let id: i64 = row.get(0)?;
    let facility: i64 = row.get::<_, Option<i64>>(1)?.unwrap_or(0);
    let level: i64 = row.get::<_, Option<i64>>(2)?.unwrap_or(7);
    let host: Option<String> = row.get(3)?;
    let datetime: Option<String> = row.get(4)?;
    let program: Option<String> = row.get(5)?;
    let pid: Option<i64> = row.get(6)?;
    let message: Option<String> = row.get(7)?;
    Ok(Record {
        id: id as u64,
        timestamp: parse_datetime(datetime.as_deref()),
        level: Severity::new(level as u8),
        facility: Facility::new(facility as u8),
        host: host.unwrap_or_default(),
        program: program.unwrap_or_default(),
        pid: pid.and_then(|p| u32::try_from(p).ok()),
        message: message.unwrap_or_default(),
    })
}

/// Unparseable or missing timestamps degrade to the epoch rather than
/// poisoning the whole batch.
fn parse_datetime(text: Option<&str>) -> NaiveDateTime {
    text.and_then(|t| NaiveDateTime::parse_from_str(t, DATETIME_FORMAT).ok())
        .unwrap_or_default()
}

/// Resolve a timestamp to the newest matching record id at or before it,
/// over a short-lived connection. Used on the view side before a restart, so
/// it deliberately does not touch the fetch thread's handle.
pub fn newest_id_at(
    path: &Path,
    filter: &Filter,
    timestamp: NaiveDateTime,
) -> Result<Option<u64>, SourceError> {
    let conn = Connection::open(path).map_err(|e| SourceError::connect(e.to_string()))?;
    let sql = filter.newest_id_at(timestamp);
    debug!(target: "source.sql", sql = %sql, "query");
    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| SourceError::query(e.to_string()))?;
    let mut rows = stmt
        .query([])
        .map_err(|e| SourceError::query(e.to_string()))?;
    match rows.next().map_err(|e| SourceError::query(e.to_string()))? {
        Some(row) => {
            let id: i64 = row.get(0).map_err(|e| SourceError::query(e.to_string()))?;
            Ok(Some(id as u64))
        }
        None => Ok(None),
    }
}
