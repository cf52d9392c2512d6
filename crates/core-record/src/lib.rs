//! Log record data model.
//!
//! A [`Record`] is one row of the backing store: a monotonically increasing
//! `id` (identity; gaps allowed), a timestamp, the syslog severity/facility
//! pair, origin host and program, and the message text. Messages may contain
//! embedded newlines; the viewer never displays a `Record` directly but only
//! the [`Line`]s it expands into: one addressable row per newline-separated
//! chunk, the second and later chunks flagged as continuations.
//!
//! Everything in this crate is pure data: no I/O, no locking. Records are
//! immutable once constructed; `Line`s share their parent record behind an
//! `Arc` so that expanding a large multi-line message does not duplicate the
//! scalar fields per row.

use chrono::NaiveDateTime;
use std::fmt;
use std::sync::Arc;

/// Syslog severity code (0 = emerg .. 7 = debug). Lower is more severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Severity(u8);

const SEVERITY_NAMES: [&str; 8] = [
    "emerg", "alert", "crit", "err", "warning", "notice", "info", "debug",
];

impl Severity {
    pub const EMERG: Severity = Severity(0);
    pub const DEBUG: Severity = Severity(7);

    pub const fn new(code: u8) -> Self {
        Severity(code)
    }

    pub const fn code(self) -> u8 {
        self.0
    }

    /// Canonical lowercase name, or `None` for out-of-table codes.
    pub fn name(self) -> Option<&'static str> {
        SEVERITY_NAMES.get(self.0 as usize).copied()
    }

    /// All eight severities in code order (picker lists, tests).
    pub fn all() -> impl Iterator<Item = Severity> {
        (0..SEVERITY_NAMES.len() as u8).map(Severity)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Syslog facility code (0 = kern .. 23 = local7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Facility(u8);

const FACILITY_NAMES: [&str; 24] = [
    "kern",
    "user",
    "mail",
    "daemon",
    "auth",
    "syslog",
    "lpr",
    "news",
    "uucp",
    "cron",
    "authpriv",
    "ftp",
    "ntp",
    "security",
    "console",
    "solaris-cron",
    "local0",
    "local1",
    "local2",
    "local3",
    "local4",
    "local5",
    "local6",
    "local7",
];

impl Facility {
    pub const KERN: Facility = Facility(0);

    pub const fn new(code: u8) -> Self {
        Facility(code)
    }

    pub const fn code(self) -> u8 {
        self.0
    }

    pub fn name(self) -> Option<&'static str> {
        FACILITY_NAMES.get(self.0 as usize).copied()
    }

    pub fn all() -> impl Iterator<Item = Facility> {
        (0..FACILITY_NAMES.len() as u8).map(Facility)
    }
}

impl fmt::Display for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "{}", self.0),
        }
    }
}

/// One row of the backing record store. Identity is `id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: u64,
    pub timestamp: NaiveDateTime,
    pub level: Severity,
    pub facility: Facility,
    pub host: String,
    pub program: String,
    pub pid: Option<u32>,
    pub message: String,
}

impl Record {
    /// Expand this record into its display lines: the message split on `'\n'`
    /// (exactly; CRLF payloads keep their `'\r'`), one line per chunk, chunks
    /// after the first marked as continuations. An empty message still
    /// produces a single line. Pure and total.
    pub fn into_lines(self) -> Vec<Line> {
        let chunks: Vec<String> = self.message.split('\n').map(str::to_owned).collect();
        let record = Arc::new(self);
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, message)| Line {
                record: Arc::clone(&record),
                message,
                is_continuation: i > 0,
            })
            .collect()
    }
}

/// One renderable row derived from a [`Record`].
///
/// All lines of a record share its scalar fields and its `id`; only the
/// message chunk and the continuation flag differ. Immutable.
#[derive(Debug, Clone)]
pub struct Line {
    record: Arc<Record>,
    message: String,
    is_continuation: bool,
}

impl Line {
    pub fn id(&self) -> u64 {
        self.record.id
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.record.timestamp
    }

    pub fn level(&self) -> Severity {
        self.record.level
    }

    pub fn facility(&self) -> Facility {
        self.record.facility
    }

    pub fn host(&self) -> &str {
        &self.record.host
    }

    pub fn program(&self) -> &str {
        &self.record.program
    }

    /// The newline-free chunk this line displays (not the full record text).
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_continuation(&self) -> bool {
        self.is_continuation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(id: u64, message: &str) -> Record {
        Record {
            id,
            timestamp: NaiveDate::from_ymd_opt(2016, 6, 4)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            level: Severity::new(7),
            facility: Facility::new(0),
            host: "test".into(),
            program: "example".into(),
            pid: None,
            message: message.into(),
        }
    }

    #[test]
    fn single_chunk_message_yields_one_primary_line() {
        let lines = record(1, "hello").into_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].id(), 1);
        assert_eq!(lines[0].message(), "hello");
        assert!(!lines[0].is_continuation());
    }

    #[test]
    fn multi_line_message_expands_in_order() {
        let lines = record(42, "a\nb\nc").into_lines();
        assert_eq!(lines.len(), 3);
        let messages: Vec<&str> = lines.iter().map(|l| l.message()).collect();
        assert_eq!(messages, ["a", "b", "c"]);
        assert!(!lines[0].is_continuation());
        assert!(lines[1].is_continuation());
        assert!(lines[2].is_continuation());
        assert!(lines.iter().all(|l| l.id() == 42));
    }

    #[test]
    fn empty_message_still_yields_one_line() {
        let lines = record(7, "").into_lines();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].message(), "");
        assert!(!lines[0].is_continuation());
    }

    #[test]
    fn trailing_newline_yields_empty_continuation() {
        let lines = record(9, "tail\n").into_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].message(), "");
        assert!(lines[1].is_continuation());
    }

    #[test]
    fn crlf_is_not_special_cased() {
        let lines = record(10, "a\r\nb").into_lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].message(), "a\r");
        assert_eq!(lines[1].message(), "b");
    }

    #[test]
    fn severity_names_cover_the_table() {
        assert_eq!(Severity::new(0).name(), Some("emerg"));
        assert_eq!(Severity::new(7).name(), Some("debug"));
        assert_eq!(Severity::new(8).name(), None);
        assert_eq!(Severity::new(3).to_string(), "err");
        assert_eq!(Severity::new(99).to_string(), "99");
    }

    #[test]
    fn facility_names_cover_the_table() {
        assert_eq!(Facility::new(0).name(), Some("kern"));
        assert_eq!(Facility::new(23).name(), Some("local7"));
        assert_eq!(Facility::new(24).name(), None);
        assert_eq!(Facility::all().count(), 24);
    }

    #[test]
    fn severity_orders_by_code() {
        assert!(Severity::EMERG < Severity::DEBUG);
        assert!(Severity::new(3) < Severity::new(4));
    }
}
