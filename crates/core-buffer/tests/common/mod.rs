//! Shared fixtures for the buffer integration suites: a scripted record
//! source over a contiguous id range plus record builders.

use chrono::NaiveDate;
use core_buffer::{BatchCursor, RecordCursor, RecordSource, SourceError};
use core_record::{Facility, Record, Severity};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn record(id: u64, message: &str) -> Record {
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

pub type CallLog = Arc<Mutex<Vec<(Option<u64>, bool, usize)>>>;

/// Scripted source holding records `1..=last_id` with `message == id`.
/// Every query is recorded; `last_id` can be raised afterwards to simulate a
/// growing tail, and `fail_next_query` forces one transient failure.
pub struct FakeSource {
    pub last_id: Arc<AtomicU64>,
    pub calls: CallLog,
    pub connects: Arc<AtomicUsize>,
    pub disconnects: Arc<AtomicUsize>,
    pub fail_next_query: Arc<AtomicBool>,
    pub refuse_connection: bool,
}

impl FakeSource {
    pub fn new(last_id: u64) -> Self {
        Self {
            last_id: Arc::new(AtomicU64::new(last_id)),
            calls: Arc::new(Mutex::new(Vec::new())),
            connects: Arc::new(AtomicUsize::new(0)),
            disconnects: Arc::new(AtomicUsize::new(0)),
            fail_next_query: Arc::new(AtomicBool::new(false)),
            refuse_connection: false,
        }
    }

    fn batch(&self, anchor: Option<u64>, descending: bool, count: usize) -> Vec<Record> {
        let last = self.last_id.load(Ordering::SeqCst);
        let ids: Vec<u64> = match (anchor, descending) {
            (None, _) => {
                let low = last.saturating_sub(count as u64 - 1).max(1);
                (low..=last).rev().collect()
            }
            (Some(anchor), true) => {
                let high = anchor.saturating_sub(1);
                if high == 0 {
                    Vec::new()
                } else {
                    let low = anchor.saturating_sub(count as u64).max(1);
                    (low..=high).rev().collect()
                }
            }
            (Some(anchor), false) => {
                let low = anchor + 1;
                let high = (anchor + count as u64).min(last);
                if low > high {
                    Vec::new()
                } else {
                    (low..=high).collect()
                }
            }
        };
        ids.into_iter()
            .map(|id| record(id, &id.to_string()))
            .collect()
    }
}

impl RecordSource for FakeSource {
    fn start_connection(&mut self) -> Result<(), SourceError> {
        if self.refuse_connection {
            return Err(SourceError::connect("refused by test"));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn stop_connection(&mut self) -> Result<(), SourceError> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn prepare_query(
        &mut self,
        anchor: Option<u64>,
        descending: bool,
        count: usize,
    ) -> Result<Box<dyn RecordCursor + '_>, SourceError> {
        self.calls
            .lock()
            .unwrap()
            .push((anchor, descending, count));
        if self.fail_next_query.swap(false, Ordering::SeqCst) {
            return Err(SourceError::query("injected by test"));
        }
        Ok(Box::new(BatchCursor::new(self.batch(
            anchor, descending, count,
        ))))
    }
}
