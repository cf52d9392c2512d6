//! In-memory record source: demo mode and tests.
//!
//! A [`MemoryStore`] is a shared, id-sorted record vector; cloning it clones
//! the handle, not the data, so a producer thread can keep appending while
//! the fetch thread reads. [`MemorySource`] applies the same filter and
//! anchor semantics as the SQL source, via `Filter::matches`.

use core_buffer::{BatchCursor, RecordCursor, RecordSource, SourceError};
use core_query::Filter;
use core_record::Record;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
pub struct MemoryStore {
    records: Arc<Mutex<Vec<Record>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping the id order; appends are O(1) for the common
    /// monotonic producer.
    pub fn push(&self, record: Record) {
        let mut records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let at = records.partition_point(|r| r.id <= record.id);
        records.insert(at, record);
    }

    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn newest_id(&self) -> Option<u64> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .map(|r| r.id)
    }

    /// Newest matching record at or before `timestamp` (datetime jumps).
    pub fn newest_id_at(
        &self,
        filter: &Filter,
        timestamp: chrono::NaiveDateTime,
    ) -> Option<u64> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .rev()
            .find(|r| r.timestamp <= timestamp && filter.matches(r))
            .map(|r| r.id)
    }

    fn select(
        &self,
        filter: &Filter,
        anchor: Option<u64>,
        descending: bool,
        origin: Option<u64>,
        count: usize,
    ) -> Vec<Record> {
        let records = self.records.lock().unwrap_or_else(|e| e.into_inner());
        let matching = records.iter().filter(|r| filter.matches(r));
        // The vector is id-ascending, so reverse iteration yields a
        // descending stream directly.
        match (anchor, descending) {
            (None, _) => matching
                .filter(|r| origin.is_none_or(|o| r.id <= o))
                .rev()
                .take(count)
                .cloned()
                .collect(),
            (Some(anchor), true) => matching
                .filter(|r| r.id < anchor)
                .rev()
                .take(count)
                .cloned()
                .collect(),
            (Some(anchor), false) => matching
                .filter(|r| r.id > anchor)
                .take(count)
                .cloned()
                .collect(),
        }
    }
}

pub struct MemorySource {
    store: MemoryStore,
    filter: Filter,
    origin: Option<u64>,
}

impl MemorySource {
    pub fn new(store: MemoryStore, filter: Filter) -> Self {
        Self {
            store,
            filter,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: Option<u64>) -> Self {
        self.origin = origin;
        self
    }
}

impl RecordSource for MemorySource {
    fn start_connection(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn stop_connection(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn prepare_query(
        &mut self,
        anchor: Option<u64>,
        descending: bool,
        count: usize,
    ) -> Result<Box<dyn RecordCursor + '_>, SourceError> {
        let batch = self
            .store
            .select(&self.filter, anchor, descending, self.origin, count);
        Ok(Box::new(BatchCursor::new(batch)))
    }
}
