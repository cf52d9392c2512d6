//! Memory source behavior: contract parity with the SQL source plus live
//! append.

use chrono::NaiveDate;
use core_buffer::{BufferOptions, RecordSource, ScreenBuffer};
use core_query::Filter;
use core_record::{Facility, Line, Record, Severity};
use core_source::{MemorySource, MemoryStore};

fn record(id: u64, program: &str, level: u8) -> Record {
    Record {
        id,
        timestamp: NaiveDate::from_ymd_opt(2016, 6, 4)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
        level: Severity::new(level),
        facility: Facility::new(3),
        host: "host1".into(),
        program: program.into(),
        pid: None,
        message: format!("message {id}"),
    }
}

fn store(count: u64) -> MemoryStore {
    let store = MemoryStore::new();
    for id in 1..=count {
        store.push(record(id, if id % 2 == 0 { "cron" } else { "sshd" }, 6));
    }
    store
}

fn drain(source: &mut MemorySource, anchor: Option<u64>, desc: bool, count: usize) -> Vec<u64> {
    let mut cursor = source.prepare_query(anchor, desc, count).unwrap();
    let mut ids = Vec::new();
    while let Some(record) = cursor.fetch_record().unwrap() {
        ids.push(record.id);
    }
    ids
}

#[test]
fn directions_and_bounds_match_the_contract() {
    let mut src = MemorySource::new(store(50), Filter::default());
    assert_eq!(drain(&mut src, None, true, 3), [50, 49, 48]);
    assert_eq!(drain(&mut src, Some(10), true, 3), [9, 8, 7]);
    assert_eq!(drain(&mut src, Some(10), false, 3), [11, 12, 13]);
    assert_eq!(drain(&mut src, Some(50), false, 3), Vec::<u64>::new());
}

#[test]
fn filter_applies_in_memory() {
    let filter = Filter {
        program: Some("sshd".into()),
        ..Filter::default()
    };
    let mut src = MemorySource::new(store(20), filter);
    assert_eq!(drain(&mut src, None, true, 4), [19, 17, 15, 13]);
}

#[test]
fn origin_rebases_anchorless_queries() {
    let mut src = MemorySource::new(store(50), Filter::default()).with_origin(Some(20));
    assert_eq!(drain(&mut src, None, true, 3), [20, 19, 18]);
    assert_eq!(drain(&mut src, Some(20), false, 2), [21, 22]);
}

#[test]
fn out_of_order_push_keeps_the_store_sorted() {
    let store = MemoryStore::new();
    store.push(record(5, "sshd", 6));
    store.push(record(1, "sshd", 6));
    store.push(record(3, "sshd", 6));
    let mut src = MemorySource::new(store, Filter::default());
    assert_eq!(drain(&mut src, None, true, 10), [5, 3, 1]);
}

#[test]
fn live_append_reaches_the_buffer_on_the_next_cycle() {
    let store = store(100);
    let buf = ScreenBuffer::new(
        BufferOptions::new(2)
            .buffer_size(5)
            .low_buffer_threshold(2),
    );
    let mut src = MemorySource::new(store.clone(), Filter::default());
    src.start_connection().unwrap();
    buf.pull_records(&mut src).unwrap();
    let ids: Vec<u64> = buf.current_lines().iter().map(Line::id).collect();
    assert_eq!(ids, [99, 100]);

    store.push(record(101, "sshd", 6));
    store.push(record(102, "cron", 6));
    buf.pull_records(&mut src).unwrap();

    let ids: Vec<u64> = buf.current_lines().iter().map(Line::id).collect();
    assert_eq!(ids, [99, 100], "tail folds in without moving the cursor");
    buf.go_to_next_page();
    let ids: Vec<u64> = buf.current_lines().iter().map(Line::id).collect();
    assert_eq!(ids, [101, 102]);
}
