//! Synthetic log store for `--demo`: a few hundred seeded records plus a
//! producer thread that keeps appending so the live tail has something to
//! show. Deterministic (hash-mixed, no RNG dependency) so demo sessions look
//! alike.

use chrono::{Duration, NaiveDateTime, Utc};
use core_record::{Facility, Record, Severity};
use core_source::MemoryStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::JoinHandle;

const HOSTS: [&str; 3] = ["web1", "web2", "db1"];
const PROGRAMS: [&str; 5] = ["sshd", "cron", "nginx", "systemd", "kernel"];

const SEED_COUNT: u64 = 400;

fn mix(n: u64) -> u64 {
    // splitmix64 finalizer; enough spread for demo variety.
    let mut z = n.wrapping_add(0x9e3779b97f4a7c15);
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

fn synthesize(id: u64, timestamp: NaiveDateTime) -> Record {
    let h = mix(id);
    let level = match h % 20 {
        0 => 3,       // err
        1 | 2 => 4,   // warning
        3..=6 => 6,   // info
        _ => 7,       // debug
    };
    let program = PROGRAMS[(h >> 8) as usize % PROGRAMS.len()];
    let facility = if program == "kernel" { 0 } else { 3 };
    let message = if h % 31 == 0 {
        format!(
            "request failed\n  retrying in {}s\n  attempt {}",
            h % 30 + 1,
            h % 5 + 1
        )
    } else {
        format!("{program} event {id}: status {}", h % 1000)
    };
    Record {
        id,
        timestamp,
        level: Severity::new(level),
        facility: Facility::new(facility),
        host: HOSTS[(h >> 16) as usize % HOSTS.len()].into(),
        program: program.into(),
        pid: Some((h % 30_000) as u32 + 1),
        message,
    }
}

pub fn seed_store() -> MemoryStore {
    let store = MemoryStore::new();
    let now = Utc::now().naive_utc();
    for id in 1..=SEED_COUNT {
        let timestamp = now - Duration::seconds((SEED_COUNT - id) as i64 * 7);
        store.push(synthesize(id, timestamp));
    }
    store
}

pub struct DemoProducer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

/// Appends one record per interval until stopped.
pub fn spawn_producer(store: MemoryStore, interval: std::time::Duration) -> DemoProducer {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = Arc::clone(&stop);
    let next_id = AtomicU64::new(store.newest_id().unwrap_or(0) + 1);
    let handle = std::thread::spawn(move || {
        while !stop_flag.load(Ordering::SeqCst) {
            std::thread::sleep(interval);
            let id = next_id.fetch_add(1, Ordering::SeqCst);
            store.push(synthesize(id, Utc::now().naive_utc()));
        }
    });
    DemoProducer {
        stop,
        handle: Some(handle),
    }
}

impl DemoProducer {
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DemoProducer {
    fn drop(&mut self) {
        self.stop();
    }
}
