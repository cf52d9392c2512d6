//! Paging screen buffer: a sliding window of display lines over an unbounded,
//! externally sourced record sequence.
//!
//! The buffer keeps enough lines around the viewport that scrolling is
//! latency-free, computes the minimal set of range queries needed to stay
//! that way, and folds asynchronously arriving records in without moving the
//! user's cursor. Two threads touch it: the view thread (user operations,
//! `current_lines` on redraw) and the fetch thread spawned by [`ScreenBuffer::start`],
//! which owns the [`RecordSource`] and executes the prefetch plan whenever it
//! is woken.
//!
//! Core invariants (hold after every public call):
//! * `position <= max(0, lines.len() - page_size)`.
//! * `lines` is sorted non-decreasing by record id; all lines of one record
//!   are contiguous and in continuation order.
//! * `page_size >= 1` and `buffer_size >= page_size` (raising the page size
//!   widens `buffer_size` rather than rejecting the resize).
//! * Each prepend/append is atomic under the buffer mutex, so observers and
//!   the view always see a consistent snapshot even mid-fetch.
//!
//! Concurrency model: one mutex over the whole state, one condition variable
//! for the fetch thread. Every user-visible mutation that could change the
//! prefetch plan ends by setting the `invalid` flag and signalling the
//! condition. Observer callbacks run *outside* the lock, over a snapshot of
//! the registry, each isolated so a panicking observer cannot starve the
//! rest.
//!
//! `bottom_seen` is sticky once any fetch returns short, but only guards
//! *descending* plans (re-requesting history past the known head). Ascending
//! fetches stay allowed so the live tail keeps folding in. The original
//! implementation this preserves set the flag on short reads in either
//! direction while consulting it only for descending ones; that asymmetry is
//! kept deliberately.

mod fetch;
mod source;

pub use source::{BatchCursor, RecordCursor, RecordSource, SourceError};

use core_record::{Line, Record};
use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::error;

/// Sizing parameters for a [`ScreenBuffer`].
///
/// `buffer_size` is the prefetch batch size (default `page_size * 5`);
/// `low_buffer_threshold` is the headroom kept above and below the viewport
/// before a refill triggers (default `page_size`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferOptions {
    pub page_size: usize,
    pub buffer_size: usize,
    pub low_buffer_threshold: usize,
}

impl BufferOptions {
    pub fn new(page_size: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            page_size,
            buffer_size: page_size * 5,
            low_buffer_threshold: page_size,
        }
    }

    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(self.page_size);
        self
    }

    pub fn low_buffer_threshold(mut self, threshold: usize) -> Self {
        self.low_buffer_threshold = threshold;
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    #[error("screen buffer is already running")]
    AlreadyRunning,
}

/// One entry of the prefetch plan: fetch up to `count` records from `anchor`
/// in the given direction (`anchor == None` means "from the newest record").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchInstruction {
    pub anchor: Option<u64>,
    pub descending: bool,
    pub count: usize,
}

/// Handle returned by [`ScreenBuffer::add_observer`], used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

type Observer = Arc<dyn Fn() + Send + Sync + 'static>;

/// Command handed to the fetch thread by the condition wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchCommand {
    Stop,
    GetRecords,
}

struct BufferState {
    lines: VecDeque<Line>,
    position: usize,
    page_size: usize,
    buffer_size: usize,
    low_buffer_threshold: usize,
    bottom_seen: bool,
    stopped: bool,
    invalid: bool,
    observers: Vec<(ObserverId, Observer)>,
    next_observer_id: u64,
}

impl BufferState {
    fn position_max(&self) -> usize {
        self.lines.len().saturating_sub(self.page_size)
    }

    fn set_position(&mut self, target: isize) {
        let p_max = self.position_max() as isize;
        self.position = target.clamp(0, p_max) as usize;
    }

    /// Re-clamp after a page-size change so the viewport fits.
    fn check_page_size(&mut self) {
        if self.position + self.page_size > self.lines.len() {
            let target = self.lines.len() as isize - self.page_size as isize;
            self.set_position(target);
        }
    }
}

/// The paging screen buffer. Construct with [`ScreenBuffer::new`], wrap in an
/// `Arc`, and hand a [`RecordSource`] to [`ScreenBuffer::start`]; all methods
/// take `&self` and are safe from any thread.
pub struct ScreenBuffer {
    state: Mutex<BufferState>,
    wakeup: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ScreenBuffer {
    pub fn new(options: BufferOptions) -> Self {
        Self {
            state: Mutex::new(BufferState {
                lines: VecDeque::new(),
                position: 0,
                page_size: options.page_size.max(1),
                buffer_size: options.buffer_size.max(options.page_size.max(1)),
                low_buffer_threshold: options.low_buffer_threshold,
                bottom_seen: false,
                stopped: false,
                invalid: false,
                observers: Vec::new(),
                next_observer_id: 0,
            }),
            wakeup: Condvar::new(),
            worker: Mutex::new(None),
        }
    }

    /// Observer panics happen outside the lock, so a poisoned mutex can only
    /// come from a panic inside the buffer itself; recover the state rather
    /// than propagating the poison to every caller.
    fn state(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The visible slice `lines[position .. position + page_size]`, clipped
    /// to the buffered range. Safe to call from any thread.
    pub fn current_lines(&self) -> Vec<Line> {
        let state = self.state();
        state
            .lines
            .iter()
            .skip(state.position)
            .take(state.page_size)
            .cloned()
            .collect()
    }

    pub fn page_size(&self) -> usize {
        self.state().page_size
    }

    /// Number of buffered lines (not records).
    pub fn line_count(&self) -> usize {
        self.state().lines.len()
    }

    /// Index of the first visible line.
    pub fn position(&self) -> usize {
        self.state().position
    }

    /// Set the viewport height, re-clamping the position so the viewport
    /// fits, and wake the fetch thread (growing past the buffered tail must
    /// trigger a forward probe).
    pub fn set_page_size(&self, page_size: usize) {
        {
            let mut state = self.state();
            state.page_size = page_size.max(1);
            if state.buffer_size < state.page_size {
                state.buffer_size = state.page_size;
            }
            state.check_page_size();
        }
        self.invalidate();
    }

    pub fn go_to_previous_line(&self) {
        self.shift_position(-1);
    }

    pub fn go_to_next_line(&self) {
        self.shift_position(1);
    }

    pub fn go_to_previous_page(&self) {
        let page = self.state().page_size as isize;
        self.shift_position(-page);
    }

    pub fn go_to_next_page(&self) {
        let page = self.state().page_size as isize;
        self.shift_position(page);
    }

    fn shift_position(&self, delta: isize) {
        {
            let mut state = self.state();
            let target = state.position as isize + delta;
            state.set_position(target);
        }
        self.invalidate();
    }

    /// Insert a record's lines at the front, shifting the position by the
    /// count inserted so the same visible line stays visible. Observers fire
    /// only when the clamp kept the position from absorbing the full shift,
    /// i.e. when the visible content actually changed.
    pub fn prepend_record(&self, record: Record) {
        let notify = {
            let mut state = self.state();
            let old_position = state.position;
            let mut inserted = 0;
            for (i, line) in record.into_lines().into_iter().enumerate() {
                state.lines.insert(i, line);
                inserted += 1;
            }
            let target = state.position as isize + inserted as isize;
            state.set_position(target);
            old_position + inserted != state.position
        };
        if notify {
            self.notify_observers();
        }
    }

    /// Push a record's lines at the back. Observers fire only when the
    /// viewport was not yet full, since that is the only case where appended
    /// content becomes visible.
    pub fn append_record(&self, record: Record) {
        let notify = {
            let mut state = self.state();
            let old_len = state.lines.len();
            for line in record.into_lines() {
                state.lines.push_back(line);
            }
            old_len < state.page_size
        };
        if notify {
            self.notify_observers();
        }
    }

    pub fn add_observer(&self, observer: impl Fn() + Send + Sync + 'static) -> ObserverId {
        let mut state = self.state();
        let id = ObserverId(state.next_observer_id);
        state.next_observer_id += 1;
        state.observers.push((id, Arc::new(observer)));
        id
    }

    pub fn remove_observer(&self, id: ObserverId) {
        self.state().observers.retain(|(oid, _)| *oid != id);
    }

    fn notify_observers(&self) {
        // Snapshot under the lock; invoke outside it so an observer that
        // calls back into the buffer cannot deadlock, and isolate each call
        // so one panicking observer does not starve the rest.
        let snapshot: Vec<Observer> = self
            .state()
            .observers
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();
        for observer in snapshot {
            if catch_unwind(AssertUnwindSafe(|| observer())).is_err() {
                error!(target: "buffer.observe", "observer_panicked");
            }
        }
    }

    /// Empty the buffer, reset the position, and forget the known tail.
    /// Observers fire if anything was visible before.
    pub fn clear(&self) {
        let notify = {
            let mut state = self.state();
            let old_len = state.lines.len();
            state.lines.clear();
            state.set_position(0);
            state.bottom_seen = false;
            old_len > 0
        };
        if notify {
            self.notify_observers();
        }
    }

    /// Whether a fetch has returned short at least once, marking the head of
    /// the store as seen.
    pub fn bottom_seen(&self) -> bool {
        self.state().bottom_seen
    }

    /// The prefetch plan for the current state. Pure: computing it does not
    /// mutate. Empty buffer asks for one oversized descending batch so the
    /// first view arrives with prefetch on both sides; otherwise a forward
    /// refill fires when the viewport end nears the buffered tail, and a
    /// backward refill when the position nears the buffered top. Both may
    /// fire in one plan.
    pub fn buffer_instructions(&self) -> Vec<FetchInstruction> {
        let state = self.state();
        let mut plan = Vec::new();
        if state.lines.is_empty() {
            plan.push(FetchInstruction {
                anchor: None,
                descending: true,
                count: state.buffer_size + state.page_size,
            });
            return plan;
        }
        let len = state.lines.len();
        if state.position + state.page_size >= len.saturating_sub(state.low_buffer_threshold) {
            plan.push(FetchInstruction {
                anchor: state.lines.back().map(Line::id),
                descending: false,
                count: state.buffer_size,
            });
        }
        if state.position <= state.low_buffer_threshold {
            plan.push(FetchInstruction {
                anchor: state.lines.front().map(Line::id),
                descending: true,
                count: state.buffer_size,
            });
        }
        plan
    }

    /// Execute the current prefetch plan against a source, streaming records
    /// into the buffer one at a time. Descending instructions are skipped
    /// once `bottom_seen` is set; any short read sets it.
    pub fn pull_records(&self, source: &mut dyn RecordSource) -> Result<(), SourceError> {
        for instruction in self.buffer_instructions() {
            if instruction.descending && self.state().bottom_seen {
                continue;
            }
            let mut remaining = instruction.count;
            let mut cursor = source.prepare_query(
                instruction.anchor,
                instruction.descending,
                instruction.count,
            )?;
            while let Some(record) = cursor.fetch_record()? {
                remaining = remaining.saturating_sub(1);
                if instruction.descending {
                    self.prepend_record(record);
                } else {
                    self.append_record(record);
                }
                // A stop request interrupts the drain; the resulting short
                // read is ours, not the source's, so bottom_seen stays put.
                if self.state().stopped {
                    return Ok(());
                }
            }
            drop(cursor);
            if remaining > 0 {
                self.state().bottom_seen = true;
            }
        }
        Ok(())
    }

    /// Wake the fetch thread to re-evaluate the prefetch plan. User
    /// operations call this internally; external producers (a live-tail
    /// ticker, a push notification) map onto the same signal.
    pub fn refresh(&self) {
        self.invalidate();
    }

    fn invalidate(&self) {
        let mut state = self.state();
        state.invalid = true;
        self.wakeup.notify_one();
    }

    /// Block until there is work for the fetch thread: either a stop request
    /// or an invalidated plan.
    fn wait_command(&self) -> FetchCommand {
        let mut state = self.state();
        while !(state.stopped || state.invalid) {
            state = self
                .wakeup
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
        if state.stopped {
            FetchCommand::Stop
        } else {
            state.invalid = false;
            FetchCommand::GetRecords
        }
    }

    /// Launch the fetch thread over `source`. Fails loudly without changing
    /// state when the buffer is already running.
    pub fn start(self: &Arc<Self>, source: Box<dyn RecordSource>) -> Result<(), BufferError> {
        let mut worker = self.worker.lock().unwrap_or_else(|e| e.into_inner());
        if worker.is_some() {
            return Err(BufferError::AlreadyRunning);
        }
        {
            let mut state = self.state();
            state.bottom_seen = false;
            state.stopped = false;
            // The thread performs the initial fetch immediately.
            state.invalid = true;
        }
        let buffer = Arc::clone(self);
        *worker = Some(std::thread::spawn(move || fetch::run(buffer, source)));
        Ok(())
    }

    /// Signal the fetch thread to exit and join it. Idempotent: a stopped
    /// buffer is a no-op.
    pub fn stop(&self) {
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        {
            let mut state = self.state();
            state.stopped = true;
            self.wakeup.notify_one();
        }
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    pub fn restart(self: &Arc<Self>, source: Box<dyn RecordSource>) -> Result<(), BufferError> {
        self.stop();
        self.start(source)
    }
}

impl Drop for ScreenBuffer {
    fn drop(&mut self) {
        // The worker holds an Arc to the buffer, so by the time Drop runs the
        // thread is gone; this only covers a buffer dropped while idle.
        if let Some(handle) = self.worker.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            self.state().stopped = true;
            self.wakeup.notify_one();
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use core_record::{Facility, Severity};

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

    fn buffer(page: usize, buf: usize, low: usize) -> ScreenBuffer {
        ScreenBuffer::new(
            BufferOptions::new(page)
                .buffer_size(buf)
                .low_buffer_threshold(low),
        )
    }

    fn visible_ids(buffer: &ScreenBuffer) -> Vec<u64> {
        buffer.current_lines().iter().map(Line::id).collect()
    }

    #[test]
    fn defaults_derive_from_page_size() {
        let options = BufferOptions::new(10);
        assert_eq!(options.buffer_size, 50);
        assert_eq!(options.low_buffer_threshold, 10);
    }

    #[test]
    fn empty_buffer_plans_one_oversized_descending_fetch() {
        let buf = buffer(2, 5, 2);
        assert_eq!(
            buf.buffer_instructions(),
            vec![FetchInstruction {
                anchor: None,
                descending: true,
                count: 7,
            }]
        );
    }

    #[test]
    fn prepend_keeps_visible_lines_stable() {
        let buf = buffer(2, 5, 2);
        for id in (94..=100).rev() {
            buf.prepend_record(record(id, &id.to_string()));
        }
        assert_eq!(visible_ids(&buf), [99, 100]);
    }

    #[test]
    fn append_only_notifies_until_viewport_fills() {
        let buf = buffer(2, 5, 2);
        let notified = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let n = Arc::clone(&notified);
        buf.add_observer(move || {
            n.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        buf.append_record(record(1, "1"));
        buf.append_record(record(2, "2"));
        buf.append_record(record(3, "3"));
        // First two appends fill the viewport; the third lands out of view.
        assert_eq!(notified.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(visible_ids(&buf), [1, 2]);
    }

    #[test]
    fn page_navigation_clamps_at_both_ends() {
        let buf = buffer(2, 5, 2);
        for id in (94..=100).rev() {
            buf.prepend_record(record(id, &id.to_string()));
        }
        buf.go_to_previous_page();
        assert_eq!(visible_ids(&buf), [97, 98]);
        for _ in 0..10 {
            buf.go_to_previous_page();
        }
        assert_eq!(visible_ids(&buf), [94, 95]);
        for _ in 0..10 {
            buf.go_to_next_page();
        }
        assert_eq!(visible_ids(&buf), [99, 100]);
    }

    #[test]
    fn line_navigation_moves_by_one() {
        let buf = buffer(2, 5, 2);
        for id in (94..=100).rev() {
            buf.prepend_record(record(id, &id.to_string()));
        }
        buf.go_to_previous_line();
        assert_eq!(visible_ids(&buf), [98, 99]);
        buf.go_to_next_line();
        assert_eq!(visible_ids(&buf), [99, 100]);
        buf.go_to_next_line();
        assert_eq!(visible_ids(&buf), [99, 100]);
    }

    #[test]
    fn growing_page_size_widens_buffer_size() {
        let buf = buffer(2, 2, 0);
        buf.set_page_size(8);
        let plan = buf.buffer_instructions();
        assert_eq!(plan[0].count, 8 + 8);
    }

    #[test]
    fn shrunk_buffer_replans_both_directions() {
        // Wide viewport over a small buffer: both refills fire in one plan.
        let buf = buffer(4, 4, 2);
        for id in (1..=5).rev() {
            buf.prepend_record(record(id, &id.to_string()));
        }
        let plan = buf.buffer_instructions();
        assert_eq!(plan.len(), 2);
        assert!(!plan[0].descending);
        assert_eq!(plan[0].anchor, Some(5));
        assert!(plan[1].descending);
        assert_eq!(plan[1].anchor, Some(1));
    }

    #[test]
    fn clear_resets_position_and_bottom_seen() {
        let buf = buffer(2, 5, 2);
        for id in (94..=100).rev() {
            buf.prepend_record(record(id, &id.to_string()));
        }
        buf.state().bottom_seen = true;
        let notified = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let n = Arc::clone(&notified);
        buf.add_observer(move || {
            n.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        buf.clear();
        assert!(buf.current_lines().is_empty());
        assert!(!buf.bottom_seen());
        assert_eq!(notified.load(std::sync::atomic::Ordering::SeqCst), 1);
        // Clearing an already empty buffer stays silent.
        buf.clear();
        assert_eq!(notified.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn removed_observer_no_longer_fires() {
        let buf = buffer(2, 5, 2);
        let notified = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let n = Arc::clone(&notified);
        let id = buf.add_observer(move || {
            n.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        buf.append_record(record(1, "1"));
        buf.remove_observer(id);
        buf.append_record(record(2, "2"));
        assert_eq!(notified.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn panicking_observer_does_not_starve_the_rest() {
        let buf = buffer(2, 5, 2);
        buf.add_observer(|| panic!("misbehaving observer"));
        let notified = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let n = Arc::clone(&notified);
        buf.add_observer(move || {
            n.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });
        buf.append_record(record(1, "1"));
        assert_eq!(notified.load(std::sync::atomic::Ordering::SeqCst), 1);
        // Buffer state survived the panic.
        assert_eq!(visible_ids(&buf), [1]);
    }

    #[test]
    fn multi_line_record_stays_contiguous() {
        let buf = buffer(3, 5, 2);
        buf.append_record(record(42, "a\nb\nc"));
        let lines = buf.current_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|l| l.id() == 42));
        assert!(!lines[0].is_continuation());
        assert!(lines[1].is_continuation());
        assert!(lines[2].is_continuation());
    }
}
