//! Event types and channel helpers for the viewer's UI loop.
//!
//! Channel policy: one bounded crossbeam channel sized by
//! [`EVENT_CHANNEL_CAP`], multiple producers (input thread, tick thread,
//! buffer observers), one consumer (the UI loop). Producers use blocking
//! sends: with a page-sized consumer workload latency stays low, and
//! preserving event fidelity is preferred over lossy drop strategies. The
//! telemetry counters are relaxed atomics, inspectable in tests and logged on
//! shutdown.

use crossbeam_channel::{Receiver, Sender, bounded};
use std::sync::atomic::{AtomicU64, Ordering};

pub const EVENT_CHANNEL_CAP: usize = 1024;

pub static CHANNEL_SENDS: AtomicU64 = AtomicU64::new(0);
pub static CHANNEL_SEND_FAILURES: AtomicU64 = AtomicU64::new(0);

/// Top-level event consumed by the UI loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Input(InputEvent),
    /// The screen buffer's visible content changed (observer relay).
    BufferChanged,
    /// Periodic tick: drives the live-tail refresh and ephemeral redraws.
    Tick,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    Key(KeyEvent),
    /// Terminal resize (columns, rows).
    Resize(u16, u16),
    /// Ctrl-C surfaced distinctly so the loop can treat it as quit even
    /// while a dialog is capturing keys.
    CtrlC,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub mods: KeyModifiers,
}

impl KeyEvent {
    pub fn plain(code: KeyCode) -> Self {
        Self {
            code,
            mods: KeyModifiers::empty(),
        }
    }
}

/// Normalized logical keys the viewer reacts to. Anything else is dropped at
/// the translation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyCode {
    Char(char),
    Enter,
    Esc,
    Backspace,
    Delete,
    Tab,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
}

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct KeyModifiers: u8 {
        const CTRL  = 0b0000_0001;
        const ALT   = 0b0000_0010;
        const SHIFT = 0b0000_0100;
    }
}

/// The loop's bounded channel.
pub fn channel() -> (Sender<Event>, Receiver<Event>) {
    bounded(EVENT_CHANNEL_CAP)
}

/// Blocking send with telemetry; returns `false` once the consumer is gone,
/// which producers treat as their stop signal.
pub fn send_event(tx: &Sender<Event>, event: Event) -> bool {
    match tx.send(event) {
        Ok(()) => {
            CHANNEL_SENDS.fetch_add(1, Ordering::Relaxed);
            true
        }
        Err(_) => {
            CHANNEL_SEND_FAILURES.fetch_add(1, Ordering::Relaxed);
            false
        }
    }
}
