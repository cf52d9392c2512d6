//! Blocking input thread: reads crossterm events, normalizes them, and feeds
//! the UI loop's channel.
//!
//! The pump polls with a short timeout so the shutdown flag is observed
//! within one poll interval even when the terminal is silent. Exit paths are
//! labeled and logged (`input.thread` target): shutdown signal, consumer
//! gone, or a read error. The pump is generic over its event feed so the
//! translation and exit behavior are testable without a terminal.

use core_events::{Event, InputEvent, KeyCode, KeyEvent, KeyModifiers, send_event};
use crossterm::event::{
    Event as CEvent, KeyCode as CKeyCode, KeyEvent as CKeyEvent, KeyEventKind as CKind,
    KeyModifiers as CMods,
};
use crossbeam_channel::Sender;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, trace, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Signals the input thread to exit at its next poll.
#[derive(Clone, Debug)]
pub struct InputShutdown {
    flag: Arc<AtomicBool>,
}

impl InputShutdown {
    pub fn signal(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitReason {
    ShutdownSignal,
    ChannelClosed,
    ReadError,
}

impl ExitReason {
    fn as_str(&self) -> &'static str {
        match self {
            ExitReason::ShutdownSignal => "shutdown_signal",
            ExitReason::ChannelClosed => "channel_closed",
            ExitReason::ReadError => "read_error",
        }
    }
}

/// Terminal event feed; the production impl wraps crossterm, tests inject
/// scripted events.
trait EventFeed {
    /// True when an event is ready within `timeout`.
    fn poll(&mut self, timeout: Duration) -> io::Result<bool>;
    fn read(&mut self) -> io::Result<CEvent>;
}

struct CrosstermFeed;

impl EventFeed for CrosstermFeed {
    fn poll(&mut self, timeout: Duration) -> io::Result<bool> {
        crossterm::event::poll(timeout)
    }

    fn read(&mut self) -> io::Result<CEvent> {
        crossterm::event::read()
    }
}

/// Spawn the input thread. It exits when signalled, when the consumer drops
/// the receiver, or on a terminal read error.
pub fn spawn_input_thread(tx: Sender<Event>) -> (JoinHandle<()>, InputShutdown) {
    let flag = Arc::new(AtomicBool::new(false));
    let shutdown = InputShutdown {
        flag: Arc::clone(&flag),
    };
    let handle = std::thread::spawn(move || {
        run_pump(CrosstermFeed, &tx, &flag);
    });
    (handle, shutdown)
}

fn run_pump(mut feed: impl EventFeed, tx: &Sender<Event>, stop: &AtomicBool) {
    info!(target: "input.thread", "input_thread_started");
    let reason = loop {
        if stop.load(Ordering::SeqCst) {
            break ExitReason::ShutdownSignal;
        }
        match feed.poll(POLL_INTERVAL) {
            Ok(false) => continue,
            Ok(true) => {}
            Err(e) => {
                warn!(target: "input.thread", error = %e, "poll_failed");
                break ExitReason::ReadError;
            }
        }
        let event = match feed.read() {
            Ok(event) => event,
            Err(e) => {
                warn!(target: "input.thread", error = %e, "read_failed");
                break ExitReason::ReadError;
            }
        };
        if let Some(event) = translate(event) {
            if !send_event(tx, Event::Input(event)) {
                break ExitReason::ChannelClosed;
            }
        }
    };
    info!(target: "input.thread", reason = reason.as_str(), "input_thread_stopped");
}

/// Map a crossterm event to the viewer's input model; events the viewer has
/// no use for collapse to `None`.
fn translate(event: CEvent) -> Option<InputEvent> {
    match event {
        CEvent::Key(key) => translate_key(&key),
        CEvent::Resize(w, h) => {
            trace!(target: "input.event", w, h, "resize");
            Some(InputEvent::Resize(w, h))
        }
        _ => None,
    }
}

fn translate_key(key: &CKeyEvent) -> Option<InputEvent> {
    if !matches!(key.kind, CKind::Press | CKind::Repeat) {
        return None;
    }
    if matches!(key.code, CKeyCode::Char('c')) && key.modifiers.contains(CMods::CONTROL) {
        return Some(InputEvent::CtrlC);
    }
    let code = match key.code {
        CKeyCode::Char(c) => KeyCode::Char(c),
        CKeyCode::Enter => KeyCode::Enter,
        CKeyCode::Esc => KeyCode::Esc,
        CKeyCode::Backspace => KeyCode::Backspace,
        CKeyCode::Delete => KeyCode::Delete,
        CKeyCode::Tab | CKeyCode::BackTab => KeyCode::Tab,
        CKeyCode::Up => KeyCode::Up,
        CKeyCode::Down => KeyCode::Down,
        CKeyCode::Left => KeyCode::Left,
        CKeyCode::Right => KeyCode::Right,
        CKeyCode::Home => KeyCode::Home,
        CKeyCode::End => KeyCode::End,
        CKeyCode::PageUp => KeyCode::PageUp,
        CKeyCode::PageDown => KeyCode::PageDown,
        CKeyCode::F(n) => KeyCode::F(n),
        _ => return None,
    };
    let mut mods = KeyModifiers::empty();
    if key.modifiers.contains(CMods::CONTROL) {
        mods |= KeyModifiers::CTRL;
    }
    if key.modifiers.contains(CMods::ALT) {
        mods |= KeyModifiers::ALT;
    }
    if key.modifiers.contains(CMods::SHIFT) {
        mods |= KeyModifiers::SHIFT;
    }
    Some(InputEvent::Key(KeyEvent { code, mods }))
}
