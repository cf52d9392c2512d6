//! Loupe entrypoint: an interactive terminal viewer over a syslog record
//! store.
//!
//! Thread layout: the main thread runs the UI loop over a bounded channel;
//! the input thread translates crossterm events; the tick thread paces the
//! live tail; the screen buffer owns its own fetch thread. Buffer observers
//! relay visible-content changes into the same channel, so every redraw
//! trigger arrives through one receiver.

use anyhow::{Result, bail};
use chrono::Utc;
use clap::Parser;
use core_buffer::{BufferOptions, RecordSource, ScreenBuffer};
use core_config::Config;
use core_events::{Event, InputEvent, KeyCode, KeyEvent, channel, send_event};
use core_input::{InputShutdown, spawn_input_thread};
use core_query::Filter;
use core_record::{Facility, Severity};
use core_source::{MemorySource, MemoryStore, SqliteSource, newest_id_at};
use core_ui::{
    DatetimeDialog, Dialog, DialogOutcome, FilterState, LogView, Screen, SelectDialog, TextDialog,
};
use crossbeam_channel::{Receiver, Sender};
use std::fmt;
use std::io::{BufWriter, Write, stdout};
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{error, info, trace, warn};
use tracing_appender::non_blocking::WorkerGuard;

mod demo;

const STATUS_ROWS: u16 = 1;
/// Virtual line width the log view pans across.
const MAX_LINE_WIDTH: usize = 400;
const TEXT_FILTER_MAX_LEN: usize = 40;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "loupe", version, about = "Interactive syslog viewer")]
struct Args {
    /// SQLite database holding the logs table (overrides the config file).
    pub database: Option<PathBuf>,
    /// Configuration file path (overrides discovery of `loupe.toml`).
    #[arg(long = "config")]
    pub config: Option<PathBuf>,
    /// Browse a synthetic in-memory log instead of a database.
    #[arg(long = "demo")]
    pub demo: bool,
}

struct AppStartup {
    log_guard: Option<WorkerGuard>,
}

impl AppStartup {
    fn new() -> Self {
        Self { log_guard: None }
    }

    fn configure_logging(&mut self) -> Result<()> {
        let file_appender = tracing_appender::rolling::never(".", "loupe.log");
        let (nb_writer, guard) = tracing_appender::non_blocking(file_appender);
        match tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(nb_writer)
            .with_ansi(false)
            .try_init()
        {
            Ok(_) => {
                self.log_guard = Some(guard);
            }
            Err(_err) => {
                // Global subscriber already installed; drop guard so the
                // writer shuts down.
            }
        }
        Ok(())
    }

    fn install_panic_hook() {
        static HOOK: Once = Once::new();
        HOOK.call_once(|| {
            let default_panic = std::panic::take_hook();
            std::panic::set_hook(Box::new(move |info| {
                tracing::error!(target: "runtime.panic", ?info, "panic");
                default_panic(info);
            }));
        });
    }
}

/// Where records come from; reopened with the current filter on every
/// restart.
enum SourceKind {
    Sqlite(PathBuf),
    Demo(MemoryStore),
}

impl SourceKind {
    fn open(&self, filter: Filter, origin: Option<u64>) -> Box<dyn RecordSource> {
        match self {
            SourceKind::Sqlite(path) => {
                Box::new(SqliteSource::new(path, filter).with_origin(origin))
            }
            SourceKind::Demo(store) => {
                Box::new(MemorySource::new(store.clone(), filter).with_origin(origin))
            }
        }
    }

    fn newest_id_at(&self, filter: &Filter, at: chrono::NaiveDateTime) -> Option<u64> {
        match self {
            SourceKind::Sqlite(path) => match newest_id_at(path, filter, at) {
                Ok(id) => id,
                Err(e) => {
                    warn!(target: "source.sql", error = %e, "datetime_resolve_failed");
                    None
                }
            },
            SourceKind::Demo(store) => store.newest_id_at(filter, at),
        }
    }
}

/// The modal currently capturing keys, if any.
enum ActiveDialog {
    Level(SelectDialog),
    Facility(SelectDialog),
    Program(TextDialog),
    Host(TextDialog),
    GoToDate(DatetimeDialog),
}

impl ActiveDialog {
    fn handle_key(&mut self, key: &KeyEvent) -> DialogOutcome {
        match self {
            ActiveDialog::Level(d) | ActiveDialog::Facility(d) => d.handle_key(key),
            ActiveDialog::Program(d) | ActiveDialog::Host(d) => d.handle_key(key),
            ActiveDialog::GoToDate(d) => d.handle_key(key),
        }
    }

    fn draw(&mut self, out: &mut dyn Write, parent: (u16, u16)) -> Result<()> {
        match self {
            ActiveDialog::Level(d) | ActiveDialog::Facility(d) => d.draw(out, parent),
            ActiveDialog::Program(d) | ActiveDialog::Host(d) => d.draw(out, parent),
            ActiveDialog::GoToDate(d) => d.draw(out, parent),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ShutdownReason {
    CtrlC,
    Quit,
    ShutdownEvent,
    ChannelClosed,
}

impl ShutdownReason {
    fn as_str(&self) -> &'static str {
        match self {
            ShutdownReason::CtrlC => "ctrl_c",
            ShutdownReason::Quit => "quit",
            ShutdownReason::ShutdownEvent => "shutdown_event",
            ShutdownReason::ChannelClosed => "channel_closed",
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn log_shutdown_stage(reason: ShutdownReason, stage: &'static str) {
    info!(
        target: "runtime.shutdown",
        reason = reason.as_str(),
        stage = stage,
        "shutdown_stage"
    );
}

enum LoopControl {
    Continue { redraw: bool },
    Break { reason: ShutdownReason },
}

struct ViewerRuntime {
    buffer: Arc<ScreenBuffer>,
    view: LogView,
    filter: FilterState,
    source: SourceKind,
    origin: Option<u64>,
    dialog: Option<ActiveDialog>,
    tx: Option<Sender<Event>>,
    input_thread: Option<JoinHandle<()>>,
    input_shutdown: Option<InputShutdown>,
    tick_thread: Option<JoinHandle<()>>,
    producer: Option<demo::DemoProducer>,
}

impl ViewerRuntime {
    fn run(&mut self, rx: Receiver<Event>) -> Result<()> {
        self.redraw()?;
        let reason = loop {
            let Ok(event) = rx.recv() else {
                break ShutdownReason::ChannelClosed;
            };
            match self.handle_event(&event) {
                LoopControl::Continue { redraw } => {
                    if redraw {
                        self.redraw()?;
                    }
                }
                LoopControl::Break { reason } => break reason,
            }
        };
        // Producers blocked on a full channel unblock the moment the
        // receiver is gone; drop it before joining them.
        drop(rx);
        self.finalize_shutdown(reason);
        Ok(())
    }

    fn handle_event(&mut self, event: &Event) -> LoopControl {
        match event {
            Event::Input(InputEvent::Key(key)) => {
                if self.dialog.is_some() {
                    self.handle_dialog_key(key)
                } else {
                    self.handle_log_key(key)
                }
            }
            Event::Input(InputEvent::Resize(w, h)) => {
                self.apply_resize(*w, *h);
                LoopControl::Continue { redraw: true }
            }
            Event::Input(InputEvent::CtrlC) => LoopControl::Break {
                reason: ShutdownReason::CtrlC,
            },
            Event::BufferChanged => LoopControl::Continue { redraw: true },
            Event::Tick => {
                // Live tail: wake the fetch loop; observers fire if anything
                // visible changes.
                self.buffer.refresh();
                LoopControl::Continue { redraw: false }
            }
            Event::Shutdown => LoopControl::Break {
                reason: ShutdownReason::ShutdownEvent,
            },
        }
    }

    fn handle_log_key(&mut self, key: &KeyEvent) -> LoopControl {
        let redraw = match key.code {
            KeyCode::Char('q') => {
                return LoopControl::Break {
                    reason: ShutdownReason::Quit,
                };
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.buffer.go_to_previous_line();
                true
            }
            KeyCode::Down | KeyCode::Char('j') => {
                self.buffer.go_to_next_line();
                true
            }
            KeyCode::PageUp | KeyCode::Char('b') => {
                self.buffer.go_to_previous_page();
                true
            }
            KeyCode::PageDown | KeyCode::Char(' ') => {
                self.buffer.go_to_next_page();
                true
            }
            KeyCode::Left => {
                self.view.scroll_left();
                true
            }
            KeyCode::Right => {
                self.view.scroll_right();
                true
            }
            KeyCode::Char('l') => {
                self.open_level_dialog();
                true
            }
            KeyCode::Char('f') => {
                self.open_facility_dialog();
                true
            }
            KeyCode::Char('p') => {
                let mut dialog = TextDialog::new("Program", TEXT_FILTER_MAX_LEN);
                dialog.set_text(self.filter.program().unwrap_or(""));
                self.dialog = Some(ActiveDialog::Program(dialog));
                true
            }
            KeyCode::Char('h') => {
                let mut dialog = TextDialog::new("Host", TEXT_FILTER_MAX_LEN);
                dialog.set_text(self.filter.host().unwrap_or(""));
                self.dialog = Some(ActiveDialog::Host(dialog));
                true
            }
            KeyCode::Char('d') => {
                let initial = self
                    .buffer
                    .current_lines()
                    .first()
                    .map(|line| line.timestamp())
                    .unwrap_or_else(|| Utc::now().naive_utc());
                self.dialog = Some(ActiveDialog::GoToDate(DatetimeDialog::new(
                    "Go to date",
                    initial,
                )));
                true
            }
            _ => false,
        };
        LoopControl::Continue { redraw }
    }

    fn open_level_dialog(&mut self) {
        let items = Severity::all()
            .map(|s| s.name().unwrap_or("?").to_string())
            .collect();
        let mut dialog = SelectDialog::new("Level", items).expect("severity table is non-empty");
        let _ = dialog.set_position(self.filter.level() as usize);
        self.dialog = Some(ActiveDialog::Level(dialog));
    }

    fn open_facility_dialog(&mut self) {
        let mut items = vec!["ALL".to_string()];
        items.extend(Facility::all().map(|f| f.to_string()));
        let mut dialog = SelectDialog::new("Facility", items).expect("facility table is non-empty");
        let _ = dialog.set_position(match self.filter.facility() {
            Some(code) => code as usize + 1,
            None => 0,
        });
        self.dialog = Some(ActiveDialog::Facility(dialog));
    }

    fn handle_dialog_key(&mut self, key: &KeyEvent) -> LoopControl {
        let outcome = match self.dialog.as_mut() {
            Some(dialog) => dialog.handle_key(key),
            None => DialogOutcome::Pending,
        };
        match outcome {
            DialogOutcome::Pending => {}
            DialogOutcome::Cancelled => {
                self.dialog = None;
            }
            DialogOutcome::Accepted => {
                if let Some(dialog) = self.dialog.take() {
                    self.apply_dialog(dialog);
                }
            }
        }
        LoopControl::Continue { redraw: true }
    }

    fn apply_dialog(&mut self, dialog: ActiveDialog) {
        match dialog {
            ActiveDialog::Level(select) => {
                self.filter.set_level(Some(select.position() as u8));
                self.origin = None;
                self.restart_buffer();
            }
            ActiveDialog::Facility(select) => {
                let facility = match select.position() {
                    0 => None,
                    n => Some((n - 1) as u8),
                };
                self.filter.set_facility(facility);
                self.origin = None;
                self.restart_buffer();
            }
            ActiveDialog::Program(text) => {
                self.filter.set_program(&text.text());
                self.origin = None;
                self.restart_buffer();
            }
            ActiveDialog::Host(text) => {
                self.filter.set_host(&text.text());
                self.origin = None;
                self.restart_buffer();
            }
            ActiveDialog::GoToDate(picker) => {
                let target = picker.value();
                match self.source.newest_id_at(&self.filter.to_filter(), target) {
                    Some(id) => {
                        info!(target: "runtime", origin = id, at = %target, "datetime_jump");
                        self.origin = Some(id);
                        self.restart_buffer();
                    }
                    None => {
                        warn!(target: "runtime", at = %target, "datetime_jump_unresolved");
                    }
                }
            }
        }
    }

    fn restart_buffer(&mut self) {
        let source = self.source.open(self.filter.to_filter(), self.origin);
        if let Err(e) = self.buffer.restart(source) {
            error!(target: "runtime", error = %e, "buffer_restart_failed");
        }
    }

    fn apply_resize(&mut self, width: u16, height: u16) {
        let page = height.saturating_sub(STATUS_ROWS).max(1);
        self.buffer.set_page_size(page as usize);
        self.view.resize(width as usize);
    }

    fn redraw(&mut self) -> Result<()> {
        let size = Screen::size()?;
        let mut out = BufWriter::new(stdout());
        Screen::clear(&mut out)?;
        let lines = self.buffer.current_lines();
        self.view.draw(&mut out, &lines, &self.filter, size)?;
        if let Some(dialog) = self.dialog.as_mut() {
            dialog.draw(&mut out, size)?;
        }
        out.flush()?;
        Ok(())
    }

    fn finalize_shutdown(&mut self, reason: ShutdownReason) {
        log_shutdown_stage(reason, "begin");
        self.buffer.stop();
        if let Some(shutdown) = self.input_shutdown.take() {
            shutdown.signal();
        }
        if let Some(handle) = self.input_thread.take() {
            let _ = handle.join();
            trace!(target: "runtime.shutdown", "input_thread_joined");
        }
        if let Some(tx) = self.tx.take() {
            drop(tx); // tick thread observes the closed channel and exits
        }
        if let Some(handle) = self.tick_thread.take() {
            let _ = handle.join();
            trace!(target: "runtime.shutdown", "tick_thread_joined");
        }
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
        }
        log_shutdown_stage(reason, "complete");
    }
}

fn spawn_tick_thread(tx: Sender<Event>, interval: Duration) -> JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            std::thread::sleep(interval);
            if !send_event(&tx, Event::Tick) {
                break;
            }
        }
        trace!(target: "runtime.tick", "tick_thread_stopped");
    })
}

fn initial_filter(cfg: &core_config::FilterConfig) -> FilterState {
    let mut state = FilterState::new();
    state.set_level(Some(cfg.level));
    if cfg.facility >= 0 {
        state.set_facility(Some(cfg.facility as u8));
    }
    state.set_program(&cfg.program);
    state.set_host(&cfg.host);
    state
}

fn resolve_source(args: &Args, config: &Config) -> Result<SourceKind> {
    if args.demo {
        return Ok(SourceKind::Demo(demo::seed_store()));
    }
    let path = args
        .database
        .clone()
        .or_else(|| config.file.database.path.clone());
    match path {
        Some(path) => Ok(SourceKind::Sqlite(path)),
        None => bail!(
            "no database configured; pass a path, set [database].path in loupe.toml, \
             or run with --demo"
        ),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut startup = AppStartup::new();
    startup.configure_logging()?;
    AppStartup::install_panic_hook();
    info!(target: "runtime", "startup");

    let config = core_config::load_from(args.config.clone())?;
    let source = resolve_source(&args, &config)?;
    let filter = initial_filter(&config.file.filter);

    let (width, height) = Screen::size()?;
    let page = height.saturating_sub(STATUS_ROWS).max(1) as usize;
    let buffer = Arc::new(ScreenBuffer::new(
        BufferOptions::new(page)
            .buffer_size(config.file.buffer.buffer_size(page))
            .low_buffer_threshold(config.file.buffer.low_threshold(page)),
    ));

    let (tx, rx) = channel();
    let observer_tx = tx.clone();
    buffer.add_observer(move || {
        send_event(&observer_tx, Event::BufferChanged);
    });

    let (input_thread, input_shutdown) = spawn_input_thread(tx.clone());
    let poll = Duration::from_millis(config.file.tail.poll_ms.max(50));
    let tick_thread = spawn_tick_thread(tx.clone(), poll);
    let producer = match &source {
        SourceKind::Demo(store) => Some(demo::spawn_producer(store.clone(), poll * 3)),
        SourceKind::Sqlite(_) => None,
    };

    let mut runtime = ViewerRuntime {
        buffer: Arc::clone(&buffer),
        view: LogView::new(MAX_LINE_WIDTH, width as usize),
        filter,
        source,
        origin: None,
        dialog: None,
        tx: Some(tx),
        input_thread: Some(input_thread),
        input_shutdown: Some(input_shutdown),
        tick_thread: Some(tick_thread),
        producer,
    };
    runtime
        .buffer
        .start(runtime.source.open(runtime.filter.to_filter(), None))?;

    let mut screen = Screen::new();
    screen.set_title("Loupe")?;
    let guard = screen.enter_guard()?;
    let result = runtime.run(rx);
    drop(guard);
    info!(target: "runtime", "exit");
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_record::Record;

    fn runtime_with_demo() -> ViewerRuntime {
        let store = MemoryStore::new();
        for id in 1..=40u64 {
            store.push(Record {
                id,
                timestamp: chrono::NaiveDate::from_ymd_opt(2016, 6, 4)
                    .unwrap()
                    .and_hms_opt(0, id as u32 % 60, 0)
                    .unwrap(),
                level: Severity::new(6),
                facility: Facility::new(3),
                host: "web1".into(),
                program: "sshd".into(),
                pid: None,
                message: format!("m{id}"),
            });
        }
        let buffer = Arc::new(ScreenBuffer::new(BufferOptions::new(4)));
        let (tx, _rx) = channel();
        ViewerRuntime {
            buffer,
            view: LogView::new(MAX_LINE_WIDTH, 80),
            filter: FilterState::new(),
            source: SourceKind::Demo(store),
            origin: None,
            dialog: None,
            tx: Some(tx),
            input_thread: None,
            input_shutdown: None,
            tick_thread: None,
            producer: None,
        }
    }

    fn press(runtime: &mut ViewerRuntime, code: KeyCode) -> LoopControl {
        runtime.handle_event(&Event::Input(InputEvent::Key(KeyEvent::plain(code))))
    }

    #[test]
    fn quit_key_breaks_the_loop() {
        let mut runtime = runtime_with_demo();
        match press(&mut runtime, KeyCode::Char('q')) {
            LoopControl::Break { reason } => assert_eq!(reason, ShutdownReason::Quit),
            LoopControl::Continue { .. } => panic!("expected loop break"),
        }
        runtime.finalize_shutdown(ShutdownReason::Quit);
    }

    #[test]
    fn filter_dialogs_capture_keys_and_apply() {
        let mut runtime = runtime_with_demo();
        press(&mut runtime, KeyCode::Char('l'));
        assert!(runtime.dialog.is_some());
        // Move to "err" (position 3) and accept.
        press(&mut runtime, KeyCode::Up);
        press(&mut runtime, KeyCode::Up);
        press(&mut runtime, KeyCode::Up);
        press(&mut runtime, KeyCode::Up);
        press(&mut runtime, KeyCode::Enter);
        assert!(runtime.dialog.is_none());
        assert_eq!(runtime.filter.level(), 3);
        runtime.finalize_shutdown(ShutdownReason::Quit);
    }

    #[test]
    fn cancelled_dialog_changes_nothing() {
        let mut runtime = runtime_with_demo();
        press(&mut runtime, KeyCode::Char('p'));
        press(&mut runtime, KeyCode::Char('x'));
        press(&mut runtime, KeyCode::Esc);
        assert!(runtime.dialog.is_none());
        assert_eq!(runtime.filter.program(), None);
        runtime.finalize_shutdown(ShutdownReason::Quit);
    }

    #[test]
    fn datetime_jump_sets_the_origin() {
        let mut runtime = runtime_with_demo();
        // Buffer is idle and empty, so the picker starts from "now"; drive
        // the jump directly through apply.
        let picker = DatetimeDialog::new(
            "Go to date",
            chrono::NaiveDate::from_ymd_opt(2016, 6, 4)
                .unwrap()
                .and_hms_opt(0, 20, 0)
                .unwrap(),
        );
        runtime.apply_dialog(ActiveDialog::GoToDate(picker));
        assert_eq!(runtime.origin, Some(20));
        runtime.finalize_shutdown(ShutdownReason::Quit);
    }

    #[test]
    fn resize_adjusts_page_size() {
        let mut runtime = runtime_with_demo();
        runtime.handle_event(&Event::Input(InputEvent::Resize(100, 31)));
        assert_eq!(runtime.buffer.page_size(), 30);
        runtime.finalize_shutdown(ShutdownReason::Quit);
    }

    #[test]
    fn missing_database_is_a_loud_startup_error() {
        let args = Args {
            database: None,
            config: None,
            demo: false,
        };
        let config = Config::default();
        assert!(resolve_source(&args, &config).is_err());
    }
}
