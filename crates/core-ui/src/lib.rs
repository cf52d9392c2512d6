//! Terminal UI for the log viewer: the raw-mode screen guard, the columnar
//! log view, and the modal dialog set (select list, text prompt, datetime
//! picker).
//!
//! Rendering is a full repaint per refresh; a page of log rows plus a
//! status bar is cheap enough that diffing would buy nothing here. All
//! layout math (column positions, scroll-into-view, visible text windows,
//! dialog geometry) is pure and unit tested; the crossterm calls are thin
//! shells over it.

mod cursor;
mod dialogs;
mod log_view;
mod screen;
mod state;
mod text_input;

pub use cursor::ScreenCursor;
pub use dialogs::{DatetimeDialog, Dialog, DialogOutcome, SelectDialog, TextDialog};
pub use log_view::{LogView, Segment, SegmentStyle};
pub use screen::{Screen, ScreenGuard};
pub use state::{DatetimeState, FilterState};
pub use text_input::TextInput;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UiError {
    #[error("cannot create a selection with no items")]
    EmptySelection,
    #[error("invalid position {0}")]
    InvalidPosition(usize),
}
