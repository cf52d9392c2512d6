//! Modal centered dialogs: pick list, text prompt, datetime picker.
//!
//! A dialog captures keys until it resolves (`Accepted`/`Cancelled`); the
//! caller keeps it on a stack and reads the result out of the concrete type.
//! Geometry shrinks toward a minimum on small terminals and the dialog hides
//! entirely below it rather than rendering garbage.

use crate::cursor::ScreenCursor;
use crate::log_view::clip_text;
use crate::state::DatetimeState;
use crate::text_input::TextInput;
use crate::UiError;
use anyhow::Result;
use chrono::NaiveDateTime;
use core_events::{KeyCode, KeyEvent};
use crossterm::{
    cursor::MoveTo,
    style::{Attribute, Print, SetAttribute},
    QueueableCommand,
};
use std::io::Write;

const BORDER: usize = 2;
const PADDING: usize = 2 * BORDER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogOutcome {
    Pending,
    Accepted,
    Cancelled,
}

pub trait Dialog {
    fn handle_key(&mut self, key: &KeyEvent) -> DialogOutcome;
    fn draw(&mut self, out: &mut dyn Write, parent: (u16, u16)) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Geometry {
    x: u16,
    y: u16,
    width: usize,
    height: usize,
}

/// Center a dialog of the desired content size, shrinking down to the
/// minimum; `None` when even the minimum does not fit.
fn centered(
    parent: (u16, u16),
    content: (usize, usize),
    min_content: (usize, usize),
) -> Option<Geometry> {
    let (parent_w, parent_h) = (parent.0 as usize, parent.1 as usize);
    let height = (content.0 + PADDING).min(parent_h);
    let width = (content.1 + PADDING).min(parent_w);
    if height < min_content.0 + PADDING || width < min_content.1 + PADDING {
        return None;
    }
    Some(Geometry {
        x: ((parent_w - width) / 2) as u16,
        y: ((parent_h - height) / 2) as u16,
        width,
        height,
    })
}

/// Bordered, reverse-video dialog frame with a `|Title|` header.
fn draw_frame(out: &mut dyn Write, geometry: Geometry, title: &str) -> Result<()> {
    out.queue(SetAttribute(Attribute::Reverse))?;
    for row in 0..geometry.height {
        let body: String = if row == 0 {
            format!("┌{}┐", "─".repeat(geometry.width - 2))
        } else if row == geometry.height - 1 {
            format!("└{}┘", "─".repeat(geometry.width - 2))
        } else {
            format!("│{}│", " ".repeat(geometry.width - 2))
        };
        out.queue(MoveTo(geometry.x, geometry.y + row as u16))?
            .queue(Print(body))?;
    }
    let header = format!("|{title}|");
    let header = clip_text(&header, 0, geometry.width.saturating_sub(2));
    let offset = (geometry.width - header.chars().count()) / 2;
    out.queue(MoveTo(geometry.x + offset as u16, geometry.y))?
        .queue(Print(header))?
        .queue(SetAttribute(Attribute::Reset))?;
    Ok(())
}

/// Vertical pick list; Enter accepts the highlighted item, Esc cancels.
#[derive(Debug)]
pub struct SelectDialog {
    title: String,
    items: Vec<String>,
    cursor: ScreenCursor,
}

impl SelectDialog {
    pub fn new(title: impl Into<String>, items: Vec<String>) -> Result<Self, UiError> {
        if items.is_empty() {
            return Err(UiError::EmptySelection);
        }
        let cursor = ScreenCursor::new(items.len());
        Ok(Self {
            title: title.into(),
            items,
            cursor,
        })
    }

    pub fn position(&self) -> usize {
        self.cursor.position()
    }

    pub fn set_position(&mut self, position: usize) -> Result<(), UiError> {
        if position >= self.items.len() {
            return Err(UiError::InvalidPosition(position));
        }
        self.cursor.set_position(position);
        Ok(())
    }
}

impl Dialog for SelectDialog {
    fn handle_key(&mut self, key: &KeyEvent) -> DialogOutcome {
        match key.code {
            KeyCode::Enter => DialogOutcome::Accepted,
            KeyCode::Esc => DialogOutcome::Cancelled,
            KeyCode::Down => {
                self.cursor.move_down();
                DialogOutcome::Pending
            }
            KeyCode::Up => {
                self.cursor.move_up();
                DialogOutcome::Pending
            }
            _ => DialogOutcome::Pending,
        }
    }

    fn draw(&mut self, out: &mut dyn Write, parent: (u16, u16)) -> Result<()> {
        let Some(geometry) = centered(parent, (self.items.len(), 16), (1, 16)) else {
            return Ok(());
        };
        draw_frame(out, geometry, &self.title)?;
        let visible = geometry.height - PADDING;
        self.cursor.set_visible_count(visible);
        out.queue(SetAttribute(Attribute::Reverse))?;
        for (row, item) in self
            .items
            .iter()
            .enumerate()
            .skip(self.cursor.offset())
            .take(visible)
        {
            let prefix = if row == self.cursor.position() {
                '▶'
            } else {
                ' '
            };
            let text = clip_text(
                &format!("{prefix}{item}"),
                0,
                geometry.width - PADDING,
            );
            out.queue(MoveTo(
                geometry.x + BORDER as u16,
                geometry.y + BORDER as u16 + (row - self.cursor.offset()) as u16,
            ))?
                .queue(Print(text))?;
        }
        out.queue(SetAttribute(Attribute::Reset))?;
        Ok(())
    }
}

/// Single-line text prompt; Enter accepts the edited text, Esc cancels.
pub struct TextDialog {
    title: String,
    input: TextInput,
}

impl TextDialog {
    pub fn new(title: impl Into<String>, max_len: usize) -> Self {
        Self {
            title: title.into(),
            input: TextInput::new(max_len),
        }
    }

    pub fn text(&self) -> String {
        self.input.text()
    }

    pub fn set_text(&mut self, text: &str) {
        let width = self.input.width();
        self.input = TextInput::with_text(self.input.max_len(), text);
        self.input.set_width(width);
    }
}

impl Dialog for TextDialog {
    fn handle_key(&mut self, key: &KeyEvent) -> DialogOutcome {
        match key.code {
            KeyCode::Enter => DialogOutcome::Accepted,
            KeyCode::Esc => DialogOutcome::Cancelled,
            KeyCode::Left => {
                self.input.move_left();
                DialogOutcome::Pending
            }
            KeyCode::Right => {
                self.input.move_right();
                DialogOutcome::Pending
            }
            KeyCode::Home => {
                self.input.move_home();
                DialogOutcome::Pending
            }
            KeyCode::End => {
                self.input.move_end();
                DialogOutcome::Pending
            }
            KeyCode::Backspace => {
                self.input.backspace();
                DialogOutcome::Pending
            }
            KeyCode::Delete => {
                self.input.delete();
                DialogOutcome::Pending
            }
            KeyCode::Char(c) => {
                self.input.put(c);
                DialogOutcome::Pending
            }
            _ => DialogOutcome::Pending,
        }
    }

    fn draw(&mut self, out: &mut dyn Write, parent: (u16, u16)) -> Result<()> {
        let Some(geometry) = centered(parent, (1, self.input.max_len() + 1), (1, 2)) else {
            return Ok(());
        };
        draw_frame(out, geometry, &self.title)?;
        self.input.set_width(geometry.width - PADDING);

        // The field itself is drawn un-reversed so it reads as an input box;
        // the cursor cell flips back to reverse.
        let field_width = geometry.width - PADDING;
        let visible = self.input.visible_text();
        out.queue(MoveTo(geometry.x + BORDER as u16, geometry.y + BORDER as u16))?
            .queue(Print(format!("{visible:<field_width$}")))?;
        let cursor_col = self.input.cursor_column();
        let under_cursor = visible.chars().nth(cursor_col).unwrap_or(' ');
        out.queue(MoveTo(
            geometry.x + (BORDER + cursor_col) as u16,
            geometry.y + BORDER as u16,
        ))?
            .queue(SetAttribute(Attribute::Reverse))?
            .queue(Print(under_cursor))?
            .queue(SetAttribute(Attribute::Reset))?;
        Ok(())
    }
}

/// Field-structured datetime picker; arrows move and step, Enter accepts.
pub struct DatetimeDialog {
    title: String,
    state: DatetimeState,
}

impl DatetimeDialog {
    pub fn new(title: impl Into<String>, value: NaiveDateTime) -> Self {
        Self {
            title: title.into(),
            state: DatetimeState::new(value),
        }
    }

    pub fn value(&self) -> NaiveDateTime {
        self.state.value()
    }
}

impl Dialog for DatetimeDialog {
    fn handle_key(&mut self, key: &KeyEvent) -> DialogOutcome {
        match key.code {
            KeyCode::Enter => DialogOutcome::Accepted,
            KeyCode::Esc => DialogOutcome::Cancelled,
            KeyCode::Left => {
                self.state.move_left();
                DialogOutcome::Pending
            }
            KeyCode::Right => {
                self.state.move_right();
                DialogOutcome::Pending
            }
            KeyCode::Up => {
                self.state.increment();
                DialogOutcome::Pending
            }
            KeyCode::Down => {
                self.state.decrement();
                DialogOutcome::Pending
            }
            _ => DialogOutcome::Pending,
        }
    }

    fn draw(&mut self, out: &mut dyn Write, parent: (u16, u16)) -> Result<()> {
        let text = self.state.text();
        let width = text.chars().count();
        let Some(geometry) = centered(parent, (1, width), (1, width)) else {
            return Ok(());
        };
        draw_frame(out, geometry, &self.title)?;
        out.queue(MoveTo(geometry.x + BORDER as u16, geometry.y + BORDER as u16))?
            .queue(SetAttribute(Attribute::Reverse))?
            .queue(Print(&text))?;
        // Active field rendered un-reversed as the edit highlight.
        let (offset, len) = self.state.position();
        let field: String = text.chars().skip(offset).take(len).collect();
        out.queue(MoveTo(
            geometry.x + (BORDER + offset) as u16,
            geometry.y + BORDER as u16,
        ))?
            .queue(SetAttribute(Attribute::Reset))?
            .queue(Print(field))?;
        Ok(())
    }
}
