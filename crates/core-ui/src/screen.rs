//! Raw-mode alternate-screen handling.
//!
//! The guard restores the terminal even when the caller early-returns or
//! panics; the interactive loop never prints outside raw mode, so log output
//! goes to the file appender instead.

use anyhow::Result;
use crossterm::{
    cursor::{Hide, Show},
    execute,
    terminal::{
        Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen, SetTitle, disable_raw_mode,
        enable_raw_mode,
    },
};
use std::io::{Write, stdout};

pub struct Screen {
    entered: bool,
}

/// RAII guard ensuring terminal state restoration even if the caller
/// early-returns or panics.
pub struct ScreenGuard<'a> {
    screen: &'a mut Screen,
}

impl Default for Screen {
    fn default() -> Self {
        Self::new()
    }
}

impl Screen {
    pub fn new() -> Self {
        Self { entered: false }
    }

    pub fn set_title(&mut self, title: &str) -> Result<()> {
        execute!(stdout(), SetTitle(title))?;
        Ok(())
    }

    pub fn enter(&mut self) -> Result<()> {
        if !self.entered {
            enable_raw_mode()?;
            execute!(stdout(), EnterAlternateScreen, Hide)?;
            self.entered = true;
        }
        Ok(())
    }

    pub fn leave(&mut self) -> Result<()> {
        if self.entered {
            execute!(stdout(), LeaveAlternateScreen, Show)?;
            disable_raw_mode()?;
            self.entered = false;
        }
        Ok(())
    }

    /// Enter and return a guard that will leave on drop.
    pub fn enter_guard(&mut self) -> Result<ScreenGuard<'_>> {
        self.enter()?;
        Ok(ScreenGuard { screen: self })
    }

    /// Current terminal size as (columns, rows).
    pub fn size() -> Result<(u16, u16)> {
        Ok(crossterm::terminal::size()?)
    }

    /// Wipe the whole screen before a repaint.
    pub fn clear(out: &mut impl Write) -> Result<()> {
        crossterm::queue!(out, Clear(ClearType::All))?;
        Ok(())
    }
}

impl Drop for Screen {
    fn drop(&mut self) {
        let _ = self.leave();
    }
}

impl<'a> Drop for ScreenGuard<'a> {
    fn drop(&mut self) {
        let _ = self.screen.leave();
    }
}
