//! The main log view: columnar rendering of the buffer's visible lines over
//! a virtual width with horizontal step scrolling, plus the filter status
//! bar.
//!
//! Column layout (one space between columns):
//! time (14) | host (8) | program (16) | facility (4) | level (3) | message.
//! The message column takes whatever the virtual width leaves. Continuation
//! lines repeat only the message column, except on the viewport's top row
//! where the record columns are shown so a page starting mid-record still
//! identifies it.

use crate::state::FilterState;
use anyhow::Result;
use core_record::{Line, Severity};
use crossterm::{
    cursor::MoveTo,
    queue,
    style::{Attribute, Color, Print, ResetColor, SetAttribute, SetForegroundColor},
};
use std::io::Write;
use unicode_width::UnicodeWidthChar;

const STEP: usize = 4;
const WIDTHS: [usize; 5] = [14, 8, 16, 4, 3];

/// Everything a row draws: column start (in virtual columns), text, and the
/// style class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub offset: usize,
    pub text: String,
    pub style: SegmentStyle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStyle {
    Plain,
    Level(Severity),
}

pub struct LogView {
    max_width: usize,
    view_width: usize,
    pad_x: usize,
}

impl LogView {
    /// `max_width` is the virtual line width; horizontal scrolling pans a
    /// `view_width`-wide window across it.
    pub fn new(max_width: usize, view_width: usize) -> Self {
        Self {
            max_width,
            view_width,
            pad_x: 0,
        }
    }

    pub fn pad_x(&self) -> usize {
        self.pad_x
    }

    fn pad_x_max(&self) -> usize {
        self.max_width.saturating_sub(self.view_width)
    }

    pub fn scroll_left(&mut self) {
        self.pad_x = self.pad_x.saturating_sub(STEP);
    }

    pub fn scroll_right(&mut self) {
        self.pad_x = (self.pad_x + STEP).min(self.pad_x_max());
    }

    pub fn resize(&mut self, view_width: usize) {
        self.view_width = view_width;
        self.pad_x = self.pad_x.min(self.pad_x_max());
    }

    fn column_offset(i: usize) -> usize {
        WIDTHS[..i].iter().sum::<usize>() + i
    }

    fn column_width(&self, i: usize) -> usize {
        if i >= WIDTHS.len() {
            self.max_width
                .saturating_sub(WIDTHS.iter().sum::<usize>() + WIDTHS.len())
        } else {
            WIDTHS[i]
        }
    }

    /// The segments one line contributes. Record columns are skipped for
    /// continuation rows unless the row is at the top of the viewport.
    pub fn compose_row(&self, line: &Line, top_row: bool) -> Vec<Segment> {
        let mut segments = Vec::new();
        if !line.is_continuation() || top_row {
            let mut push = |i: usize, text: String, style: SegmentStyle| {
                segments.push(Segment {
                    offset: Self::column_offset(i),
                    text: clip_text(&text, 0, self.column_width(i)),
                    style,
                });
            };
            push(
                0,
                line.timestamp().format("%m-%d %H:%M:%S").to_string(),
                SegmentStyle::Plain,
            );
            push(1, line.host().to_string(), SegmentStyle::Plain);
            push(2, line.program().to_string(), SegmentStyle::Plain);
            push(
                3,
                line.facility().to_string().to_uppercase(),
                SegmentStyle::Plain,
            );
            push(
                4,
                line.level().to_string().to_uppercase(),
                SegmentStyle::Level(line.level()),
            );
        }
        segments.push(Segment {
            offset: Self::column_offset(WIDTHS.len()),
            text: clip_text(line.message(), 0, self.column_width(WIDTHS.len())),
            style: SegmentStyle::Plain,
        });
        segments
    }

    /// Status-bar text: the filter summary plus key hints.
    pub fn status_text(filter: &FilterState) -> String {
        let summary = filter
            .summary()
            .into_iter()
            .map(|(key, value)| format!("{key}: {value}"))
            .collect::<Vec<_>>()
            .join("  ");
        format!(" {summary}  Go to [d]ate")
    }

    /// Full repaint of the log page plus the status bar.
    pub fn draw(
        &self,
        out: &mut impl Write,
        lines: &[Line],
        filter: &FilterState,
        size: (u16, u16),
    ) -> Result<()> {
        let (width, height) = (size.0 as usize, size.1 as usize);
        if height < 2 {
            return Ok(());
        }
        for (row, line) in lines.iter().take(height - 1).enumerate() {
            for segment in self.compose_row(line, row == 0) {
                self.draw_segment(out, row, &segment, width)?;
            }
        }

        let status = Self::status_text(filter);
        queue!(
            out,
            MoveTo(0, (height - 1) as u16),
            SetAttribute(Attribute::Reverse),
            SetAttribute(Attribute::Bold),
            Print(format!("{:<width$}", clip_text(&status, 0, width))),
            SetAttribute(Attribute::Reset),
            ResetColor,
        )?;
        Ok(())
    }

    fn draw_segment(
        &self,
        out: &mut impl Write,
        row: usize,
        segment: &Segment,
        view_width: usize,
    ) -> Result<()> {
        // Pan the pad window: the segment spans virtual columns
        // [offset, offset + text width); intersect with [pad_x, pad_x + w).
        let window_end = self.pad_x + view_width;
        if segment.offset >= window_end {
            return Ok(());
        }
        let (skip, screen_x) = if segment.offset < self.pad_x {
            (self.pad_x - segment.offset, 0)
        } else {
            (0, segment.offset - self.pad_x)
        };
        let visible = clip_text(&segment.text, skip, window_end - segment.offset.max(self.pad_x));
        if visible.is_empty() {
            return Ok(());
        }
        queue!(out, MoveTo(screen_x as u16, row as u16))?;
        match segment.style {
            SegmentStyle::Plain => queue!(out, Print(visible))?,
            SegmentStyle::Level(level) => {
                let (color, attr) = level_style(level);
                queue!(out, SetForegroundColor(color))?;
                if let Some(attr) = attr {
                    queue!(out, SetAttribute(attr))?;
                }
                queue!(
                    out,
                    Print(visible),
                    SetAttribute(Attribute::Reset),
                    ResetColor
                )?;
            }
        }
        Ok(())
    }
}

fn level_style(level: Severity) -> (Color, Option<Attribute>) {
    match level.code() {
        0 | 1 => (Color::Red, Some(Attribute::Reverse)),
        2 => (Color::Red, Some(Attribute::Bold)),
        3 => (Color::Red, None),
        4 => (Color::Yellow, Some(Attribute::Bold)),
        5 => (Color::Cyan, Some(Attribute::Bold)),
        6 => (Color::Green, Some(Attribute::Bold)),
        _ => (Color::Grey, None),
    }
}

/// Width-aware clipping: skip `skip` display columns, keep at most `take`.
/// A wide character straddling either boundary is dropped, never split.
pub(crate) fn clip_text(text: &str, skip: usize, take: usize) -> String {
    let mut out = String::new();
    let mut col = 0usize;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if col + w > skip + take {
            break;
        }
        if col >= skip {
            out.push(c);
        } else if col + w > skip {
            // Wide char straddles the left edge: drop it, keep alignment.
            out.push(' ');
        }
        col += w;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use core_record::{Facility, Record};

    fn line(message: &str, continuation: bool) -> Line {
        let record = Record {
            id: 1,
            timestamp: NaiveDate::from_ymd_opt(2016, 6, 4)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            level: Severity::new(7),
            facility: Facility::new(0),
            host: "test".into(),
            program: "example".into(),
            pid: None,
            message: if continuation {
                format!("first\n{message}")
            } else {
                message.to_string()
            },
        };
        let mut lines = record.into_lines();
        if continuation { lines.remove(1) } else { lines.remove(0) }
    }

    #[test]
    fn column_offsets_leave_one_space_gaps() {
        assert_eq!(LogView::column_offset(0), 0);
        assert_eq!(LogView::column_offset(1), 15);
        assert_eq!(LogView::column_offset(2), 24);
        assert_eq!(LogView::column_offset(3), 41);
        assert_eq!(LogView::column_offset(4), 46);
        assert_eq!(LogView::column_offset(5), 50);
    }

    #[test]
    fn message_column_takes_the_remaining_width() {
        let view = LogView::new(100, 80);
        assert_eq!(view.column_width(5), 50);
        assert_eq!(view.column_width(0), 14);
    }

    #[test]
    fn primary_row_renders_all_columns() {
        let view = LogView::new(100, 80);
        let segments = view.compose_row(&line("test message", false), false);
        let rendered: Vec<(usize, &str)> = segments
            .iter()
            .map(|s| (s.offset, s.text.as_str()))
            .collect();
        assert_eq!(
            rendered,
            vec![
                (0, "06-04 00:00:00"),
                (15, "test"),
                (24, "example"),
                (41, "KERN"),
                (46, "DEB"),
                (50, "test message"),
            ]
        );
        assert_eq!(segments[4].style, SegmentStyle::Level(Severity::new(7)));
    }

    #[test]
    fn continuation_row_renders_only_the_message() {
        let view = LogView::new(100, 80);
        let segments = view.compose_row(&line("more", true), false);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].offset, 50);
        assert_eq!(segments[0].text, "more");
    }

    #[test]
    fn continuation_row_at_the_top_shows_record_columns() {
        let view = LogView::new(100, 80);
        let segments = view.compose_row(&line("more", true), true);
        assert_eq!(segments.len(), 6);
        assert_eq!(segments[0].text, "06-04 00:00:00");
        assert_eq!(segments[5].text, "more");
    }

    #[test]
    fn horizontal_scrolling_steps_and_clamps() {
        let mut view = LogView::new(36, 30);
        assert_eq!(view.pad_x(), 0);
        view.scroll_right();
        assert_eq!(view.pad_x(), 4);
        view.scroll_right();
        assert_eq!(view.pad_x(), 6);
        view.scroll_left();
        assert_eq!(view.pad_x(), 2);
        view.scroll_left();
        assert_eq!(view.pad_x(), 0);
    }

    #[test]
    fn resize_re_clamps_the_pan_offset() {
        let mut view = LogView::new(36, 30);
        view.scroll_right();
        view.scroll_right();
        assert_eq!(view.pad_x(), 6);
        view.resize(32);
        assert_eq!(view.pad_x(), 4);
    }

    #[test]
    fn status_text_summarizes_the_filter() {
        let filter = FilterState::new();
        assert_eq!(
            LogView::status_text(&filter),
            " [l]evel: debug  [f]acility: ALL  [p]rogram: *  [h]ost: *  Go to [d]ate"
        );
    }

    #[test]
    fn clip_text_is_width_aware() {
        assert_eq!(clip_text("hello", 0, 3), "hel");
        assert_eq!(clip_text("hello", 2, 2), "ll");
        assert_eq!(clip_text("héllo", 0, 2), "hé");
        // Double-width chars never split.
        assert_eq!(clip_text("a漢b", 0, 2), "a");
        assert_eq!(clip_text("a漢b", 2, 2), " b");
    }
}
