//! Window state backing the filter status line and the datetime picker.

use chrono::{Datelike, Duration, Months, NaiveDateTime};
use core_query::Filter;
use core_record::{Facility, Severity};

/// The user's current filter selections. Level defaults to debug (show
/// everything); cleared string filters collapse to "match all".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterState {
    level: u8,
    facility: Option<u8>,
    host: Option<String>,
    program: Option<String>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            level: 7,
            facility: None,
            host: None,
            program: None,
        }
    }
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    /// `None` resets to the debug ceiling (everything visible).
    pub fn set_level(&mut self, level: Option<u8>) {
        self.level = level.unwrap_or(7).min(7);
    }

    pub fn facility(&self) -> Option<u8> {
        self.facility
    }

    pub fn set_facility(&mut self, facility: Option<u8>) {
        self.facility = facility;
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn set_host(&mut self, host: &str) {
        self.host = normalize(host);
    }

    pub fn program(&self) -> Option<&str> {
        self.program.as_deref()
    }

    pub fn set_program(&mut self, program: &str) {
        self.program = normalize(program);
    }

    /// Status-bar summary pairs, in display order.
    pub fn summary(&self) -> Vec<(&'static str, String)> {
        vec![
            (
                "[l]evel",
                Severity::new(self.level)
                    .name()
                    .unwrap_or("debug")
                    .to_string(),
            ),
            (
                "[f]acility",
                match self.facility {
                    Some(code) => Facility::new(code).to_string(),
                    None => "ALL".to_string(),
                },
            ),
            ("[p]rogram", self.program.clone().unwrap_or_else(|| "*".into())),
            ("[h]ost", self.host.clone().unwrap_or_else(|| "*".into())),
        ]
    }

    /// The query-side rendition. A debug-level ceiling excludes nothing, so
    /// it is omitted from the query entirely.
    pub fn to_filter(&self) -> Filter {
        Filter {
            level: (self.level < 7).then_some(self.level),
            facility: self.facility,
            host: self.host.clone(),
            program: self.program.clone(),
        }
    }
}

fn normalize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Which datetime field the picker cursor is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DatetimeField {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

const FIELDS: [DatetimeField; 6] = [
    DatetimeField::Year,
    DatetimeField::Month,
    DatetimeField::Day,
    DatetimeField::Hour,
    DatetimeField::Minute,
    DatetimeField::Second,
];

/// Field-structured editor over a `YYYY-MM-DD HH:MM:SS` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatetimeState {
    value: NaiveDateTime,
    field: usize,
}

impl DatetimeState {
    pub fn new(value: NaiveDateTime) -> Self {
        Self { value, field: 0 }
    }

    pub fn value(&self) -> NaiveDateTime {
        self.value
    }

    pub fn text(&self) -> String {
        self.value.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// Highlight range of the active field: (offset, length) into `text()`.
    pub fn position(&self) -> (usize, usize) {
        match FIELDS[self.field] {
            DatetimeField::Year => (0, 4),
            DatetimeField::Month => (5, 2),
            DatetimeField::Day => (8, 2),
            DatetimeField::Hour => (11, 2),
            DatetimeField::Minute => (14, 2),
            DatetimeField::Second => (17, 2),
        }
    }

    pub fn move_left(&mut self) {
        self.field = self.field.saturating_sub(1);
    }

    pub fn move_right(&mut self) {
        self.field = (self.field + 1).min(FIELDS.len() - 1);
    }

    pub fn increment(&mut self) {
        self.step(true);
    }

    pub fn decrement(&mut self) {
        self.step(false);
    }

    fn step(&mut self, up: bool) {
        let value = self.value;
        let stepped = match FIELDS[self.field] {
            DatetimeField::Year => {
                let year = if up { value.year() + 1 } else { value.year() - 1 };
                // Feb 29 has no counterpart in most years; fall back a day.
                value
                    .with_year(year)
                    .or_else(|| (value - Duration::days(1)).with_year(year))
            }
            DatetimeField::Month => Some(if up {
                value + Months::new(1)
            } else {
                value - Months::new(1)
            }),
            DatetimeField::Day => Some(if up {
                value + Duration::days(1)
            } else {
                value - Duration::days(1)
            }),
            DatetimeField::Hour => Some(if up {
                value + Duration::hours(1)
            } else {
                value - Duration::hours(1)
            }),
            DatetimeField::Minute => Some(if up {
                value + Duration::minutes(1)
            } else {
                value - Duration::minutes(1)
            }),
            DatetimeField::Second => Some(if up {
                value + Duration::seconds(1)
            } else {
                value - Duration::seconds(1)
            }),
        };
        if let Some(stepped) = stepped {
            self.value = stepped;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    #[test]
    fn default_filter_state_shows_everything() {
        let state = FilterState::new();
        assert_eq!(state.level(), 7);
        assert_eq!(state.facility(), None);
        assert_eq!(state.host(), None);
        assert_eq!(state.program(), None);
        assert_eq!(state.to_filter(), Filter::default());
    }

    #[test]
    fn clearing_string_filters_collapses_to_none() {
        let mut state = FilterState::new();
        state.set_host("example");
        assert_eq!(state.host(), Some("example"));
        state.set_host("  ");
        assert_eq!(state.host(), None);
        state.set_program("");
        assert_eq!(state.program(), None);
    }

    #[test]
    fn clearing_level_resets_to_debug() {
        let mut state = FilterState::new();
        state.set_level(Some(4));
        assert_eq!(state.level(), 4);
        state.set_level(None);
        assert_eq!(state.level(), 7);
    }

    #[test]
    fn summary_with_defaults() {
        let state = FilterState::new();
        let summary = state.summary();
        assert_eq!(
            summary,
            vec![
                ("[l]evel", "debug".to_string()),
                ("[f]acility", "ALL".to_string()),
                ("[p]rogram", "*".to_string()),
                ("[h]ost", "*".to_string()),
            ]
        );
    }

    #[test]
    fn summary_with_selections() {
        let mut state = FilterState::new();
        state.set_level(Some(6));
        state.set_facility(Some(0));
        state.set_host("example");
        state.set_program("test");
        assert_eq!(
            state.summary(),
            vec![
                ("[l]evel", "info".to_string()),
                ("[f]acility", "kern".to_string()),
                ("[p]rogram", "test".to_string()),
                ("[h]ost", "example".to_string()),
            ]
        );
    }

    #[test]
    fn debug_ceiling_is_omitted_from_the_query() {
        let mut state = FilterState::new();
        assert_eq!(state.to_filter().level, None);
        state.set_level(Some(3));
        assert_eq!(state.to_filter().level, Some(3));
    }

    #[test]
    fn datetime_text_and_highlight_ranges() {
        let mut state = DatetimeState::new(dt(2016, 6, 4, 12, 30, 5));
        assert_eq!(state.text(), "2016-06-04 12:30:05");
        assert_eq!(state.position(), (0, 4));
        state.move_right();
        assert_eq!(state.position(), (5, 2));
        for _ in 0..10 {
            state.move_right();
        }
        assert_eq!(state.position(), (17, 2));
        state.move_left();
        assert_eq!(state.position(), (14, 2));
    }

    #[test]
    fn stepping_fields_uses_calendar_arithmetic() {
        let mut state = DatetimeState::new(dt(2016, 1, 31, 0, 0, 0));
        state.move_right(); // month
        state.increment();
        // Jan 31 + 1 month clamps into February.
        assert_eq!(state.value(), dt(2016, 2, 29, 0, 0, 0));

        let mut state = DatetimeState::new(dt(2016, 6, 4, 23, 59, 59));
        for _ in 0..5 {
            state.move_right();
        }
        state.increment(); // second rolls everything over
        assert_eq!(state.value(), dt(2016, 6, 5, 0, 0, 0));
    }

    #[test]
    fn leap_day_year_step_falls_back_a_day() {
        let mut state = DatetimeState::new(dt(2016, 2, 29, 12, 0, 0));
        state.increment();
        assert_eq!(state.value(), dt(2017, 2, 28, 12, 0, 0));
    }
}
