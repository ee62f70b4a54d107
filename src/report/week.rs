use crate::report::DAYS_PER_WEEK;
use crate::scanner::DATE_FORMAT;
use chrono::{Days, NaiveDate};

/// Seven consecutive days starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl WeekWindow {
    pub fn new(start: NaiveDate) -> Self {
        let end = start
            .checked_add_days(Days::new(DAYS_PER_WEEK as u64 - 1))
            .unwrap_or(NaiveDate::MAX);
        Self { start, end }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// The days of the window paired with their 0-based index.
    pub fn days(&self) -> impl Iterator<Item = (usize, NaiveDate)> {
        self.start
            .iter_days()
            .take(DAYS_PER_WEEK)
            .enumerate()
    }

    pub fn folder_name(&self, label: &str) -> String {
        format!(
            "{} {}-{}",
            label,
            self.start.format(DATE_FORMAT),
            self.end.format(DATE_FORMAT)
        )
    }
}
