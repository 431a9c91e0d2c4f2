use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;
use serde::Serialize;

use crate::error::TransformError;
use crate::tables::MAX_ACTIVITY_PERIODS;

/// Distinct values kept for error reporting. Anything beyond already fails.
const STORED_PERIODS: usize = 64;

static QUARTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})Q([1-4])$").expect("quarter pattern"));
static MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})-(\w{3})$").expect("month pattern"));

/// Distinct `ACTIVITY_PERIOD` values in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityPeriodTracker {
    seen: Vec<String>,
    truncated: bool,
}

impl ActivityPeriodTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one row's value. Blank values are ignored.
    pub fn observe(&mut self, value: &str) {
        let value = value.trim();
        if value.is_empty() || self.seen.iter().any(|p| p == value) {
            return;
        }
        if self.seen.len() < STORED_PERIODS {
            self.seen.push(value.to_string());
        } else {
            self.truncated = true;
        }
    }

    pub fn periods(&self) -> &[String] {
        &self.seen
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// True when more distinct values were seen than are stored.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn is_acceptable(&self) -> bool {
        self.seen.len() <= MAX_ACTIVITY_PERIODS
    }

    pub fn validate(&self) -> Result<(), TransformError> {
        if self.is_acceptable() {
            Ok(())
        } else {
            Err(TransformError::TooManyPeriods {
                max: MAX_ACTIVITY_PERIODS,
                periods: self.seen.clone(),
            })
        }
    }
}

/// Spanish filing period derived from an activity period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FilingPeriod {
    pub year: i32,
    pub quarterly: bool,
    /// Quarter (1..=4) or month (1..=12).
    pub number: u32,
}

impl FilingPeriod {
    /// Form label: `T n` for quarters, `M n` for months.
    pub fn label(&self) -> String {
        let prefix = if self.quarterly { 'T' } else { 'M' };
        format!("{prefix} {}", self.number)
    }

    /// Parse `2024Q1` or `2024-JAN`. Anything else falls back to Q1 of
    /// `fallback_year`.
    pub fn parse(period: Option<&str>, fallback_year: i32) -> Self {
        let fallback = Self {
            year: fallback_year,
            quarterly: true,
            number: 1,
        };
        period.and_then(Self::try_parse).unwrap_or(fallback)
    }

    /// Parse `2024Q1` or `2024-JAN`, `None` for anything else.
    pub fn try_parse(period: &str) -> Option<Self> {
        parse_quarter(period).or_else(|| parse_month(period))
    }

    /// Period part of a form header: `1T` for a quarter, `01` for a month.
    pub fn code(&self) -> String {
        if self.quarterly {
            format!("{}T", self.number)
        } else {
            format!("{:02}", self.number)
        }
    }

    /// Like [`FilingPeriod::parse`], falling back to the current year.
    pub fn from_first(periods: &[String]) -> Self {
        let year = chrono::Local::now().year();
        Self::parse(periods.first().map(String::as_str), year)
    }
}

fn parse_quarter(period: &str) -> Option<FilingPeriod> {
    let caps = QUARTER.captures(period.trim())?;
    Some(FilingPeriod {
        year: caps[1].parse().ok()?,
        quarterly: true,
        number: caps[2].parse().ok()?,
    })
}

fn parse_month(period: &str) -> Option<FilingPeriod> {
    const MONTHS: [&str; 12] = [
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ];
    let caps = MONTH.captures(period.trim())?;
    // Unknown month names file as January.
    let month = MONTHS
        .iter()
        .position(|m| *m == &caps[2])
        .map_or(1, |i| i as u32 + 1);
    Some(FilingPeriod {
        year: caps[1].parse().ok()?,
        quarterly: false,
        number: month,
    })
}
