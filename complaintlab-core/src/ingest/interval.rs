//! Interval planning for paginated downloads.
//!
//! A `[from, to]` window is cut into contiguous sub-windows whose width is
//! picked from the total span:
//!
//! | span            | step    |
//! |-----------------|---------|
//! | > 365 days      | yearly  |
//! | > 30 days       | monthly |
//! | > 7 days        | weekly  |
//! | otherwise       | none    |
//!
//! Steps are anchored at `from`, so the first window always starts there.
//! `to` is always the last boundary, which makes the final window narrower
//! than the others whenever the step does not land on it exactly.

use super::error::IngestError;
use chrono::{Days, Months, NaiveDate};
use serde::{Deserialize, Serialize};

/// Date format used on the wire, in file names and in metadata.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(value: &str) -> Result<NaiveDate, IngestError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|e| IngestError::Configuration(format!("invalid date '{value}': {e}")))
}

/// Step size between consecutive boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Span {
    Yearly,
    Monthly,
    Weekly,
    None,
}

impl Span {
    /// Pick the step for a window of `days` days.
    pub fn for_day_span(days: i64) -> Self {
        if days > 365 {
            Span::Yearly
        } else if days > 30 {
            Span::Monthly
        } else if days > 7 {
            Span::Weekly
        } else {
            Span::None
        }
    }

    /// The `n`-th boundary after `start`. Always computed from `start` rather
    /// than from the previous boundary so month-end clamping does not drift.
    fn nth_after(self, start: NaiveDate, n: u32) -> Option<NaiveDate> {
        match self {
            Span::Yearly => start.checked_add_months(Months::new(n.checked_mul(12)?)),
            Span::Monthly => start.checked_add_months(Months::new(n)),
            Span::Weekly => start.checked_add_days(Days::new(u64::from(n) * 7)),
            Span::None => None,
        }
    }
}

/// A validated ingestion window, `from_date <= to_date`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestionWindow {
    from_date: NaiveDate,
    to_date: NaiveDate,
}

impl IngestionWindow {
    pub fn new(from_date: NaiveDate, to_date: NaiveDate) -> Result<Self, IngestError> {
        if from_date > to_date {
            return Err(IngestError::Configuration(format!(
                "from_date {from_date} is after to_date {to_date}"
            )));
        }
        Ok(Self { from_date, to_date })
    }

    pub fn parse(from_date: &str, to_date: &str) -> Result<Self, IngestError> {
        Self::new(parse_date(from_date)?, parse_date(to_date)?)
    }

    pub fn from_date(&self) -> NaiveDate {
        self.from_date
    }

    pub fn to_date(&self) -> NaiveDate {
        self.to_date
    }

    pub fn day_span(&self) -> i64 {
        (self.to_date - self.from_date).num_days()
    }

    pub fn span(&self) -> Span {
        Span::for_day_span(self.day_span())
    }

    /// True when there is nothing to fetch.
    pub fn is_empty(&self) -> bool {
        self.from_date == self.to_date
    }
}

/// Splits an ingestion window into download boundaries.
pub struct IntervalPlanner;

impl IntervalPlanner {
    /// Ordered boundaries for `window`; the last element is always `to_date`.
    pub fn plan(window: &IngestionWindow) -> Vec<NaiveDate> {
        let from = window.from_date();
        let to = window.to_date();
        let span = window.span();

        let mut boundaries = vec![from];
        let mut n = 1;
        while let Some(next) = span.nth_after(from, n) {
            if next >= to {
                break;
            }
            boundaries.push(next);
            n += 1;
        }

        // Generated boundaries are strictly before `to`, so it is never
        // already present (a same-day window yields `[from, from]`).
        boundaries.push(to);

        tracing::debug!(
            days = window.day_span(),
            ?span,
            boundaries = boundaries.len(),
            "prepared download intervals"
        );
        boundaries
    }

    /// String front-end: parses both bounds and renders the plan back as
    /// `YYYY-MM-DD` strings.
    pub fn plan_str(from_date: &str, to_date: &str) -> Result<Vec<String>, IngestError> {
        let window = IngestionWindow::parse(from_date, to_date)?;
        Ok(Self::plan(&window)
            .into_iter()
            .map(|d| d.format(DATE_FORMAT).to_string())
            .collect())
    }

    /// Consecutive `(from, to)` pairs of a plan.
    pub fn sub_windows(boundaries: &[NaiveDate]) -> Vec<(NaiveDate, NaiveDate)> {
        boundaries.windows(2).map(|w| (w[0], w[1])).collect()
    }
}
