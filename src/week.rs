use chrono::{Datelike, Duration, NaiveDate};

use crate::error::{EngineError, Result};
use crate::slot::{day_index, DAY_TOKENS};

pub const DATE_FMT: &str = "%Y-%m-%d";

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FMT).map_err(|_| {
        EngineError::InvalidTimeFormat(format!("date must be YYYY-MM-DD, got {raw:?}"))
    })
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FMT).to_string()
}

/// Monday of the week containing `date`. Sunday counts as the last day of the
/// current week, not the first of the next.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

pub fn week_end(start: NaiveDate) -> NaiveDate {
    start + Duration::days(6)
}

/// Concrete date of a day-of-week token within the week starting at `start`.
pub fn date_for_day(start: NaiveDate, day_token: &str) -> NaiveDate {
    start + Duration::days(day_index(day_token) as i64)
}

/// Canonical day token of a concrete date.
pub fn day_token_for_date(date: NaiveDate) -> &'static str {
    DAY_TOKENS[date.weekday().num_days_from_monday() as usize]
}
