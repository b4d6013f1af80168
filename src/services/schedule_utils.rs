use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde_json::json;

use crate::error::{AppError, AppResult};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M";

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Parses a calendar date, dropping any time-of-day suffix literally.
///
/// `2025-05-03`, `2025-05-03T18:30:00.000Z` and `2025-05-03 18:30` all yield
/// 2025-05-03. No offset is ever applied.
pub fn parse_calendar_date(value: &str) -> AppResult<NaiveDate> {
    let trimmed = value.trim();
    let date_part = trimmed
        .split(|c| c == 'T' || c == ' ')
        .next()
        .unwrap_or(trimmed);

    NaiveDate::parse_from_str(date_part, DATE_FORMAT).map_err(|err| {
        AppError::validation_with_details(
            "invalid calendar date",
            json!({"value": value, "error": err.to_string()}),
        )
    })
}

pub fn format_calendar_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses a wall-clock time (`H:MM`, `HH:MM` or `HH:MM:SS`) to minute precision.
pub fn parse_wall_time(value: &str) -> AppResult<NaiveTime> {
    let trimmed = value.trim();
    let parsed = NaiveTime::parse_from_str(trimmed, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, TIME_FORMAT))
        .map_err(|err| {
            AppError::validation_with_details(
                "invalid wall-clock time",
                json!({"value": value, "error": err.to_string()}),
            )
        })?;

    Ok(to_naive_time(minutes_from_midnight(parsed)))
}

pub fn format_wall_time(time: NaiveTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

/// Single comparable key for a slot, e.g. `2025-05-05 09:00`.
pub fn slot_key(date: NaiveDate, time: NaiveTime) -> String {
    format!("{} {}", format_calendar_date(date), format_wall_time(time))
}

pub fn split_slot_key(key: &str) -> AppResult<(NaiveDate, NaiveTime)> {
    let (date, time) = key
        .trim()
        .split_once(' ')
        .ok_or_else(|| AppError::validation(format!("malformed slot key: {key}")))?;
    Ok((parse_calendar_date(date)?, parse_wall_time(time)?))
}

/// Adds minutes to a wall-clock time with explicit hour/day carry.
///
/// Returns the resulting time and the number of whole days carried over.
pub fn add_minutes(time: NaiveTime, minutes: u32) -> (NaiveTime, u32) {
    let total = u64::from(minutes_from_midnight(time)) + u64::from(minutes);
    let per_day = u64::from(MINUTES_PER_DAY);
    let days = u32::try_from(total / per_day).unwrap_or(u32::MAX);
    (to_naive_time((total % per_day) as u32), days)
}

/// End time of a session starting at `start`. Sessions never cross midnight.
pub fn end_time_for(start: NaiveTime, duration_minutes: u32) -> AppResult<NaiveTime> {
    match add_minutes(start, duration_minutes) {
        (end, 0) => Ok(end),
        (end, days) => Err(AppError::validation_with_details(
            "session would end after midnight",
            json!({
                "start": format_wall_time(start),
                "durationMinutes": duration_minutes,
                "end": format_wall_time(end),
                "daysCarried": days,
            }),
        )),
    }
}

pub fn minutes_from_midnight(time: NaiveTime) -> u32 {
    time.hour() * 60 + time.minute()
}

pub fn to_naive_time(total_minutes: u32) -> NaiveTime {
    let total_minutes = total_minutes % MINUTES_PER_DAY;
    NaiveTime::from_hms_opt(total_minutes / 60, total_minutes % 60, 0).unwrap_or_default()
}

/// Half-open interval overlap on a single day.
pub fn overlaps(a_start: NaiveTime, a_end: NaiveTime, b_start: NaiveTime, b_end: NaiveTime) -> bool {
    a_start < b_end && b_start < a_end
}

/// 0 = Sunday .. 6 = Saturday.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}
