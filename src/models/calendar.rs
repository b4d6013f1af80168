use std::collections::BTreeSet;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::services::schedule_utils;

/// Branch working calendar as stored and exchanged with the UI layer.
///
/// Weekdays are indexed 0 = Sunday .. 6 = Saturday, times are "HH:MM" and
/// holidays are literal "YYYY-MM-DD" strings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BranchCalendarRecord {
    pub branch_id: String,
    pub working_days: Vec<u8>,
    pub operating_hours: OperatingHoursRecord,
    #[serde(default)]
    pub holidays: Vec<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OperatingHoursRecord {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl OperatingHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> AppResult<Self> {
        if start >= end {
            return Err(AppError::configuration(format!(
                "operating hours must open before they close ({} - {})",
                schedule_utils::format_wall_time(start),
                schedule_utils::format_wall_time(end)
            )));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> AppResult<Self> {
        let parse = |value: &str| {
            schedule_utils::parse_wall_time(value).map_err(|_| {
                AppError::configuration(format!("malformed operating-hours time: {value:?}"))
            })
        };
        Self::new(parse(start)?, parse(end)?)
    }

    /// Whether `[start, end)` fits inside the window.
    pub fn contains(&self, start: NaiveTime, end: NaiveTime) -> bool {
        start >= self.start && end <= self.end && start < end
    }
}

/// Validated working calendar. Construction enforces a non-empty set of
/// weekdays in 0..=6 and an opening time before the closing time.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingCalendar {
    working_days: BTreeSet<u8>,
    hours: OperatingHours,
    holidays: BTreeSet<NaiveDate>,
}

impl WorkingCalendar {
    pub fn new(working_days: impl IntoIterator<Item = u8>, hours: OperatingHours) -> AppResult<Self> {
        let working_days: BTreeSet<u8> = working_days.into_iter().collect();
        if working_days.is_empty() {
            return Err(AppError::configuration("working calendar has no working days"));
        }
        if let Some(invalid) = working_days.iter().find(|day| **day > 6) {
            return Err(AppError::configuration(format!(
                "weekday index {invalid} is outside 0 (Sunday) ..= 6 (Saturday)"
            )));
        }

        Ok(Self {
            working_days,
            hours,
            holidays: BTreeSet::new(),
        })
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    pub fn from_record(record: &BranchCalendarRecord) -> AppResult<Self> {
        let hours = OperatingHours::parse(
            &record.operating_hours.start,
            &record.operating_hours.end,
        )?;
        let holidays = record
            .holidays
            .iter()
            .map(|raw| {
                schedule_utils::parse_calendar_date(raw).map_err(|_| {
                    AppError::configuration(format!("malformed holiday date: {raw:?}"))
                })
            })
            .collect::<AppResult<Vec<_>>>()?;

        Ok(Self::new(record.working_days.iter().copied(), hours)?.with_holidays(holidays))
    }

    pub fn to_record(&self, branch_id: &str) -> BranchCalendarRecord {
        BranchCalendarRecord {
            branch_id: branch_id.to_string(),
            working_days: self.working_days.iter().copied().collect(),
            operating_hours: OperatingHoursRecord {
                start: schedule_utils::format_wall_time(self.hours.start),
                end: schedule_utils::format_wall_time(self.hours.end),
            },
            holidays: self
                .holidays
                .iter()
                .map(|date| schedule_utils::format_calendar_date(*date))
                .collect(),
            updated_at: None,
        }
    }

    pub fn is_working_day(&self, date: NaiveDate) -> bool {
        self.working_days
            .contains(&schedule_utils::weekday_index(date))
            && !self.holidays.contains(&date)
    }

    pub fn working_days(&self) -> impl Iterator<Item = u8> + '_ {
        self.working_days.iter().copied()
    }

    pub fn operating_hours(&self) -> &OperatingHours {
        &self.hours
    }

    pub fn holidays(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.holidays.iter().copied()
    }
}

/// Inclusive range of calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}
