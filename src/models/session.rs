use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::services::schedule_utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
    Rescheduled,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "SCHEDULED",
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Cancelled => "CANCELLED",
            SessionStatus::NoShow => "NO_SHOW",
            SessionStatus::Rescheduled => "RESCHEDULED",
        }
    }

    /// Only sessions that have not started may be moved by a plan edit.
    pub fn is_patchable(self) -> bool {
        matches!(self, SessionStatus::Scheduled | SessionStatus::Rescheduled)
    }

    /// Whether the session still holds its vehicle slot.
    pub fn occupies_slot(self) -> bool {
        self != SessionStatus::Cancelled
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Cancelled | SessionStatus::NoShow
        )
    }

    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;

        match (self, next) {
            (Scheduled | Rescheduled, InProgress | Completed | Cancelled | NoShow | Rescheduled) => {
                true
            }
            (InProgress, Completed | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SCHEDULED" => Ok(SessionStatus::Scheduled),
            "IN_PROGRESS" => Ok(SessionStatus::InProgress),
            "COMPLETED" => Ok(SessionStatus::Completed),
            "CANCELLED" => Ok(SessionStatus::Cancelled),
            "NO_SHOW" => Ok(SessionStatus::NoShow),
            "RESCHEDULED" => Ok(SessionStatus::Rescheduled),
            other => Err(AppError::validation(format!("unknown session status: {other}"))),
        }
    }
}

/// Raw plan input as submitted by the enrollment form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRequestInput {
    pub client_id: String,
    pub vehicle_id: String,
    pub plan_id: String,
    pub joining_date: String,
    pub joining_time: String,
    pub session_count: i64,
    pub duration_minutes: i64,
}

/// Normalized scheduling request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    pub client_id: String,
    pub vehicle_id: String,
    pub plan_id: String,
    pub joining_date: NaiveDate,
    pub joining_time: NaiveTime,
    pub session_count: u32,
    pub duration_minutes: u32,
}

impl SessionRequest {
    pub fn from_input(input: &SessionRequestInput) -> AppResult<Self> {
        for (field, value) in [
            ("clientId", &input.client_id),
            ("vehicleId", &input.vehicle_id),
            ("planId", &input.plan_id),
        ] {
            if value.trim().is_empty() {
                return Err(AppError::validation_with_details(
                    "identifier must not be empty",
                    json!({ "field": field }),
                ));
            }
        }

        let session_count = positive(input.session_count, "sessionCount")?;
        let duration_minutes = positive(input.duration_minutes, "durationMinutes")?;
        if duration_minutes > schedule_utils::MINUTES_PER_DAY {
            return Err(AppError::validation_with_details(
                "session duration must fit within a single day",
                json!({ "field": "durationMinutes", "value": input.duration_minutes }),
            ));
        }

        Ok(Self {
            client_id: input.client_id.trim().to_string(),
            vehicle_id: input.vehicle_id.trim().to_string(),
            plan_id: input.plan_id.trim().to_string(),
            joining_date: schedule_utils::parse_calendar_date(&input.joining_date)?,
            joining_time: schedule_utils::parse_wall_time(&input.joining_time)?,
            session_count,
            duration_minutes,
        })
    }

    pub fn timing(&self) -> PlanTiming {
        PlanTiming {
            joining_date: self.joining_date,
            joining_time: self.joining_time,
            vehicle_id: self.vehicle_id.clone(),
            session_count: self.session_count,
        }
    }
}

fn positive(value: i64, field: &str) -> AppResult<u32> {
    u32::try_from(value)
        .ok()
        .filter(|value| *value > 0)
        .ok_or_else(|| {
            AppError::validation_with_details(
                "value must be a positive integer",
                json!({ "field": field, "value": value }),
            )
        })
}

/// The plan fields whose change forces the session series to be rebuilt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanTiming {
    pub joining_date: NaiveDate,
    pub joining_time: NaiveTime,
    pub vehicle_id: String,
    pub session_count: u32,
}

/// One generated slot, before persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSlot {
    pub session_number: u32,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub vehicle_id: String,
    pub plan_id: String,
    pub client_id: String,
}

impl SessionSlot {
    pub fn session_date(&self) -> String {
        schedule_utils::format_calendar_date(self.date)
    }

    pub fn start(&self) -> String {
        schedule_utils::format_wall_time(self.start_time)
    }

    pub fn end(&self) -> String {
        schedule_utils::format_wall_time(self.end_time)
    }

    pub fn slot_key(&self) -> String {
        schedule_utils::slot_key(self.date, self.start_time)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: String,
    pub plan_id: String,
    pub client_id: String,
    pub vehicle_id: String,
    pub session_number: u32,
    pub session_date: String,
    pub start_time: String,
    pub end_time: String,
    pub status: SessionStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl SessionRecord {
    pub fn from_slot(slot: &SessionSlot, now: &str) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            plan_id: slot.plan_id.clone(),
            client_id: slot.client_id.clone(),
            vehicle_id: slot.vehicle_id.clone(),
            session_number: slot.session_number,
            session_date: slot.session_date(),
            start_time: slot.start(),
            end_time: slot.end(),
            status: SessionStatus::Scheduled,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }

    pub fn date(&self) -> AppResult<NaiveDate> {
        schedule_utils::parse_calendar_date(&self.session_date)
    }

    pub fn start(&self) -> AppResult<NaiveTime> {
        schedule_utils::parse_wall_time(&self.start_time)
    }

    pub fn end(&self) -> AppResult<NaiveTime> {
        schedule_utils::parse_wall_time(&self.end_time)
    }

    pub fn is_at(&self, date: &str, start_time: &str) -> bool {
        self.session_date == date && self.start_time == start_time
    }
}

/// Snapshot of the last finalized plan, used for change detection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanRecord {
    pub id: String,
    pub client_id: String,
    pub branch_id: String,
    pub vehicle_id: String,
    pub joining_date: String,
    pub joining_time: String,
    pub session_count: u32,
    pub duration_minutes: u32,
    pub created_at: String,
    pub updated_at: String,
}

impl PlanRecord {
    pub fn from_request(request: &SessionRequest, branch_id: &str, now: &str) -> Self {
        Self {
            id: request.plan_id.clone(),
            client_id: request.client_id.clone(),
            branch_id: branch_id.to_string(),
            vehicle_id: request.vehicle_id.clone(),
            joining_date: schedule_utils::format_calendar_date(request.joining_date),
            joining_time: schedule_utils::format_wall_time(request.joining_time),
            session_count: request.session_count,
            duration_minutes: request.duration_minutes,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }

    pub fn timing(&self) -> AppResult<PlanTiming> {
        Ok(PlanTiming {
            joining_date: schedule_utils::parse_calendar_date(&self.joining_date)?,
            joining_time: schedule_utils::parse_wall_time(&self.joining_time)?,
            vehicle_id: self.vehicle_id.clone(),
            session_count: self.session_count,
        })
    }
}
