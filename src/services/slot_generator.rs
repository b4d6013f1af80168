use chrono::{Days, NaiveDate};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::models::calendar::WorkingCalendar;
use crate::models::session::{SessionRequest, SessionSlot};
use crate::services::schedule_utils;

/// Configuration for slot generation
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Number of days, counted from the joining date, the generator may walk
    pub horizon_days: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self { horizon_days: 365 }
    }
}

/// Non-fatal conditions carried alongside a successful schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ScheduleWarning {
    #[serde(rename_all = "camelCase")]
    UnderGenerated {
        requested: u32,
        generated: u32,
        horizon_end: NaiveDate,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedSchedule {
    pub slots: Vec<SessionSlot>,
    pub requested: u32,
    /// First date outside the search window.
    pub horizon_end: NaiveDate,
}

impl GeneratedSchedule {
    pub fn is_complete(&self) -> bool {
        self.slots.len() as u32 >= self.requested
    }

    pub fn shortfall(&self) -> u32 {
        self.requested.saturating_sub(self.slots.len() as u32)
    }

    pub fn warning(&self) -> Option<ScheduleWarning> {
        (!self.is_complete()).then(|| ScheduleWarning::UnderGenerated {
            requested: self.requested,
            generated: self.slots.len() as u32,
            horizon_end: self.horizon_end,
        })
    }
}

/// Walks the calendar day by day, one session per working day.
pub struct SlotGenerator;

impl SlotGenerator {
    pub fn generate(
        request: &SessionRequest,
        calendar: &WorkingCalendar,
        config: &GenerationConfig,
    ) -> AppResult<GeneratedSchedule> {
        let start_time = request.joining_time;
        let end_time = schedule_utils::end_time_for(start_time, request.duration_minutes)?;

        let hours = calendar.operating_hours();
        if !hours.contains(start_time, end_time) {
            return Err(AppError::validation_with_details(
                "session falls outside branch operating hours",
                json!({
                    "start": schedule_utils::format_wall_time(start_time),
                    "end": schedule_utils::format_wall_time(end_time),
                    "opensAt": schedule_utils::format_wall_time(hours.start),
                    "closesAt": schedule_utils::format_wall_time(hours.end),
                }),
            ));
        }

        let horizon_end = request
            .joining_date
            .checked_add_days(Days::new(u64::from(config.horizon_days)))
            .unwrap_or(NaiveDate::MAX);

        let mut slots = Vec::with_capacity(request.session_count.min(config.horizon_days) as usize);
        let mut day = Some(request.joining_date);

        while let Some(current) = day {
            if slots.len() as u32 >= request.session_count || current >= horizon_end {
                break;
            }

            if calendar.is_working_day(current) {
                slots.push(SessionSlot {
                    session_number: slots.len() as u32 + 1,
                    date: current,
                    start_time,
                    end_time,
                    vehicle_id: request.vehicle_id.clone(),
                    plan_id: request.plan_id.clone(),
                    client_id: request.client_id.clone(),
                });
            }

            day = current.succ_opt();
        }

        let schedule = GeneratedSchedule {
            slots,
            requested: request.session_count,
            horizon_end,
        };

        if schedule.is_complete() {
            debug!(
                target: "scheduler::generator",
                plan_id = %request.plan_id,
                count = schedule.slots.len(),
                "slots generated"
            );
        } else {
            warn!(
                target: "scheduler::generator",
                plan_id = %request.plan_id,
                requested = schedule.requested,
                generated = schedule.slots.len(),
                horizon_end = %schedule.horizon_end,
                "horizon exhausted before all sessions were placed"
            );
        }

        Ok(schedule)
    }
}
