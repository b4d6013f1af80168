use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::db::repositories::branch_calendar_repository::{
    BranchCalendarRepository, BranchCalendarRow,
};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::calendar::{BranchCalendarRecord, WorkingCalendar};

/// Branch working-calendar getter/setter. Calendars are validated on the
/// way in and on the way out, and cached once validated.
pub struct CalendarService {
    db: DbPool,
    cache: RwLock<HashMap<String, WorkingCalendar>>,
}

impl CalendarService {
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, branch_id: &str) -> AppResult<WorkingCalendar> {
        if let Ok(guard) = self.cache.read() {
            if let Some(calendar) = guard.get(branch_id) {
                return Ok(calendar.clone());
            }
        }

        let record = self.get_record(branch_id)?;
        let calendar = WorkingCalendar::from_record(&record)?;

        match self.cache.write() {
            Ok(mut guard) => {
                guard.insert(branch_id.to_string(), calendar.clone());
            }
            Err(_) => warn!(target: "scheduler::calendar", "calendar cache poisoned, skipping insert"),
        }

        debug!(target: "scheduler::calendar", branch_id, "calendar loaded");
        Ok(calendar)
    }

    pub fn get_record(&self, branch_id: &str) -> AppResult<BranchCalendarRecord> {
        let row = self
            .db
            .with_connection(|conn| BranchCalendarRepository::find(conn, branch_id))?;

        match row {
            Some(row) => row.into_record(),
            None => Err(AppError::configuration(format!(
                "no working calendar configured for branch {branch_id}"
            ))),
        }
    }

    pub fn upsert(&self, record: BranchCalendarRecord) -> AppResult<WorkingCalendar> {
        if record.branch_id.trim().is_empty() {
            return Err(AppError::validation("branch id must not be empty"));
        }

        let calendar = WorkingCalendar::from_record(&record)?;
        let normalized = calendar.to_record(&record.branch_id);
        let now = Utc::now().to_rfc3339();
        let row = BranchCalendarRow::from_record(&normalized, &now)?;

        self.db
            .with_connection(|conn| BranchCalendarRepository::upsert(conn, &row))?;

        match self.cache.write() {
            Ok(mut guard) => {
                guard.insert(record.branch_id.clone(), calendar.clone());
            }
            Err(_) => warn!(target: "scheduler::calendar", "calendar cache poisoned, skipping insert"),
        }

        info!(
            target: "scheduler::calendar",
            branch_id = %record.branch_id,
            working_days = ?normalized.working_days,
            opens = %normalized.operating_hours.start,
            closes = %normalized.operating_hours.end,
            holidays = normalized.holidays.len(),
            "branch calendar saved"
        );

        Ok(calendar)
    }

    pub fn branch_ids(&self) -> AppResult<Vec<String>> {
        self.db.with_connection(BranchCalendarRepository::list_branch_ids)
    }

    pub fn invalidate(&self, branch_id: &str) {
        if let Ok(mut guard) = self.cache.write() {
            guard.remove(branch_id);
        }
    }
}
