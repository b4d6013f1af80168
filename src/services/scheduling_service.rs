use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::db::repositories::plan_repository::{PlanRepository, PlanRow};
use crate::db::repositories::session_repository::{
    into_records, ConnectionBookings, SessionRepository, SessionRow,
};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::calendar::DateRange;
use crate::models::session::{
    PlanRecord, SessionRecord, SessionRequest, SessionRequestInput, SessionStatus,
};
use crate::services::calendar_service::CalendarService;
use crate::services::schedule_utils;
use crate::services::slot_generator::{GeneratedSchedule, ScheduleWarning, SlotGenerator};
use crate::services::slot_reconciler::{
    ReconcileDecision, ReconcileKind, ReconcilePlan, SchedulerConfig, SchedulingConflict,
    SlotReconciler,
};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ScheduleOutcome {
    #[serde(rename_all = "camelCase")]
    Created {
        sessions: Vec<SessionRecord>,
        warnings: Vec<ScheduleWarning>,
    },
    #[serde(rename_all = "camelCase")]
    Updated {
        sessions: Vec<SessionRecord>,
        created: Vec<u32>,
        patched: Vec<u32>,
        cancelled: Vec<u32>,
        locked: Vec<u32>,
        warnings: Vec<ScheduleWarning>,
    },
    #[serde(rename_all = "camelCase")]
    Unchanged { sessions: Vec<SessionRecord> },
    Conflict(SchedulingConflict),
}

impl ScheduleOutcome {
    pub fn sessions(&self) -> &[SessionRecord] {
        match self {
            ScheduleOutcome::Created { sessions, .. }
            | ScheduleOutcome::Updated { sessions, .. }
            | ScheduleOutcome::Unchanged { sessions } => sessions,
            ScheduleOutcome::Conflict(_) => &[],
        }
    }

    pub fn warnings(&self) -> &[ScheduleWarning] {
        match self {
            ScheduleOutcome::Created { warnings, .. }
            | ScheduleOutcome::Updated { warnings, .. } => warnings,
            _ => &[],
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ScheduleOutcome::Conflict(_))
    }
}

/// Plan finalization and session lifecycle, backed by SQLite.
///
/// `finalize_plan` is the only path that creates or rewrites sessions, so
/// every finalized plan leaves its series persisted.
#[derive(Clone)]
pub struct SchedulingService {
    db: DbPool,
    calendars: Arc<CalendarService>,
    config: SchedulerConfig,
}

impl SchedulingService {
    pub fn new(db: DbPool, calendars: Arc<CalendarService>, config: SchedulerConfig) -> Self {
        Self {
            db,
            calendars,
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Generates the series for a plan without touching storage.
    pub fn preview_slots(
        &self,
        branch_id: &str,
        input: &SessionRequestInput,
    ) -> AppResult<GeneratedSchedule> {
        let request = SessionRequest::from_input(input)?;
        let calendar = self.calendars.get(branch_id)?;
        SlotGenerator::generate(&request, &calendar, &self.config.generation)
    }

    pub fn finalize_plan(
        &self,
        branch_id: &str,
        input: &SessionRequestInput,
    ) -> AppResult<ScheduleOutcome> {
        let request = SessionRequest::from_input(input)?;
        let calendar = self.calendars.get(branch_id)?;
        let generated = SlotGenerator::generate(&request, &calendar, &self.config.generation)?;

        info!(
            target: "scheduler::service",
            branch_id,
            plan_id = %request.plan_id,
            client_id = %request.client_id,
            vehicle_id = %request.vehicle_id,
            requested = request.session_count,
            generated = generated.slots.len(),
            "finalizing plan"
        );

        let mut conn = self.db.get_connection()?;
        let tx = conn.transaction()?;

        let plan_row = PlanRepository::find_by_id(&tx, &request.plan_id)?;
        let previous = match plan_row {
            Some(row) => {
                let record = row.into_record()?;
                if record.client_id != request.client_id {
                    return Err(AppError::validation_with_details(
                        "plan belongs to a different client",
                        json!({"planId": record.id, "clientId": request.client_id}),
                    ));
                }
                Some(record)
            }
            None => None,
        };
        let previous_timing = previous.as_ref().map(PlanRecord::timing).transpose()?;

        let existing = into_records(SessionRepository::list_for_plan(&tx, &request.plan_id)?)?;

        let decision = {
            let bookings = ConnectionBookings::new(&tx);
            SlotReconciler::new(&calendar, &bookings, &self.config).reconcile(
                &request,
                previous_timing.as_ref(),
                &generated,
                &existing,
            )?
        };

        let plan = match decision {
            ReconcileDecision::Unchanged(sessions) => {
                debug!(target: "scheduler::service", plan_id = %request.plan_id, "plan unchanged");
                return Ok(ScheduleOutcome::Unchanged { sessions });
            }
            ReconcileDecision::Conflict(conflict) => {
                return Ok(ScheduleOutcome::Conflict(conflict));
            }
            ReconcileDecision::Apply(plan) => plan,
        };

        let now = Utc::now().to_rfc3339();
        apply_plan(&tx, &plan, &now)?;

        let mut plan_record = PlanRecord::from_request(&request, branch_id, &now);
        if let Some(previous) = &previous {
            plan_record.created_at = previous.created_at.clone();
        }
        PlanRepository::upsert(&tx, &PlanRow::from_record(&plan_record))?;

        tx.commit()?;

        let sessions = into_records(SessionRepository::list_for_plan(&conn, &request.plan_id)?)?;

        for warning in &plan.warnings {
            warn!(target: "scheduler::service", plan_id = %request.plan_id, ?warning, "plan finalized with warning");
        }

        let outcome = match plan.kind {
            ReconcileKind::Create => ScheduleOutcome::Created {
                sessions,
                warnings: plan.warnings,
            },
            ReconcileKind::Patch => ScheduleOutcome::Updated {
                sessions,
                created: plan.inserts.iter().map(|s| s.session_number).collect(),
                patched: plan.patches.iter().map(|p| p.session_number).collect(),
                cancelled: plan.cancellations.iter().map(|s| s.session_number).collect(),
                locked: plan.locked,
                warnings: plan.warnings,
            },
        };

        info!(
            target: "scheduler::service",
            plan_id = %request.plan_id,
            sessions = outcome.sessions().len(),
            "plan finalized"
        );

        Ok(outcome)
    }

    pub fn list_sessions(&self, plan_id: &str) -> AppResult<Vec<SessionRecord>> {
        self.db
            .with_connection(|conn| into_records(SessionRepository::list_for_plan(conn, plan_id)?))
    }

    pub fn get_session(&self, session_id: &str) -> AppResult<SessionRecord> {
        self.db.with_connection(|conn| {
            SessionRepository::find_by_id(conn, session_id)?
                .ok_or_else(AppError::not_found)?
                .into_record()
        })
    }

    pub fn get_plan(&self, plan_id: &str) -> AppResult<PlanRecord> {
        self.db.with_connection(|conn| {
            PlanRepository::find_by_id(conn, plan_id)?
                .ok_or_else(AppError::not_found)?
                .into_record()
        })
    }

    /// Every plan finalized for a client, newest first.
    pub fn client_plans(&self, client_id: &str) -> AppResult<Vec<PlanRecord>> {
        self.db.with_connection(|conn| {
            PlanRepository::list_for_client(conn, client_id)?
                .into_iter()
                .map(PlanRow::into_record)
                .collect()
        })
    }

    pub fn vehicle_schedule(
        &self,
        vehicle_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> AppResult<Vec<SessionRecord>> {
        self.db.with_connection(|conn| {
            into_records(SessionRepository::list_for_vehicle(
                conn,
                vehicle_id,
                Some(DateRange::new(from, to)),
            )?)
        })
    }

    /// All sessions on a date across vehicles, for the daily notification scan.
    pub fn daily_agenda(&self, date: NaiveDate) -> AppResult<Vec<SessionRecord>> {
        let session_date = schedule_utils::format_calendar_date(date);
        self.db
            .with_connection(|conn| into_records(SessionRepository::list_for_date(conn, &session_date)?))
    }

    pub fn update_status(&self, session_id: &str, status: SessionStatus) -> AppResult<SessionRecord> {
        self.db.with_transaction(|tx| {
            let current = SessionRepository::find_by_id(tx, session_id)?
                .ok_or_else(AppError::not_found)?
                .into_record()?;

            if current.status == status {
                return Ok(current);
            }
            if !current.status.can_transition_to(status) {
                return Err(AppError::validation_with_details(
                    "session status transition not allowed",
                    json!({
                        "sessionId": session_id,
                        "from": current.status.as_str(),
                        "to": status.as_str(),
                    }),
                ));
            }

            let now = Utc::now().to_rfc3339();
            SessionRepository::update_status(tx, session_id, status, &now)?;

            info!(
                target: "scheduler::service",
                session_id,
                from = %current.status,
                to = %status,
                "session status updated"
            );

            SessionRepository::find_by_id(tx, session_id)?
                .ok_or_else(AppError::not_found)?
                .into_record()
        })
    }
}

/// Writes a reconciliation plan. Patched rows are staged first so the
/// vehicle-slot index only sees final positions.
fn apply_plan(conn: &Connection, plan: &ReconcilePlan, now: &str) -> AppResult<()> {
    for patch in &plan.patches {
        SessionRepository::stage(conn, &patch.session_id)?;
    }
    for patch in &plan.patches {
        SessionRepository::apply_patch(conn, patch, now)?;
    }
    for session in &plan.cancellations {
        SessionRepository::update_status(conn, &session.id, SessionStatus::Cancelled, now)?;
    }
    for slot in &plan.inserts {
        let record = SessionRecord::from_slot(slot, now);
        SessionRepository::insert(conn, &SessionRow::from_record(&record))?;
    }

    debug!(
        target: "scheduler::service",
        inserts = plan.inserts.len(),
        patches = plan.patches.len(),
        cancellations = plan.cancellations.len(),
        "reconciliation applied"
    );

    Ok(())
}
