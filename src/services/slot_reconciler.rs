use std::collections::{HashMap, HashSet};

use chrono::{Days, NaiveDate, NaiveTime};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::calendar::{DateRange, WorkingCalendar};
use crate::models::session::{
    PlanTiming, SessionRecord, SessionRequest, SessionSlot, SessionStatus,
};
use crate::services::schedule_utils;
use crate::services::slot_generator::{GeneratedSchedule, GenerationConfig, ScheduleWarning};

/// Engine tunables. Branch calendars are passed separately.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub generation: GenerationConfig,
    /// Upper bound on alternatives offered per conflicting slot
    pub max_alternatives: usize,
    /// Step between candidate start times when searching the same day
    pub alternative_step_minutes: u32,
    /// How many days after a conflicting slot to look for a free day
    pub alternative_search_days: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            generation: GenerationConfig::default(),
            max_alternatives: 5,
            alternative_step_minutes: 30,
            alternative_search_days: 14,
        }
    }
}

/// Read access to sessions already booked on a vehicle.
pub trait VehicleBookings {
    fn sessions_for_vehicle(
        &self,
        vehicle_id: &str,
        range: Option<DateRange>,
    ) -> AppResult<Vec<SessionRecord>>;
}

impl VehicleBookings for [SessionRecord] {
    fn sessions_for_vehicle(
        &self,
        vehicle_id: &str,
        range: Option<DateRange>,
    ) -> AppResult<Vec<SessionRecord>> {
        let mut matches = Vec::new();
        for session in self.iter().filter(|s| s.vehicle_id == vehicle_id) {
            if let Some(range) = range {
                if !range.contains(session.date()?) {
                    continue;
                }
            }
            matches.push(session.clone());
        }
        Ok(matches)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReconcileKind {
    Create,
    Patch,
}

/// In-place rewrite of a not-yet-started session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPatch {
    pub session_id: String,
    pub session_number: u32,
    pub session_date: String,
    pub start_time: String,
    pub end_time: String,
    pub vehicle_id: String,
    pub status: SessionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcilePlan {
    pub kind: ReconcileKind,
    pub inserts: Vec<SessionSlot>,
    pub patches: Vec<SessionPatch>,
    /// Surplus sessions to soft-cancel after the session count shrank.
    pub cancellations: Vec<SessionRecord>,
    /// Session numbers left alone because they already started or ended.
    pub locked: Vec<u32>,
    pub warnings: Vec<ScheduleWarning>,
}

impl ReconcilePlan {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.patches.is_empty() && self.cancellations.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeSlot {
    pub session_date: String,
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotConflict {
    pub session_number: u32,
    pub vehicle_id: String,
    pub session_date: String,
    pub start_time: String,
    pub existing_session_id: String,
    pub existing_client_id: String,
    pub alternatives: Vec<AlternativeSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingConflict {
    pub plan_id: String,
    pub client_id: String,
    pub conflicts: Vec<SlotConflict>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileDecision {
    /// Timing fields did not change; the persisted series stands.
    Unchanged(Vec<SessionRecord>),
    Apply(ReconcilePlan),
    Conflict(SchedulingConflict),
}

/// A slot the reconciler intends to write, used for conflict checks.
struct PendingWrite {
    session_number: u32,
    date: NaiveDate,
    start_time: NaiveTime,
}

pub struct SlotReconciler<'a, B: VehicleBookings + ?Sized> {
    calendar: &'a WorkingCalendar,
    bookings: &'a B,
    config: &'a SchedulerConfig,
}

impl<'a, B: VehicleBookings + ?Sized> SlotReconciler<'a, B> {
    pub fn new(calendar: &'a WorkingCalendar, bookings: &'a B, config: &'a SchedulerConfig) -> Self {
        Self {
            calendar,
            bookings,
            config,
        }
    }

    /// Decides between create, patch-in-place and no-op for a plan.
    ///
    /// `previous` is the timing snapshot stored when the plan was last
    /// finalized and `existing` are the sessions persisted for the plan.
    pub fn reconcile(
        &self,
        request: &SessionRequest,
        previous: Option<&PlanTiming>,
        generated: &GeneratedSchedule,
        existing: &[SessionRecord],
    ) -> AppResult<ReconcileDecision> {
        let mut existing = existing.to_vec();
        existing.sort_by_key(|session| session.session_number);

        if !existing.is_empty() && previous == Some(&request.timing()) {
            debug!(
                target: "scheduler::reconcile",
                plan_id = %request.plan_id,
                "plan timing unchanged"
            );
            return Ok(ReconcileDecision::Unchanged(existing));
        }

        let plan = if existing.is_empty() {
            if previous.is_some() {
                warn!(
                    target: "scheduler::reconcile",
                    plan_id = %request.plan_id,
                    "finalized plan has no sessions, creating the series"
                );
            }
            self.plan_create(generated)
        } else {
            self.plan_patch(request, generated, &existing)
        };

        let conflicts = self.detect_conflicts(request, &plan, &existing)?;
        if !conflicts.is_empty() {
            warn!(
                target: "scheduler::reconcile",
                plan_id = %request.plan_id,
                vehicle_id = %request.vehicle_id,
                conflicts = conflicts.len(),
                "vehicle already booked for requested slots"
            );
            return Ok(ReconcileDecision::Conflict(SchedulingConflict {
                plan_id: request.plan_id.clone(),
                client_id: request.client_id.clone(),
                conflicts,
            }));
        }

        info!(
            target: "scheduler::reconcile",
            plan_id = %request.plan_id,
            kind = ?plan.kind,
            inserts = plan.inserts.len(),
            patches = plan.patches.len(),
            cancellations = plan.cancellations.len(),
            locked = plan.locked.len(),
            "reconciliation planned"
        );

        Ok(ReconcileDecision::Apply(plan))
    }

    fn plan_create(&self, generated: &GeneratedSchedule) -> ReconcilePlan {
        ReconcilePlan {
            kind: ReconcileKind::Create,
            inserts: generated.slots.clone(),
            patches: Vec::new(),
            cancellations: Vec::new(),
            locked: Vec::new(),
            warnings: generated.warning().into_iter().collect(),
        }
    }

    fn plan_patch(
        &self,
        request: &SessionRequest,
        generated: &GeneratedSchedule,
        existing: &[SessionRecord],
    ) -> ReconcilePlan {
        let by_number: HashMap<u32, &SessionRecord> = existing
            .iter()
            .map(|session| (session.session_number, session))
            .collect();

        let mut inserts = Vec::new();
        let mut patches = Vec::new();
        let mut locked = Vec::new();

        for slot in &generated.slots {
            let Some(session) = by_number.get(&slot.session_number) else {
                inserts.push(slot.clone());
                continue;
            };

            if !session.status.is_patchable() {
                locked.push(slot.session_number);
                continue;
            }

            let session_date = slot.session_date();
            let start_time = slot.start();
            let end_time = slot.end();
            let moved = !session.is_at(&session_date, &start_time);

            if !moved && session.end_time == end_time && session.vehicle_id == slot.vehicle_id {
                continue;
            }

            patches.push(SessionPatch {
                session_id: session.id.clone(),
                session_number: slot.session_number,
                session_date,
                start_time,
                end_time,
                vehicle_id: slot.vehicle_id.clone(),
                status: if moved {
                    SessionStatus::Rescheduled
                } else {
                    session.status
                },
            });
        }

        // Locked sessions past the generated range stay as history.
        locked.extend(
            existing
                .iter()
                .filter(|s| s.session_number > generated.slots.len() as u32)
                .filter(|s| !s.status.is_patchable())
                .map(|s| s.session_number),
        );

        // Open sessions the new series cannot place: surplus after a shrink, or
        // past the horizon when the edit under-generates.
        let placed = generated.slots.len() as u32;
        let cancellations: Vec<SessionRecord> = existing
            .iter()
            .filter(|s| s.session_number > placed && s.status.is_patchable())
            .cloned()
            .collect();

        if placed < request.session_count && !cancellations.is_empty() {
            warn!(
                target: "scheduler::reconcile",
                plan_id = %request.plan_id,
                placed,
                cancelled = cancellations.len(),
                "horizon exhausted, cancelling sessions that no longer fit"
            );
        }

        ReconcilePlan {
            kind: ReconcileKind::Patch,
            inserts,
            patches,
            cancellations,
            locked,
            warnings: generated.warning().into_iter().collect(),
        }
    }

    fn detect_conflicts(
        &self,
        request: &SessionRequest,
        plan: &ReconcilePlan,
        existing: &[SessionRecord],
    ) -> AppResult<Vec<SlotConflict>> {
        let mut writes = Vec::with_capacity(plan.inserts.len() + plan.patches.len());
        for slot in &plan.inserts {
            writes.push(PendingWrite {
                session_number: slot.session_number,
                date: slot.date,
                start_time: slot.start_time,
            });
        }
        for patch in &plan.patches {
            writes.push(PendingWrite {
                session_number: patch.session_number,
                date: schedule_utils::parse_calendar_date(&patch.session_date)?,
                start_time: schedule_utils::parse_wall_time(&patch.start_time)?,
            });
        }

        let (Some(first), Some(last)) = (
            writes.iter().map(|w| w.date).min(),
            writes.iter().map(|w| w.date).max(),
        ) else {
            return Ok(Vec::new());
        };

        let search_end = last
            .checked_add_days(Days::new(u64::from(self.config.alternative_search_days)))
            .unwrap_or(last);
        let bookings: Vec<SessionRecord> = self
            .bookings
            .sessions_for_vehicle(&request.vehicle_id, Some(DateRange::new(first, search_end)))?
            .into_iter()
            .filter(|booking| booking.status.occupies_slot())
            .collect();

        if bookings.is_empty() {
            return Ok(Vec::new());
        }

        // Our own rows that are about to move or be cancelled no longer hold their slot.
        let released: HashSet<&str> = plan
            .patches
            .iter()
            .map(|p| p.session_id.as_str())
            .chain(plan.cancellations.iter().map(|s| s.id.as_str()))
            .collect();
        let blocking: Vec<&SessionRecord> = bookings
            .iter()
            .filter(|booking| !released.contains(booking.id.as_str()))
            .collect();

        // Dates this client will hold after the write, one session per day.
        let mut held_dates: HashSet<NaiveDate> = writes.iter().map(|w| w.date).collect();
        for session in existing.iter().filter(|s| !released.contains(s.id.as_str())) {
            if session.status.occupies_slot() {
                if let Ok(date) = session.date() {
                    held_dates.insert(date);
                }
            }
        }

        let mut conflicts = Vec::new();
        for write in &writes {
            let session_date = schedule_utils::format_calendar_date(write.date);
            let start_time = schedule_utils::format_wall_time(write.start_time);

            // Includes this plan's own locked sessions.
            let Some(occupant) = blocking
                .iter()
                .find(|booking| booking.is_at(&session_date, &start_time))
            else {
                continue;
            };

            conflicts.push(SlotConflict {
                session_number: write.session_number,
                vehicle_id: request.vehicle_id.clone(),
                session_date,
                start_time,
                existing_session_id: occupant.id.clone(),
                existing_client_id: occupant.client_id.clone(),
                alternatives: self.alternatives_for(
                    write,
                    request.duration_minutes,
                    &blocking,
                    &held_dates,
                ),
            });
        }

        Ok(conflicts)
    }

    /// Free slots for the vehicle: other start times on the same date first,
    /// then the same start time on following working days.
    fn alternatives_for(
        &self,
        write: &PendingWrite,
        duration_minutes: u32,
        blocking: &[&SessionRecord],
        held_dates: &HashSet<NaiveDate>,
    ) -> Vec<AlternativeSlot> {
        let limit = self.config.max_alternatives;
        let mut alternatives = Vec::new();
        if limit == 0 {
            return alternatives;
        }

        let hours = self.calendar.operating_hours();
        let step = self.config.alternative_step_minutes.max(1);
        let day_start = schedule_utils::minutes_from_midnight(hours.start);
        let day_end = schedule_utils::minutes_from_midnight(hours.end);

        let mut minute = day_start;
        while minute + duration_minutes <= day_end && alternatives.len() < limit {
            let start = schedule_utils::to_naive_time(minute);
            let end = schedule_utils::to_naive_time(minute + duration_minutes);
            if start != write.start_time && is_free(blocking, write.date, start, end) {
                alternatives.push(alternative(write.date, start, end));
            }
            minute += step;
        }

        let (end, _) = schedule_utils::add_minutes(write.start_time, duration_minutes);
        for offset in 1..=u64::from(self.config.alternative_search_days) {
            if alternatives.len() >= limit {
                break;
            }
            let Some(day) = write.date.checked_add_days(Days::new(offset)) else {
                break;
            };
            if !self.calendar.is_working_day(day) || held_dates.contains(&day) {
                continue;
            }
            if is_free(blocking, day, write.start_time, end) {
                alternatives.push(alternative(day, write.start_time, end));
            }
        }

        alternatives
    }
}

fn is_free(blocking: &[&SessionRecord], date: NaiveDate, start: NaiveTime, end: NaiveTime) -> bool {
    let session_date = schedule_utils::format_calendar_date(date);
    !blocking.iter().any(|booking| {
        if booking.session_date != session_date {
            return false;
        }
        match (booking.start(), booking.end()) {
            (Ok(b_start), Ok(b_end)) => schedule_utils::overlaps(start, end, b_start, b_end),
            _ => {
                warn!(
                    target: "scheduler::reconcile",
                    session_id = %booking.id,
                    "booking has unparseable times, treating slot as taken"
                );
                true
            }
        }
    })
}

fn alternative(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> AlternativeSlot {
    AlternativeSlot {
        session_date: schedule_utils::format_calendar_date(date),
        start_time: schedule_utils::format_wall_time(start),
        end_time: schedule_utils::format_wall_time(end),
    }
}
