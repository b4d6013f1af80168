use chrono::NaiveDate;
use drivetrack_app_lib::db::repositories::session_repository::{SessionRepository, SessionRow};
use drivetrack_app_lib::db::DbPool;
use drivetrack_app_lib::error::AppError;
use drivetrack_app_lib::models::calendar::{BranchCalendarRecord, OperatingHoursRecord};
use drivetrack_app_lib::models::session::{SessionRecord, SessionRequestInput, SessionStatus};
use drivetrack_app_lib::services::slot_generator::{GenerationConfig, ScheduleWarning};
use drivetrack_app_lib::services::slot_reconciler::SchedulerConfig;
use drivetrack_app_lib::services::scheduling_service::ScheduleOutcome;
use drivetrack_app_lib::state::AppState;
use tempfile::{tempdir, TempDir};

const BRANCH: &str = "branch-1";

fn weekday_calendar() -> BranchCalendarRecord {
    BranchCalendarRecord {
        branch_id: BRANCH.into(),
        working_days: vec![1, 2, 3, 4, 5],
        operating_hours: OperatingHoursRecord {
            start: "07:00".into(),
            end: "19:00".into(),
        },
        holidays: Vec::new(),
        updated_at: None,
    }
}

fn setup_with(config: SchedulerConfig) -> (TempDir, AppState) {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("scheduling.sqlite")).expect("db pool");
    let state = AppState::new(pool, config);
    state
        .calendars()
        .upsert(weekday_calendar())
        .expect("save calendar");
    (dir, state)
}

fn setup() -> (TempDir, AppState) {
    setup_with(SchedulerConfig::default())
}

fn plan_input(client: &str, vehicle: &str, date: &str, time: &str, count: i64) -> SessionRequestInput {
    SessionRequestInput {
        client_id: client.into(),
        vehicle_id: vehicle.into(),
        plan_id: format!("plan-{client}"),
        joining_date: date.into(),
        joining_time: time.into(),
        session_count: count,
        duration_minutes: 30,
    }
}

fn dates(sessions: &[SessionRecord]) -> Vec<&str> {
    sessions.iter().map(|s| s.session_date.as_str()).collect()
}

#[test]
fn saturday_enrollment_creates_sessions_from_monday() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();

    // 2025-01-04 is a Saturday
    let outcome = scheduling
        .finalize_plan(BRANCH, &plan_input("alice", "car-1", "2025-01-04", "09:00", 3))
        .expect("finalize plan");

    match &outcome {
        ScheduleOutcome::Created { sessions, warnings } => {
            assert_eq!(dates(sessions), vec!["2025-01-06", "2025-01-07", "2025-01-08"]);
            assert!(warnings.is_empty());
            for (index, session) in sessions.iter().enumerate() {
                assert_eq!(session.session_number, index as u32 + 1);
                assert_eq!(session.start_time, "09:00");
                assert_eq!(session.end_time, "09:30");
                assert_eq!(session.status, SessionStatus::Scheduled);
                assert_eq!(session.vehicle_id, "car-1");
            }
        }
        other => panic!("expected created, got {other:?}"),
    }

    let json = serde_json::to_value(&outcome).expect("serialize outcome");
    assert_eq!(json["outcome"], "created");
    assert_eq!(json["sessions"][0]["sessionDate"], "2025-01-06");
    assert_eq!(json["sessions"][0]["status"], "SCHEDULED");

    let plan = scheduling.get_plan("plan-alice").expect("plan snapshot");
    assert_eq!(plan.joining_date, "2025-01-04");
    assert_eq!(plan.session_count, 3);
}

#[test]
fn resubmitting_an_unchanged_plan_is_idempotent() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();
    let input = plan_input("alice", "car-1", "2025-01-06", "09:00", 5);

    let first = scheduling.finalize_plan(BRANCH, &input).expect("first finalize");
    let second = scheduling.finalize_plan(BRANCH, &input).expect("second finalize");

    match second {
        ScheduleOutcome::Unchanged { sessions } => {
            assert_eq!(sessions, first.sessions().to_vec());
        }
        other => panic!("expected unchanged, got {other:?}"),
    }

    // A date-time joining value on the same day normalizes to the same plan
    let mut same_day = input.clone();
    same_day.joining_date = "2025-01-06T18:30:00.000Z".into();
    let third = scheduling.finalize_plan(BRANCH, &same_day).expect("third finalize");
    assert!(matches!(third, ScheduleOutcome::Unchanged { .. }));

    assert_eq!(scheduling.list_sessions("plan-alice").expect("list").len(), 5);
}

#[test]
fn second_client_on_the_same_vehicle_slot_is_rejected() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();

    scheduling
        .finalize_plan(BRANCH, &plan_input("bob", "car-1", "2025-01-06", "09:00", 3))
        .expect("bob's plan");

    let outcome = scheduling
        .finalize_plan(BRANCH, &plan_input("alice", "car-1", "2025-01-08", "09:00", 2))
        .expect("alice's plan");

    let conflict = match outcome {
        ScheduleOutcome::Conflict(conflict) => conflict,
        other => panic!("expected conflict, got {other:?}"),
    };
    assert_eq!(conflict.conflicts.len(), 1);
    let slot = &conflict.conflicts[0];
    assert_eq!(slot.session_date, "2025-01-08");
    assert_eq!(slot.start_time, "09:00");
    assert_eq!(slot.existing_client_id, "bob");
    assert!(!slot.alternatives.is_empty());
    assert!(slot.alternatives.len() <= scheduling.config().max_alternatives);

    // Nothing was written for alice
    assert!(scheduling.list_sessions("plan-alice").expect("list").is_empty());
    assert!(matches!(
        scheduling.get_plan("plan-alice"),
        Err(AppError::NotFound)
    ));

    // Taking an offered alternative time succeeds
    let alternative = &slot.alternatives[0];
    let outcome = scheduling
        .finalize_plan(
            BRANCH,
            &plan_input("alice", "car-1", "2025-01-08", &alternative.start_time, 2),
        )
        .expect("alice on alternative");
    assert!(matches!(outcome, ScheduleOutcome::Created { .. }));

    // A different vehicle at the original time is fine as well
    let outcome = scheduling
        .finalize_plan(BRANCH, &plan_input("carol", "car-2", "2025-01-08", "09:00", 2))
        .expect("carol on another car");
    assert!(matches!(outcome, ScheduleOutcome::Created { .. }));
}

#[test]
fn database_rejects_double_booking_that_bypasses_the_precheck() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();

    let outcome = scheduling
        .finalize_plan(BRANCH, &plan_input("bob", "car-1", "2025-01-06", "09:00", 1))
        .expect("bob's plan");
    let mut intruder = outcome.sessions()[0].clone();
    intruder.id = "intruder".into();
    intruder.plan_id = "plan-carol".into();
    intruder.client_id = "carol".into();

    let result = state
        .db()
        .with_connection(|conn| SessionRepository::insert(conn, &SessionRow::from_record(&intruder)));
    assert!(matches!(result, Err(AppError::Conflict { .. })));

    // Once bob's session is cancelled the slot is free again
    scheduling
        .update_status(&outcome.sessions()[0].id, SessionStatus::Cancelled)
        .expect("cancel");
    state
        .db()
        .with_connection(|conn| SessionRepository::insert(conn, &SessionRow::from_record(&intruder)))
        .expect("slot released");
}

#[test]
fn exhausted_horizon_returns_short_series_with_warning() {
    let config = SchedulerConfig {
        generation: GenerationConfig { horizon_days: 7 },
        ..SchedulerConfig::default()
    };
    let (_dir, state) = setup_with(config);

    let outcome = state
        .scheduling()
        .finalize_plan(BRANCH, &plan_input("alice", "car-1", "2025-01-06", "09:00", 10))
        .expect("finalize plan");

    assert_eq!(outcome.sessions().len(), 5);
    assert_eq!(
        outcome.warnings(),
        &[ScheduleWarning::UnderGenerated {
            requested: 10,
            generated: 5,
            horizon_end: NaiveDate::from_ymd_opt(2025, 1, 13).unwrap(),
        }]
    );
}

#[test]
fn configuration_and_input_errors_fail_fast() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();

    let missing = scheduling.finalize_plan("branch-x", &plan_input("alice", "car-1", "2025-01-06", "09:00", 3));
    assert!(matches!(missing, Err(AppError::Configuration { .. })));

    let too_early = scheduling.finalize_plan(BRANCH, &plan_input("alice", "car-1", "2025-01-06", "06:30", 3));
    assert!(matches!(too_early, Err(AppError::Validation { .. })));

    let bad_date = scheduling.finalize_plan(BRANCH, &plan_input("alice", "car-1", "06/01/2025", "09:00", 3));
    assert!(matches!(bad_date, Err(AppError::Validation { .. })));

    let no_sessions = scheduling.finalize_plan(BRANCH, &plan_input("alice", "car-1", "2025-01-06", "09:00", 0));
    assert!(matches!(no_sessions, Err(AppError::Validation { .. })));

    assert!(scheduling.list_sessions("plan-alice").expect("list").is_empty());
}

#[test]
fn oversized_inputs_degrade_or_fail_cleanly() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();

    let mut endless = plan_input("alice", "car-1", "2025-01-06", "09:00", i64::from(u32::MAX));
    let preview = scheduling.preview_slots(BRANCH, &endless).expect("preview");
    assert!(preview.slots.len() < 366);
    assert!(matches!(
        preview.warning(),
        Some(ScheduleWarning::UnderGenerated { requested: u32::MAX, .. })
    ));

    endless.duration_minutes = i64::from(u32::MAX);
    let result = scheduling.preview_slots(BRANCH, &endless);
    assert!(matches!(result, Err(AppError::Validation { .. })));

    let mut all_day = plan_input("alice", "car-1", "2025-01-06", "09:00", 3);
    all_day.duration_minutes = 24 * 60;
    let result = scheduling.finalize_plan(BRANCH, &all_day);
    assert!(matches!(result, Err(AppError::Validation { .. })));
}

#[test]
fn client_plans_lists_every_finalized_plan() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();

    let mut theory = plan_input("alice", "car-1", "2025-01-06", "09:00", 2);
    theory.plan_id = "plan-alice-manual".into();
    scheduling.finalize_plan(BRANCH, &theory).expect("manual plan");
    let mut auto = plan_input("alice", "car-2", "2025-01-06", "09:00", 2);
    auto.plan_id = "plan-alice-auto".into();
    scheduling.finalize_plan(BRANCH, &auto).expect("automatic plan");
    scheduling
        .finalize_plan(BRANCH, &plan_input("bob", "car-3", "2025-01-06", "09:00", 2))
        .expect("bob's plan");

    let mut ids: Vec<String> = scheduling
        .client_plans("alice")
        .expect("alice's plans")
        .into_iter()
        .map(|plan| plan.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["plan-alice-auto", "plan-alice-manual"]);
    assert!(scheduling.client_plans("nobody").expect("no plans").is_empty());
}

#[test]
fn preview_does_not_persist() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();

    let preview = scheduling
        .preview_slots(BRANCH, &plan_input("alice", "car-1", "2025-01-06", "09:00", 21))
        .expect("preview");
    assert_eq!(preview.slots.len(), 21);
    assert_eq!(preview.slots[20].session_date(), "2025-02-03");
    assert!(scheduling.list_sessions("plan-alice").expect("list").is_empty());
}

#[test]
fn status_transitions_follow_session_lifecycle() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();

    let outcome = scheduling
        .finalize_plan(BRANCH, &plan_input("alice", "car-1", "2025-01-06", "09:00", 2))
        .expect("finalize plan");
    let first = &outcome.sessions()[0];

    let started = scheduling
        .update_status(&first.id, SessionStatus::InProgress)
        .expect("start");
    assert_eq!(started.status, SessionStatus::InProgress);

    let done = scheduling
        .update_status(&first.id, SessionStatus::Completed)
        .expect("complete");
    assert_eq!(done.status, SessionStatus::Completed);

    let reopened = scheduling.update_status(&first.id, SessionStatus::Scheduled);
    assert!(matches!(reopened, Err(AppError::Validation { .. })));

    let missing = scheduling.update_status("no-such-session", SessionStatus::Completed);
    assert!(matches!(missing, Err(AppError::NotFound)));

    let agenda = scheduling
        .daily_agenda(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap())
        .expect("agenda");
    assert_eq!(agenda.len(), 1);
    assert_eq!(agenda[0].status, SessionStatus::Completed);
}
