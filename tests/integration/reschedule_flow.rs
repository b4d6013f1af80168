use chrono::NaiveDate;
use drivetrack_app_lib::db::DbPool;
use drivetrack_app_lib::error::AppError;
use drivetrack_app_lib::models::calendar::{BranchCalendarRecord, OperatingHoursRecord};
use drivetrack_app_lib::models::session::{SessionRecord, SessionRequestInput, SessionStatus};
use drivetrack_app_lib::services::scheduling_service::{ScheduleOutcome, SchedulingService};
use drivetrack_app_lib::services::slot_reconciler::SchedulerConfig;
use drivetrack_app_lib::state::AppState;
use tempfile::{tempdir, TempDir};

const BRANCH: &str = "branch-1";

fn setup() -> (TempDir, AppState) {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("reschedule.sqlite")).expect("db pool");
    let state = AppState::new(pool, SchedulerConfig::default());
    state
        .calendars()
        .upsert(BranchCalendarRecord {
            branch_id: BRANCH.into(),
            working_days: vec![1, 2, 3, 4, 5],
            operating_hours: OperatingHoursRecord {
                start: "07:00".into(),
                end: "19:00".into(),
            },
            holidays: Vec::new(),
            updated_at: None,
        })
        .expect("save calendar");
    (dir, state)
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

fn finalize(scheduling: &SchedulingService, input: &SessionRequestInput) -> ScheduleOutcome {
    scheduling.finalize_plan(BRANCH, input).expect("finalize plan")
}

fn session(sessions: &[SessionRecord], number: u32) -> &SessionRecord {
    sessions
        .iter()
        .find(|s| s.session_number == number)
        .unwrap_or_else(|| panic!("session #{number} missing"))
}

#[test]
fn vehicle_change_patches_sessions_in_place() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();

    let input = plan_input("alice", "car-1", "2025-01-06", "09:00", 10);
    let first = finalize(&scheduling, &input);
    let original_ids: Vec<String> = first.sessions().iter().map(|s| s.id.clone()).collect();

    let mut edited = input.clone();
    edited.vehicle_id = "car-2".into();
    let outcome = finalize(&scheduling, &edited);

    match &outcome {
        ScheduleOutcome::Updated {
            sessions,
            created,
            patched,
            cancelled,
            locked,
            ..
        } => {
            assert!(created.is_empty());
            assert!(cancelled.is_empty());
            assert!(locked.is_empty());
            assert_eq!(patched, &(1..=10).collect::<Vec<u32>>());
            for (record, original) in sessions.iter().zip(created_dates()) {
                assert_eq!(record.vehicle_id, "car-2");
                assert_eq!(record.session_date, original);
                assert_eq!(record.start_time, "09:00");
                // Same slot, different car: not a reschedule
                assert_eq!(record.status, SessionStatus::Scheduled);
            }
            let ids: Vec<String> = sessions.iter().map(|s| s.id.clone()).collect();
            assert_eq!(ids, original_ids);
        }
        other => panic!("expected update, got {other:?}"),
    }

    let old_car = scheduling
        .vehicle_schedule(
            "car-1",
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 2, 28).unwrap(),
        )
        .expect("car-1 schedule");
    assert!(old_car.is_empty());

    let plan = scheduling.get_plan("plan-alice").expect("plan");
    assert_eq!(plan.vehicle_id, "car-2");
}

fn created_dates() -> Vec<&'static str> {
    vec![
        "2025-01-06", "2025-01-07", "2025-01-08", "2025-01-09", "2025-01-10",
        "2025-01-13", "2025-01-14", "2025-01-15", "2025-01-16", "2025-01-17",
    ]
}

#[test]
fn joining_date_change_leaves_completed_sessions_alone() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();

    let input = plan_input("alice", "car-1", "2025-01-06", "09:00", 10);
    let created = finalize(&scheduling, &input);
    let first_id = session(created.sessions(), 1).id.clone();
    scheduling
        .update_status(&first_id, SessionStatus::Completed)
        .expect("complete #1");

    let mut edited = input.clone();
    edited.joining_date = "2025-01-13".into();
    let outcome = finalize(&scheduling, &edited);

    let ScheduleOutcome::Updated {
        sessions,
        patched,
        locked,
        created,
        ..
    } = outcome
    else {
        panic!("expected update");
    };

    assert_eq!(locked, vec![1]);
    assert!(created.is_empty());
    assert_eq!(patched, (2..=10).collect::<Vec<u32>>());

    let first = session(&sessions, 1);
    assert_eq!(first.status, SessionStatus::Completed);
    assert_eq!(first.session_date, "2025-01-06");

    let second = session(&sessions, 2);
    assert_eq!(second.session_date, "2025-01-14");
    assert_eq!(second.status, SessionStatus::Rescheduled);

    assert_eq!(session(&sessions, 10).session_date, "2025-01-24");
}

#[test]
fn moving_onto_a_completed_session_of_the_same_plan_is_a_conflict() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();

    let input = plan_input("alice", "car-1", "2025-01-06", "09:00", 5);
    let created = finalize(&scheduling, &input);
    let first_id = session(created.sessions(), 1).id.clone();
    scheduling
        .update_status(&first_id, SessionStatus::Completed)
        .expect("complete #1");
    let before = scheduling.list_sessions("plan-alice").expect("list");

    // Friday start puts #2 on Monday 09:00, which completed #1 still holds
    let mut edited = input.clone();
    edited.joining_date = "2025-01-03".into();
    let outcome = finalize(&scheduling, &edited);

    let ScheduleOutcome::Conflict(conflict) = outcome else {
        panic!("expected conflict");
    };
    assert_eq!(conflict.conflicts.len(), 1);
    let slot = &conflict.conflicts[0];
    assert_eq!(slot.session_number, 2);
    assert_eq!(slot.session_date, "2025-01-06");
    assert_eq!(slot.existing_session_id, first_id);
    assert!(!slot.alternatives.is_empty());
    assert_eq!(scheduling.list_sessions("plan-alice").expect("list"), before);

    // Same edit at a free time goes through
    edited.joining_time = "10:00".into();
    let outcome = finalize(&scheduling, &edited);
    let ScheduleOutcome::Updated {
        sessions, locked, ..
    } = outcome
    else {
        panic!("expected update");
    };
    assert_eq!(locked, vec![1]);
    assert_eq!(session(&sessions, 2).session_date, "2025-01-06");
    assert_eq!(session(&sessions, 2).start_time, "10:00");
}

#[test]
fn shifting_by_one_day_moves_sessions_onto_each_others_slots() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();

    let input = plan_input("alice", "car-1", "2025-01-06", "09:00", 5);
    finalize(&scheduling, &input);

    let mut edited = input.clone();
    edited.joining_date = "2025-01-07".into();
    let outcome = finalize(&scheduling, &edited);

    assert!(matches!(outcome, ScheduleOutcome::Updated { .. }));
    let dates: Vec<&str> = outcome
        .sessions()
        .iter()
        .map(|s| s.session_date.as_str())
        .collect();
    assert_eq!(
        dates,
        vec!["2025-01-07", "2025-01-08", "2025-01-09", "2025-01-10", "2025-01-13"]
    );
    assert!(outcome
        .sessions()
        .iter()
        .all(|s| s.status == SessionStatus::Rescheduled));

    // Re-submitting the edited plan is a no-op
    assert!(matches!(
        finalize(&scheduling, &edited),
        ScheduleOutcome::Unchanged { .. }
    ));
}

#[test]
fn shrinking_cancels_surplus_and_growing_inserts() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();

    let input = plan_input("alice", "car-1", "2025-01-06", "09:00", 5);
    finalize(&scheduling, &input);

    let mut shrunk = input.clone();
    shrunk.session_count = 3;
    let outcome = finalize(&scheduling, &shrunk);
    let ScheduleOutcome::Updated {
        sessions,
        cancelled,
        patched,
        ..
    } = outcome
    else {
        panic!("expected update");
    };
    assert_eq!(cancelled, vec![4, 5]);
    assert!(patched.is_empty());
    // Cancelled rows are kept, never deleted
    assert_eq!(sessions.len(), 5);
    assert_eq!(session(&sessions, 4).status, SessionStatus::Cancelled);
    assert_eq!(session(&sessions, 3).status, SessionStatus::Scheduled);

    let mut longer = plan_input("bob", "car-2", "2025-01-06", "10:00", 2);
    finalize(&scheduling, &longer);
    longer.session_count = 4;
    let outcome = finalize(&scheduling, &longer);
    let ScheduleOutcome::Updated {
        sessions, created, ..
    } = outcome
    else {
        panic!("expected update");
    };
    assert_eq!(created, vec![3, 4]);
    assert_eq!(session(&sessions, 4).session_date, "2025-01-09");
    assert_eq!(session(&sessions, 4).status, SessionStatus::Scheduled);
}

#[test]
fn edit_into_another_clients_slot_writes_nothing() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();

    finalize(&scheduling, &plan_input("bob", "car-1", "2025-01-06", "10:00", 5));
    let input = plan_input("alice", "car-1", "2025-01-06", "09:00", 5);
    let before = finalize(&scheduling, &input).sessions().to_vec();

    let mut edited = input.clone();
    edited.joining_time = "10:00".into();
    let outcome = finalize(&scheduling, &edited);

    let ScheduleOutcome::Conflict(conflict) = outcome else {
        panic!("expected conflict");
    };
    assert_eq!(conflict.conflicts.len(), 5);
    assert!(conflict
        .conflicts
        .iter()
        .all(|c| c.existing_client_id == "bob"));

    assert_eq!(scheduling.list_sessions("plan-alice").expect("list"), before);
    assert_eq!(scheduling.get_plan("plan-alice").expect("plan").joining_time, "09:00");
}

#[test]
fn plan_id_cannot_be_taken_over_by_another_client() {
    let (_dir, state) = setup();
    let scheduling = state.scheduling();

    finalize(&scheduling, &plan_input("alice", "car-1", "2025-01-06", "09:00", 2));

    let mut hijack = plan_input("mallory", "car-1", "2025-01-06", "11:00", 2);
    hijack.plan_id = "plan-alice".into();
    let result = scheduling.finalize_plan(BRANCH, &hijack);
    assert!(matches!(result, Err(AppError::Validation { .. })));
}
