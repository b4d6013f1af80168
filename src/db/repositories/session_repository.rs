use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::calendar::DateRange;
use crate::models::session::{SessionRecord, SessionStatus};
use crate::services::schedule_utils;
use crate::services::slot_reconciler::{SessionPatch, VehicleBookings};

const BASE_SELECT: &str = r#"
    SELECT
        id,
        plan_id,
        client_id,
        vehicle_id,
        session_number,
        session_date,
        start_time,
        end_time,
        status,
        created_at,
        updated_at
    FROM sessions
"#;

#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub plan_id: String,
    pub client_id: String,
    pub vehicle_id: String,
    pub session_number: i64,
    pub session_date: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl SessionRow {
    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            id: record.id.clone(),
            plan_id: record.plan_id.clone(),
            client_id: record.client_id.clone(),
            vehicle_id: record.vehicle_id.clone(),
            session_number: i64::from(record.session_number),
            session_date: record.session_date.clone(),
            start_time: record.start_time.clone(),
            end_time: record.end_time.clone(),
            status: record.status.as_str().to_string(),
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> AppResult<SessionRecord> {
        let session_number = u32::try_from(self.session_number).map_err(|_| {
            AppError::database(format!(
                "session {} has invalid number {}",
                self.id, self.session_number
            ))
        })?;

        Ok(SessionRecord {
            status: self.status.parse::<SessionStatus>()?,
            id: self.id,
            plan_id: self.plan_id,
            client_id: self.client_id,
            vehicle_id: self.vehicle_id,
            session_number,
            session_date: self.session_date,
            start_time: self.start_time,
            end_time: self.end_time,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<&Row<'_>> for SessionRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(SessionRow {
            id: row.get("id")?,
            plan_id: row.get("plan_id")?,
            client_id: row.get("client_id")?,
            vehicle_id: row.get("vehicle_id")?,
            session_number: row.get("session_number")?,
            session_date: row.get("session_date")?,
            start_time: row.get("start_time")?,
            end_time: row.get("end_time")?,
            status: row.get("status")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct SessionRepository;

impl SessionRepository {
    pub fn insert(conn: &Connection, row: &SessionRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO sessions (
                    id,
                    plan_id,
                    client_id,
                    vehicle_id,
                    session_number,
                    session_date,
                    start_time,
                    end_time,
                    status,
                    staged,
                    created_at,
                    updated_at
                ) VALUES (
                    :id,
                    :plan_id,
                    :client_id,
                    :vehicle_id,
                    :session_number,
                    :session_date,
                    :start_time,
                    :end_time,
                    :status,
                    0,
                    :created_at,
                    :updated_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":plan_id": &row.plan_id,
                ":client_id": &row.client_id,
                ":vehicle_id": &row.vehicle_id,
                ":session_number": row.session_number,
                ":session_date": &row.session_date,
                ":start_time": &row.start_time,
                ":end_time": &row.end_time,
                ":status": &row.status,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;

        Ok(())
    }

    /// Takes the row out of the vehicle-slot index until its patch is written.
    pub fn stage(conn: &Connection, id: &str) -> AppResult<()> {
        let affected = conn.execute("UPDATE sessions SET staged = 1 WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(AppError::not_found());
        }
        Ok(())
    }

    pub fn apply_patch(conn: &Connection, patch: &SessionPatch, updated_at: &str) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE sessions SET
                    vehicle_id = :vehicle_id,
                    session_date = :session_date,
                    start_time = :start_time,
                    end_time = :end_time,
                    status = :status,
                    staged = 0,
                    updated_at = :updated_at
                WHERE id = :id
                  AND status IN ('SCHEDULED', 'RESCHEDULED')
            "#,
            named_params! {
                ":id": &patch.session_id,
                ":vehicle_id": &patch.vehicle_id,
                ":session_date": &patch.session_date,
                ":start_time": &patch.start_time,
                ":end_time": &patch.end_time,
                ":status": patch.status.as_str(),
                ":updated_at": updated_at,
            },
        )?;

        if affected == 0 {
            return Err(AppError::conflict(format!(
                "session {} is no longer open for rescheduling",
                patch.session_id
            )));
        }

        Ok(())
    }

    pub fn update_status(
        conn: &Connection,
        id: &str,
        status: SessionStatus,
        updated_at: &str,
    ) -> AppResult<()> {
        let affected = conn.execute(
            "UPDATE sessions SET status = ?1, staged = 0, updated_at = ?2 WHERE id = ?3",
            (status.as_str(), updated_at, id),
        )?;
        if affected == 0 {
            return Err(AppError::not_found());
        }
        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<SessionRow>> {
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", BASE_SELECT))?;
        let row = stmt
            .query_row([id], |row| SessionRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn list_for_plan(conn: &Connection, plan_id: &str) -> AppResult<Vec<SessionRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE plan_id = ?1 ORDER BY session_number ASC",
            BASE_SELECT
        ))?;
        let rows = stmt
            .query_map([plan_id], |row| SessionRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn list_for_vehicle(
        conn: &Connection,
        vehicle_id: &str,
        range: Option<DateRange>,
    ) -> AppResult<Vec<SessionRow>> {
        let rows = match range {
            Some(range) => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE vehicle_id = ?1 AND session_date BETWEEN ?2 AND ?3 ORDER BY session_date ASC, start_time ASC",
                    BASE_SELECT
                ))?;
                let rows = stmt
                    .query_map(
                        (
                            vehicle_id,
                            schedule_utils::format_calendar_date(range.start),
                            schedule_utils::format_calendar_date(range.end),
                        ),
                        |row| SessionRow::try_from(row),
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "{} WHERE vehicle_id = ?1 ORDER BY session_date ASC, start_time ASC",
                    BASE_SELECT
                ))?;
                let rows = stmt
                    .query_map([vehicle_id], |row| SessionRow::try_from(row))?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    pub fn list_for_date(conn: &Connection, session_date: &str) -> AppResult<Vec<SessionRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE session_date = ?1 ORDER BY start_time ASC, vehicle_id ASC",
            BASE_SELECT
        ))?;
        let rows = stmt
            .query_map([session_date], |row| SessionRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

pub fn into_records(rows: Vec<SessionRow>) -> AppResult<Vec<SessionRecord>> {
    rows.into_iter().map(SessionRow::into_record).collect()
}

/// Conflict lookups against the sessions table on a borrowed connection.
pub struct ConnectionBookings<'c> {
    conn: &'c Connection,
}

impl<'c> ConnectionBookings<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }
}

impl VehicleBookings for ConnectionBookings<'_> {
    fn sessions_for_vehicle(
        &self,
        vehicle_id: &str,
        range: Option<DateRange>,
    ) -> AppResult<Vec<SessionRecord>> {
        into_records(SessionRepository::list_for_vehicle(self.conn, vehicle_id, range)?)
    }
}
