use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::session::PlanRecord;

const BASE_SELECT: &str = r#"
    SELECT
        id,
        client_id,
        branch_id,
        vehicle_id,
        joining_date,
        joining_time,
        session_count,
        duration_minutes,
        created_at,
        updated_at
    FROM plans
"#;

#[derive(Debug, Clone)]
pub struct PlanRow {
    pub id: String,
    pub client_id: String,
    pub branch_id: String,
    pub vehicle_id: String,
    pub joining_date: String,
    pub joining_time: String,
    pub session_count: i64,
    pub duration_minutes: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl PlanRow {
    pub fn from_record(record: &PlanRecord) -> Self {
        Self {
            id: record.id.clone(),
            client_id: record.client_id.clone(),
            branch_id: record.branch_id.clone(),
            vehicle_id: record.vehicle_id.clone(),
            joining_date: record.joining_date.clone(),
            joining_time: record.joining_time.clone(),
            session_count: i64::from(record.session_count),
            duration_minutes: i64::from(record.duration_minutes),
            created_at: record.created_at.clone(),
            updated_at: record.updated_at.clone(),
        }
    }

    pub fn into_record(self) -> AppResult<PlanRecord> {
        let to_u32 = |value: i64, column: &str| {
            u32::try_from(value).map_err(|_| {
                AppError::database(format!("plan {} has invalid {column}: {value}", self.id))
            })
        };

        Ok(PlanRecord {
            session_count: to_u32(self.session_count, "session_count")?,
            duration_minutes: to_u32(self.duration_minutes, "duration_minutes")?,
            id: self.id.clone(),
            client_id: self.client_id,
            branch_id: self.branch_id,
            vehicle_id: self.vehicle_id,
            joining_date: self.joining_date,
            joining_time: self.joining_time,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TryFrom<&Row<'_>> for PlanRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(PlanRow {
            id: row.get("id")?,
            client_id: row.get("client_id")?,
            branch_id: row.get("branch_id")?,
            vehicle_id: row.get("vehicle_id")?,
            joining_date: row.get("joining_date")?,
            joining_time: row.get("joining_time")?,
            session_count: row.get("session_count")?,
            duration_minutes: row.get("duration_minutes")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct PlanRepository;

impl PlanRepository {
    /// Inserts the plan snapshot or replaces its timing fields, keeping `created_at`.
    pub fn upsert(conn: &Connection, row: &PlanRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO plans (
                    id,
                    client_id,
                    branch_id,
                    vehicle_id,
                    joining_date,
                    joining_time,
                    session_count,
                    duration_minutes,
                    created_at,
                    updated_at
                ) VALUES (
                    :id,
                    :client_id,
                    :branch_id,
                    :vehicle_id,
                    :joining_date,
                    :joining_time,
                    :session_count,
                    :duration_minutes,
                    :created_at,
                    :updated_at
                )
                ON CONFLICT(id) DO UPDATE SET
                    branch_id = excluded.branch_id,
                    vehicle_id = excluded.vehicle_id,
                    joining_date = excluded.joining_date,
                    joining_time = excluded.joining_time,
                    session_count = excluded.session_count,
                    duration_minutes = excluded.duration_minutes,
                    updated_at = excluded.updated_at
            "#,
            named_params! {
                ":id": &row.id,
                ":client_id": &row.client_id,
                ":branch_id": &row.branch_id,
                ":vehicle_id": &row.vehicle_id,
                ":joining_date": &row.joining_date,
                ":joining_time": &row.joining_time,
                ":session_count": row.session_count,
                ":duration_minutes": row.duration_minutes,
                ":created_at": &row.created_at,
                ":updated_at": &row.updated_at,
            },
        )?;

        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<PlanRow>> {
        let mut stmt = conn.prepare(&format!("{} WHERE id = ?1", BASE_SELECT))?;
        let row = stmt
            .query_row([id], |row| PlanRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn list_for_client(conn: &Connection, client_id: &str) -> AppResult<Vec<PlanRow>> {
        let mut stmt = conn.prepare(&format!(
            "{} WHERE client_id = ?1 ORDER BY created_at DESC",
            BASE_SELECT
        ))?;
        let rows = stmt
            .query_map([client_id], |row| PlanRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}
