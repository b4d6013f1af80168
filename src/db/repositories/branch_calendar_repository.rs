use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::AppResult;
use crate::models::calendar::{BranchCalendarRecord, OperatingHoursRecord};

#[derive(Debug, Clone)]
pub struct BranchCalendarRow {
    pub branch_id: String,
    pub working_days: String,
    pub opening_time: String,
    pub closing_time: String,
    pub holidays: Option<String>,
    pub updated_at: String,
}

impl BranchCalendarRow {
    pub fn from_record(record: &BranchCalendarRecord, updated_at: &str) -> AppResult<Self> {
        Ok(Self {
            branch_id: record.branch_id.clone(),
            working_days: serde_json::to_string(&record.working_days)?,
            opening_time: record.operating_hours.start.clone(),
            closing_time: record.operating_hours.end.clone(),
            holidays: serialize_vec(&record.holidays)?,
            updated_at: updated_at.to_string(),
        })
    }

    pub fn into_record(self) -> AppResult<BranchCalendarRecord> {
        Ok(BranchCalendarRecord {
            branch_id: self.branch_id,
            working_days: serde_json::from_str(&self.working_days)?,
            operating_hours: OperatingHoursRecord {
                start: self.opening_time,
                end: self.closing_time,
            },
            holidays: deserialize_vec(self.holidays)?,
            updated_at: Some(self.updated_at),
        })
    }
}

impl TryFrom<&Row<'_>> for BranchCalendarRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(BranchCalendarRow {
            branch_id: row.get("branch_id")?,
            working_days: row.get("working_days")?,
            opening_time: row.get("opening_time")?,
            closing_time: row.get("closing_time")?,
            holidays: row.get("holidays")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

pub struct BranchCalendarRepository;

impl BranchCalendarRepository {
    pub fn upsert(conn: &Connection, row: &BranchCalendarRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO branch_calendars (
                    branch_id,
                    working_days,
                    opening_time,
                    closing_time,
                    holidays,
                    updated_at
                ) VALUES (
                    :branch_id,
                    :working_days,
                    :opening_time,
                    :closing_time,
                    :holidays,
                    :updated_at
                )
                ON CONFLICT(branch_id) DO UPDATE SET
                    working_days = excluded.working_days,
                    opening_time = excluded.opening_time,
                    closing_time = excluded.closing_time,
                    holidays = excluded.holidays,
                    updated_at = excluded.updated_at
            "#,
            named_params! {
                ":branch_id": &row.branch_id,
                ":working_days": &row.working_days,
                ":opening_time": &row.opening_time,
                ":closing_time": &row.closing_time,
                ":holidays": &row.holidays,
                ":updated_at": &row.updated_at,
            },
        )?;

        Ok(())
    }

    pub fn find(conn: &Connection, branch_id: &str) -> AppResult<Option<BranchCalendarRow>> {
        let mut stmt = conn.prepare(
            r#"
                SELECT branch_id, working_days, opening_time, closing_time, holidays, updated_at
                FROM branch_calendars
                WHERE branch_id = ?1
            "#,
        )?;
        let row = stmt
            .query_row([branch_id], |row| BranchCalendarRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    pub fn list_branch_ids(conn: &Connection) -> AppResult<Vec<String>> {
        let mut stmt = conn.prepare("SELECT branch_id FROM branch_calendars ORDER BY branch_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

fn serialize_vec(values: &[String]) -> AppResult<Option<String>> {
    if values.is_empty() {
        Ok(None)
    } else {
        Ok(Some(serde_json::to_string(values)?))
    }
}

fn deserialize_vec(raw: Option<String>) -> AppResult<Vec<String>> {
    match raw {
        Some(value) if !value.is_empty() => Ok(serde_json::from_str(&value)?),
        _ => Ok(Vec::new()),
    }
}
