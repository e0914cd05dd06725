use rusqlite::{params, Connection, OptionalExtension, Row};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::error::{EngineError, Result};

/// Which schedule set a record belongs to. A schedule never moves between
/// owners; deriving one from another always copies under a fresh id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    Template { timetable_id: String },
    Instance { instance_id: String },
}

#[derive(Debug, Clone)]
pub struct ScheduleRow {
    pub id: String,
    pub timetable_id: String,
    pub instance_id: Option<String>,
    pub day_of_week: Option<String>,
    pub schedule_date: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub student_name: String,
    pub is_time_block: bool,
    pub is_trial: bool,
    pub is_on_leave: bool,
    pub leave_reason: Option<String>,
    pub note: String,
    pub created_at: String,
    pub updated_at: Option<String>,
}

impl ScheduleRow {
    pub fn owner(&self) -> Owner {
        match &self.instance_id {
            Some(id) => Owner::Instance {
                instance_id: id.clone(),
            },
            None => Owner::Template {
                timetable_id: self.timetable_id.clone(),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstanceRow {
    pub id: String,
    pub timetable_id: String,
    pub week_start: String,
    pub week_end: String,
    pub created_at: String,
}

/// Input for a new schedule record. Exactly one of `day_of_week` /
/// `schedule_date` is set, matching the owner's addressing mode.
#[derive(Debug, Clone)]
pub struct NewSchedule {
    pub timetable_id: String,
    pub instance_id: Option<String>,
    pub day_of_week: Option<String>,
    pub schedule_date: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub student_name: String,
    pub is_time_block: bool,
    pub is_trial: bool,
    pub note: String,
}

pub fn now_ts() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis().to_string())
        .unwrap_or_else(|_| "0".to_string())
}

const SCHEDULE_COLS: &str = "id, timetable_id, instance_id, day_of_week, schedule_date,
     start_time, end_time, student_name, is_time_block, is_trial, is_on_leave,
     leave_reason, note, created_at, updated_at";

fn schedule_from_row(r: &Row) -> rusqlite::Result<ScheduleRow> {
    Ok(ScheduleRow {
        id: r.get(0)?,
        timetable_id: r.get(1)?,
        instance_id: r.get(2)?,
        day_of_week: r.get(3)?,
        schedule_date: r.get(4)?,
        start_time: r.get(5)?,
        end_time: r.get(6)?,
        student_name: r.get(7)?,
        is_time_block: r.get::<_, i64>(8)? != 0,
        is_trial: r.get::<_, i64>(9)? != 0,
        is_on_leave: r.get::<_, i64>(10)? != 0,
        leave_reason: r.get(11)?,
        note: r.get(12)?,
        created_at: r.get(13)?,
        updated_at: r.get(14)?,
    })
}

fn instance_from_row(r: &Row) -> rusqlite::Result<InstanceRow> {
    Ok(InstanceRow {
        id: r.get(0)?,
        timetable_id: r.get(1)?,
        week_start: r.get(2)?,
        week_end: r.get(3)?,
        created_at: r.get(4)?,
    })
}

pub fn timetable_exists(conn: &Connection, timetable_id: &str) -> Result<bool> {
    let hit = conn
        .query_row(
            "SELECT 1 FROM timetables WHERE id = ? LIMIT 1",
            [timetable_id],
            |_r| Ok(()),
        )
        .optional()?;
    Ok(hit.is_some())
}

pub fn get_schedule(conn: &Connection, schedule_id: &str) -> Result<Option<ScheduleRow>> {
    let sql = format!("SELECT {SCHEDULE_COLS} FROM schedules WHERE id = ?");
    Ok(conn
        .query_row(&sql, [schedule_id], schedule_from_row)
        .optional()?)
}

pub fn list_template_schedules(conn: &Connection, timetable_id: &str) -> Result<Vec<ScheduleRow>> {
    let sql = format!(
        "SELECT {SCHEDULE_COLS} FROM schedules
         WHERE timetable_id = ? AND instance_id IS NULL
         ORDER BY day_of_week, start_time, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([timetable_id], schedule_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn list_instance_schedules(conn: &Connection, instance_id: &str) -> Result<Vec<ScheduleRow>> {
    let sql = format!(
        "SELECT {SCHEDULE_COLS} FROM schedules
         WHERE instance_id = ?
         ORDER BY schedule_date, start_time, id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([instance_id], schedule_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

/// All records of an owner on one day (template day token or instance date),
/// on-leave records included; callers filter as needed.
pub fn list_schedules_on_day(conn: &Connection, owner: &Owner, day: &str) -> Result<Vec<ScheduleRow>> {
    let (sql, key_a, key_b) = match owner {
        Owner::Template { timetable_id } => (
            format!(
                "SELECT {SCHEDULE_COLS} FROM schedules
                 WHERE timetable_id = ? AND instance_id IS NULL AND day_of_week = ?
                 ORDER BY start_time, id"
            ),
            timetable_id.clone(),
            day.to_string(),
        ),
        Owner::Instance { instance_id } => (
            format!(
                "SELECT {SCHEDULE_COLS} FROM schedules
                 WHERE instance_id = ? AND schedule_date = ?
                 ORDER BY start_time, id"
            ),
            instance_id.clone(),
            day.to_string(),
        ),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![key_a, key_b], schedule_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn insert_schedule(conn: &Connection, new: &NewSchedule) -> Result<ScheduleRow> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO schedules(
            id, timetable_id, instance_id, day_of_week, schedule_date,
            start_time, end_time, student_name, is_time_block, is_trial,
            is_on_leave, leave_reason, note, created_at, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, ?, ?, NULL)",
        params![
            id,
            new.timetable_id,
            new.instance_id,
            new.day_of_week,
            new.schedule_date,
            new.start_time,
            new.end_time,
            new.student_name,
            new.is_time_block as i64,
            new.is_trial as i64,
            new.note,
            now_ts(),
        ],
    )?;
    get_schedule(conn, &id)?.ok_or(EngineError::NotFound("schedule"))
}

/// Rewrite a record's addressing fields, leaving identity and content alone.
pub fn update_schedule_slot(
    conn: &Connection,
    schedule_id: &str,
    day_of_week: Option<&str>,
    schedule_date: Option<&str>,
    start_time: &str,
    end_time: &str,
) -> Result<()> {
    let n = conn.execute(
        "UPDATE schedules
         SET day_of_week = ?, schedule_date = ?, start_time = ?, end_time = ?, updated_at = ?
         WHERE id = ?",
        params![day_of_week, schedule_date, start_time, end_time, now_ts(), schedule_id],
    )?;
    if n == 0 {
        return Err(EngineError::NotFound("schedule"));
    }
    Ok(())
}

pub fn set_schedule_leave(
    conn: &Connection,
    schedule_id: &str,
    on_leave: bool,
    reason: Option<&str>,
) -> Result<()> {
    let n = conn.execute(
        "UPDATE schedules SET is_on_leave = ?, leave_reason = ?, updated_at = ? WHERE id = ?",
        params![on_leave as i64, reason, now_ts(), schedule_id],
    )?;
    if n == 0 {
        return Err(EngineError::NotFound("schedule"));
    }
    Ok(())
}

pub fn delete_schedule(conn: &Connection, schedule_id: &str) -> Result<()> {
    let n = conn.execute("DELETE FROM schedules WHERE id = ?", [schedule_id])?;
    if n == 0 {
        return Err(EngineError::NotFound("schedule"));
    }
    Ok(())
}

pub fn get_instance(conn: &Connection, instance_id: &str) -> Result<Option<InstanceRow>> {
    Ok(conn
        .query_row(
            "SELECT id, timetable_id, week_start, week_end, created_at
             FROM weekly_instances WHERE id = ?",
            [instance_id],
            instance_from_row,
        )
        .optional()?)
}

pub fn find_instance_by_week(
    conn: &Connection,
    timetable_id: &str,
    week_start: &str,
) -> Result<Option<InstanceRow>> {
    Ok(conn
        .query_row(
            "SELECT id, timetable_id, week_start, week_end, created_at
             FROM weekly_instances WHERE timetable_id = ? AND week_start = ?",
            params![timetable_id, week_start],
            instance_from_row,
        )
        .optional()?)
}

pub fn list_instances(conn: &Connection, timetable_id: &str) -> Result<Vec<InstanceRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, timetable_id, week_start, week_end, created_at
         FROM weekly_instances WHERE timetable_id = ?
         ORDER BY week_start",
    )?;
    let rows = stmt
        .query_map([timetable_id], instance_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn insert_instance(
    conn: &Connection,
    timetable_id: &str,
    week_start: &str,
    week_end: &str,
) -> Result<InstanceRow> {
    let id = Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO weekly_instances(id, timetable_id, week_start, week_end, created_at)
         VALUES(?, ?, ?, ?, ?)",
        params![id, timetable_id, week_start, week_end, now_ts()],
    )?;
    get_instance(conn, &id)?.ok_or(EngineError::NotFound("weekly instance"))
}

pub fn delete_instance_schedules(conn: &Connection, instance_id: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM schedules WHERE instance_id = ?", [instance_id])?)
}

pub fn delete_instance(conn: &Connection, instance_id: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM schedules WHERE instance_id = ?", [instance_id])?;
    let n = tx.execute("DELETE FROM weekly_instances WHERE id = ?", [instance_id])?;
    tx.commit()?;
    if n == 0 {
        return Err(EngineError::InstanceNotFound(instance_id.to_string()));
    }
    Ok(())
}
