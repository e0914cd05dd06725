use chrono::NaiveDate;
use rusqlite::Connection;
use serde_json::{json, Value as JsonValue};

use crate::engine::SlotTarget;
use crate::error::EngineError;
use crate::ipc::error::{engine_err, err};
use crate::ipc::types::{AppState, Request};
use crate::slot;
use crate::store::{InstanceRow, ScheduleRow};
use crate::week;

pub fn db_conn<'a>(state: &'a AppState, req: &Request) -> Result<&'a Connection, JsonValue> {
    state
        .db
        .as_ref()
        .ok_or_else(|| err(&req.id, "no_workspace", "select a workspace first", None))
}

pub fn required_str(req: &Request, key: &str) -> Result<String, JsonValue> {
    req.params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|v| v.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| err(&req.id, "bad_params", format!("missing {}", key), None))
}

pub fn opt_str(params: &JsonValue, key: &str) -> Option<String> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

pub fn opt_bool(params: &JsonValue, key: &str, default: bool) -> bool {
    params.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

/// Validate and resolve a template-addressed slot from raw day/time params.
pub fn template_target(
    req: &Request,
    day_raw: &str,
    start_raw: &str,
    end_raw: &str,
) -> Result<SlotTarget, JsonValue> {
    let day = slot::normalize_day(day_raw).map_err(|e| engine_err(&req.id, &e))?;
    let (start, end) = slot::check_span(start_raw, end_raw).map_err(|e| engine_err(&req.id, &e))?;
    Ok(SlotTarget::for_template(day, start, end))
}

/// Validate and resolve an instance-addressed slot; the date must fall inside
/// the instance's week.
pub fn instance_target(
    req: &Request,
    instance: &InstanceRow,
    date_raw: &str,
    start_raw: &str,
    end_raw: &str,
) -> Result<SlotTarget, JsonValue> {
    let date = parse_instance_date(req, instance, date_raw)?;
    let (start, end) = slot::check_span(start_raw, end_raw).map_err(|e| engine_err(&req.id, &e))?;
    Ok(SlotTarget::for_instance(date, start, end))
}

pub fn parse_instance_date(
    req: &Request,
    instance: &InstanceRow,
    date_raw: &str,
) -> Result<NaiveDate, JsonValue> {
    let date = week::parse_date(date_raw).map_err(|e| engine_err(&req.id, &e))?;
    let start = week::parse_date(&instance.week_start).map_err(|e| engine_err(&req.id, &e))?;
    let end = week::parse_date(&instance.week_end).map_err(|e| engine_err(&req.id, &e))?;
    if date < start || date > end {
        return Err(err(
            &req.id,
            "bad_params",
            format!(
                "scheduleDate {} is outside the instance week {}..{}",
                date_raw, instance.week_start, instance.week_end
            ),
            None,
        ));
    }
    Ok(date)
}

pub fn get_instance_or_err(
    conn: &Connection,
    req: &Request,
    instance_id: &str,
) -> Result<InstanceRow, JsonValue> {
    match crate::store::get_instance(conn, instance_id) {
        Ok(Some(i)) => Ok(i),
        Ok(None) => Err(engine_err(
            &req.id,
            &EngineError::InstanceNotFound(instance_id.to_string()),
        )),
        Err(e) => Err(engine_err(&req.id, &e)),
    }
}

pub fn get_schedule_or_err(
    conn: &Connection,
    req: &Request,
    schedule_id: &str,
) -> Result<ScheduleRow, JsonValue> {
    match crate::store::get_schedule(conn, schedule_id) {
        Ok(Some(r)) => Ok(r),
        Ok(None) => Err(err(&req.id, "not_found", "schedule not found", None)),
        Err(e) => Err(engine_err(&req.id, &e)),
    }
}

/// Wire form of a schedule record, with derived display fields.
pub fn schedule_json(row: &ScheduleRow) -> JsonValue {
    let half_pos = match (
        slot::parse_time(&row.start_time),
        slot::parse_time(&row.end_time),
    ) {
        (Ok(start), Ok(end)) if slot::is_half_hour(start, end) => {
            Some(slot::half_hour_position(start))
        }
        _ => None,
    };
    json!({
        "id": row.id,
        "timetableId": row.timetable_id,
        "instanceId": row.instance_id,
        "dayOfWeek": row.day_of_week,
        "scheduleDate": row.schedule_date,
        "startTime": row.start_time,
        "endTime": row.end_time,
        "studentName": row.student_name,
        "isTimeBlock": row.is_time_block,
        "isTrial": row.is_trial,
        "isOnLeave": row.is_on_leave,
        "leaveReason": row.leave_reason,
        "note": row.note,
        "halfHourPosition": half_pos,
    })
}

pub fn instance_json(row: &InstanceRow) -> JsonValue {
    json!({
        "id": row.id,
        "timetableId": row.timetable_id,
        "weekStart": row.week_start,
        "weekEnd": row.week_end,
    })
}
