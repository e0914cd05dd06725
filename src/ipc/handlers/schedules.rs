use crate::engine::{self, AddInput, HalfPos, SlotTarget, WriteKind};
use crate::error::EngineError;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{
    db_conn, get_instance_or_err, get_schedule_or_err, instance_target, opt_bool, opt_str,
    parse_instance_date, required_str, schedule_json, template_target,
};
use crate::ipc::types::{AppState, Request};
use crate::slot::{self, NOTE_MANUALLY_ADDED, NOTE_TIME_OCCUPIED, OCCUPIED_LABEL};
use crate::store::{self, InstanceRow, Owner};
use rusqlite::Connection;
use serde_json::{json, Value as JsonValue};

/// Narrow an hour-long target down to one of its halves.
fn apply_half_position(
    req: &Request,
    mut target: SlotTarget,
    pos_raw: Option<String>,
) -> Result<SlotTarget, JsonValue> {
    let Some(raw) = pos_raw else {
        return Ok(target);
    };
    let Some(pos) = HalfPos::parse(&raw) else {
        return Err(err(
            &req.id,
            "bad_params",
            "halfHourPosition must be first or second",
            None,
        ));
    };
    if target.end - target.start != 60 {
        return Err(err(
            &req.id,
            "bad_params",
            "halfHourPosition applies to an hour-long slot",
            None,
        ));
    }
    let anchor = slot::hour_anchor(target.start);
    match pos {
        HalfPos::First => {
            target.start = anchor;
            target.end = anchor + 30;
        }
        HalfPos::Second => {
            target.start = anchor + 30;
            target.end = anchor + 60;
        }
    }
    Ok(target)
}

/// Shared add path for single and batch creates. Item-level failures come
/// back as (code, message) so batch callers can aggregate them.
fn create_one(
    conn: &Connection,
    req: &Request,
    instance: &InstanceRow,
    input: &JsonValue,
) -> Result<serde_json::Value, (String, String)> {
    let (Some(date), Some(start), Some(end)) = (
        opt_str(input, "scheduleDate"),
        opt_str(input, "startTime"),
        opt_str(input, "endTime"),
    ) else {
        return Err((
            "bad_params".to_string(),
            "input requires scheduleDate, startTime, endTime".to_string(),
        ));
    };
    let is_time_block = opt_bool(input, "isTimeBlock", false);
    let student_name = match opt_str(input, "studentName") {
        Some(v) => v,
        None if is_time_block => OCCUPIED_LABEL.to_string(),
        None => {
            return Err((
                "bad_params".to_string(),
                "missing input.studentName".to_string(),
            ))
        }
    };

    let target = instance_target(req, instance, &date, &start, &end)
        .and_then(|t| apply_half_position(req, t, opt_str(input, "halfHourPosition")))
        .map_err(|resp| {
            let code = resp
                .pointer("/error/code")
                .and_then(|v| v.as_str())
                .unwrap_or("bad_params")
                .to_string();
            let message = resp
                .pointer("/error/message")
                .and_then(|v| v.as_str())
                .unwrap_or("invalid slot")
                .to_string();
            (code, message)
        })?;

    let add = AddInput {
        student_name,
        is_time_block,
        is_trial: opt_bool(input, "isTrial", false),
        note: opt_str(input, "note").unwrap_or_else(|| {
            if is_time_block {
                NOTE_TIME_OCCUPIED.to_string()
            } else {
                NOTE_MANUALLY_ADDED.to_string()
            }
        }),
    };
    let owner = Owner::Instance {
        instance_id: instance.id.clone(),
    };
    engine::add_schedule(
        conn,
        &instance.timetable_id,
        &owner,
        &target,
        &add,
        WriteKind::Operation,
    )
    .map(|row| schedule_json(&row))
    .map_err(|e| (e.code().to_string(), e.to_string()))
}

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let instance_id = match required_str(req, "instanceId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = get_instance_or_err(conn, req, &instance_id) {
        return e;
    }
    match store::list_instance_schedules(conn, &instance_id) {
        Ok(rows) => ok(
            &req.id,
            json!({ "schedules": rows.iter().map(schedule_json).collect::<Vec<_>>() }),
        ),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let instance_id = match required_str(req, "instanceId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let instance = match get_instance_or_err(conn, req, &instance_id) {
        Ok(i) => i,
        Err(e) => return e,
    };
    let input = req.params.get("input").cloned().unwrap_or(json!({}));
    match create_one(conn, req, &instance, &input) {
        Ok(schedule) => ok(&req.id, json!({ "schedule": schedule })),
        Err((code, message)) => err(&req.id, &code, message, None),
    }
}

fn handle_create_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let instance_id = match required_str(req, "instanceId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let instance = match get_instance_or_err(conn, req, &instance_id) {
        Ok(i) => i,
        Err(e) => return e,
    };
    let inputs = req
        .params
        .get("inputs")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();
    if inputs.is_empty() {
        return engine_err(&req.id, &EngineError::EmptySelection);
    }

    let mut results = Vec::with_capacity(inputs.len());
    let mut succeeded = 0usize;
    for input in &inputs {
        match create_one(conn, req, &instance, input) {
            Ok(schedule) => {
                succeeded += 1;
                results.push(json!({ "ok": true, "schedule": schedule }));
            }
            Err((code, message)) => {
                results.push(json!({
                    "ok": false,
                    "error": { "code": code, "message": message }
                }));
            }
        }
    }
    ok(
        &req.id,
        json!({ "succeeded": succeeded, "results": results }),
    )
}

fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let schedule_id = match required_str(req, "scheduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let row = match get_schedule_or_err(conn, req, &schedule_id) {
        Ok(r) => r,
        Err(e) => return e,
    };
    let Some(instance_id) = row.instance_id.clone() else {
        return err(&req.id, "bad_params", "not an instance schedule", None);
    };
    let instance = match get_instance_or_err(conn, req, &instance_id) {
        Ok(i) => i,
        Err(e) => return e,
    };

    let patch = req.params.get("patch").cloned().unwrap_or(json!({}));
    let date = opt_str(&patch, "scheduleDate")
        .unwrap_or_else(|| row.schedule_date.clone().unwrap_or_default());
    let start = opt_str(&patch, "startTime").unwrap_or_else(|| row.start_time.clone());
    let end = opt_str(&patch, "endTime").unwrap_or_else(|| row.end_time.clone());
    let student_name = opt_str(&patch, "studentName").unwrap_or_else(|| row.student_name.clone());
    let is_time_block = patch
        .get("isTimeBlock")
        .and_then(|v| v.as_bool())
        .unwrap_or(row.is_time_block);
    let is_trial = patch
        .get("isTrial")
        .and_then(|v| v.as_bool())
        .unwrap_or(row.is_trial);
    let note = match patch.get("note").and_then(|v| v.as_str()) {
        Some(v) => v.to_string(),
        None => row.note.clone(),
    };

    let target = match instance_target(req, &instance, &date, &start, &end) {
        Ok(t) => t,
        Err(e) => return e,
    };
    if let Err(e) =
        engine::ensure_slot_free(conn, &row.owner(), &target, &[&row.id], WriteKind::Operation)
    {
        return engine_err(&req.id, &e);
    }

    let update = conn.execute(
        "UPDATE schedules
         SET schedule_date = ?, start_time = ?, end_time = ?, student_name = ?,
             is_time_block = ?, is_trial = ?, note = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            target.schedule_date.map(crate::week::format_date),
            slot::format_time(target.start),
            slot::format_time(target.end),
            student_name,
            is_time_block as i64,
            is_trial as i64,
            note,
            store::now_ts(),
            schedule_id,
        ],
    );
    if let Err(e) = update {
        return err(&req.id, "db_update_failed", e.to_string(), None);
    }

    match get_schedule_or_err(conn, req, &schedule_id) {
        Ok(row) => ok(&req.id, json!({ "schedule": schedule_json(&row) })),
        Err(e) => e,
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let schedule_id = match required_str(req, "scheduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let row = match get_schedule_or_err(conn, req, &schedule_id) {
        Ok(r) => r,
        Err(e) => return e,
    };
    if row.instance_id.is_none() {
        return err(&req.id, "bad_params", "not an instance schedule", None);
    }
    match store::delete_schedule(conn, &schedule_id) {
        Ok(()) => ok(&req.id, json!({ "scheduleId": schedule_id })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_delete_batch(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let ids: Vec<String> = req
        .params
        .get("scheduleIds")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.to_string())
                .collect()
        })
        .unwrap_or_default();
    if ids.is_empty() {
        return engine_err(&req.id, &EngineError::EmptySelection);
    }

    let mut results = Vec::with_capacity(ids.len());
    let mut succeeded = 0usize;
    for id in &ids {
        let outcome = match store::get_schedule(conn, id) {
            Ok(Some(row)) if row.instance_id.is_some() => {
                store::delete_schedule(conn, id).map_err(|e| (e.code().to_string(), e.to_string()))
            }
            Ok(Some(_)) => Err((
                "bad_params".to_string(),
                "not an instance schedule".to_string(),
            )),
            Ok(None) => Err(("not_found".to_string(), "schedule not found".to_string())),
            Err(e) => Err((e.code().to_string(), e.to_string())),
        };
        match outcome {
            Ok(()) => {
                succeeded += 1;
                results.push(json!({ "ok": true, "scheduleId": id }));
            }
            Err((code, message)) => results.push(json!({
                "ok": false,
                "scheduleId": id,
                "error": { "code": code, "message": message }
            })),
        }
    }
    ok(
        &req.id,
        json!({ "succeeded": succeeded, "results": results }),
    )
}

fn handle_occupy(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let start = match required_str(req, "startTime") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let end = match required_str(req, "endTime") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let pos = opt_str(&req.params, "halfHourPosition");

    // Template addressing via timetableId + dayOfWeek; instance addressing
    // via instanceId + scheduleDate.
    let (timetable_id, owner, target) = if let Some(instance_id) = opt_str(&req.params, "instanceId")
    {
        let instance = match get_instance_or_err(conn, req, &instance_id) {
            Ok(i) => i,
            Err(e) => return e,
        };
        let date = match required_str(req, "scheduleDate") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let target = match instance_target(req, &instance, &date, &start, &end) {
            Ok(t) => t,
            Err(e) => return e,
        };
        (
            instance.timetable_id.clone(),
            Owner::Instance {
                instance_id: instance.id.clone(),
            },
            target,
        )
    } else if let Some(timetable_id) = opt_str(&req.params, "timetableId") {
        match store::timetable_exists(conn, &timetable_id) {
            Ok(true) => {}
            Ok(false) => return err(&req.id, "not_found", "timetable not found", None),
            Err(e) => return engine_err(&req.id, &e),
        }
        let day = match required_str(req, "dayOfWeek") {
            Ok(v) => v,
            Err(e) => return e,
        };
        let target = match template_target(req, &day, &start, &end) {
            Ok(t) => t,
            Err(e) => return e,
        };
        (
            timetable_id.clone(),
            Owner::Template {
                timetable_id: timetable_id.clone(),
            },
            target,
        )
    } else {
        return err(
            &req.id,
            "bad_params",
            "either instanceId or timetableId is required",
            None,
        );
    };

    let target = match apply_half_position(req, target, pos) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let add = AddInput {
        student_name: OCCUPIED_LABEL.to_string(),
        is_time_block: true,
        is_trial: false,
        note: NOTE_TIME_OCCUPIED.to_string(),
    };
    match engine::add_schedule(conn, &timetable_id, &owner, &target, &add, WriteKind::Operation) {
        Ok(row) => ok(&req.id, json!({ "schedule": schedule_json(&row) })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_toggle_half_hour(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let schedule_id = match required_str(req, "scheduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(enable) = req.params.get("enable").and_then(|v| v.as_bool()) else {
        return err(&req.id, "bad_params", "missing enable", None);
    };
    let position = match opt_str(&req.params, "position") {
        Some(raw) => match HalfPos::parse(&raw) {
            Some(p) => Some(p),
            None => {
                return err(&req.id, "bad_params", "position must be first or second", None)
            }
        },
        None => None,
    };
    let row = match get_schedule_or_err(conn, req, &schedule_id) {
        Ok(r) => r,
        Err(e) => return e,
    };

    match engine::toggle_half_hour(conn, &row, enable, position) {
        Ok(updated) => ok(&req.id, json!({ "schedule": schedule_json(&updated) })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_restore(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let instance_id = match required_str(req, "instanceId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let instance = match get_instance_or_err(conn, req, &instance_id) {
        Ok(i) => i,
        Err(e) => return e,
    };
    let date_raw = match required_str(req, "scheduleDate") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let start_raw = match required_str(req, "startTime") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let end_raw = match required_str(req, "endTime") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let expect_leave = opt_bool(&req.params, "expectLeave", false);

    let date = match parse_instance_date(req, &instance, &date_raw) {
        Ok(d) => d,
        Err(e) => return e,
    };
    let (start, end) = match slot::check_span(&start_raw, &end_raw) {
        Ok(v) => v,
        Err(e) => return engine_err(&req.id, &e),
    };
    let template = match store::list_template_schedules(conn, &instance.timetable_id) {
        Ok(t) => t,
        Err(e) => return engine_err(&req.id, &e),
    };

    match engine::restore_slot(conn, &instance, &template, date, start, end, expect_leave) {
        Ok((outcome, row)) => ok(
            &req.id,
            json!({
                "outcome": outcome.as_str(),
                "schedule": schedule_json(&row),
            }),
        ),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "instance.schedules.list" => Some(handle_list(state, req)),
        "instance.schedules.create" => Some(handle_create(state, req)),
        "instance.schedules.createBatch" => Some(handle_create_batch(state, req)),
        "instance.schedules.update" => Some(handle_update(state, req)),
        "instance.schedules.delete" => Some(handle_delete(state, req)),
        "instance.schedules.deleteBatch" => Some(handle_delete_batch(state, req)),
        "schedules.occupy" => Some(handle_occupy(state, req)),
        "schedules.toggleHalfHour" => Some(handle_toggle_half_hour(state, req)),
        "schedules.restore" => Some(handle_restore(state, req)),
        _ => None,
    }
}
