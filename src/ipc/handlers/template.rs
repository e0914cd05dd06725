use crate::engine::{self, AddInput, WriteKind};
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{
    db_conn, get_schedule_or_err, opt_bool, opt_str, required_str, schedule_json, template_target,
};
use crate::ipc::types::{AppState, Request};
use crate::lifecycle;
use crate::slot::{self, OCCUPIED_LABEL};
use crate::store::{self, Owner};
use serde_json::json;

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let timetable_id = match required_str(req, "timetableId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store::timetable_exists(conn, &timetable_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "timetable not found", None),
        Err(e) => return engine_err(&req.id, &e),
    }

    match store::list_template_schedules(conn, &timetable_id) {
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
    let timetable_id = match required_str(req, "timetableId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store::timetable_exists(conn, &timetable_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "timetable not found", None),
        Err(e) => return engine_err(&req.id, &e),
    }

    let input = req.params.get("input").cloned().unwrap_or(json!({}));
    let (Some(day), Some(start), Some(end)) = (
        opt_str(&input, "dayOfWeek"),
        opt_str(&input, "startTime"),
        opt_str(&input, "endTime"),
    ) else {
        return err(
            &req.id,
            "bad_params",
            "input requires dayOfWeek, startTime, endTime",
            None,
        );
    };
    let is_time_block = opt_bool(&input, "isTimeBlock", false);
    let student_name = match opt_str(&input, "studentName") {
        Some(v) => v,
        None if is_time_block => OCCUPIED_LABEL.to_string(),
        None => return err(&req.id, "bad_params", "missing input.studentName", None),
    };

    let target = match template_target(req, &day, &start, &end) {
        Ok(t) => t,
        Err(e) => return e,
    };
    let add = AddInput {
        student_name,
        is_time_block,
        is_trial: opt_bool(&input, "isTrial", false),
        note: opt_str(&input, "note").unwrap_or_default(),
    };
    let owner = Owner::Template {
        timetable_id: timetable_id.clone(),
    };
    match engine::add_schedule(conn, &timetable_id, &owner, &target, &add, WriteKind::TemplateEdit)
    {
        Ok(row) => ok(&req.id, json!({ "schedule": schedule_json(&row) })),
        Err(e) => engine_err(&req.id, &e),
    }
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
    if row.instance_id.is_some() {
        return err(&req.id, "bad_params", "not a template schedule", None);
    }

    let patch = req.params.get("patch").cloned().unwrap_or(json!({}));
    let day = opt_str(&patch, "dayOfWeek").unwrap_or_else(|| row.day_of_week.clone().unwrap_or_default());
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

    let target = match template_target(req, &day, &start, &end) {
        Ok(t) => t,
        Err(e) => return e,
    };
    if let Err(e) =
        engine::ensure_slot_free(conn, &row.owner(), &target, &[&row.id], WriteKind::TemplateEdit)
    {
        return engine_err(&req.id, &e);
    }

    let update = conn.execute(
        "UPDATE schedules
         SET day_of_week = ?, start_time = ?, end_time = ?, student_name = ?,
             is_time_block = ?, is_trial = ?, note = ?, updated_at = ?
         WHERE id = ?",
        rusqlite::params![
            target.day_of_week,
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
    if row.instance_id.is_some() {
        return err(&req.id, "bad_params", "not a template schedule", None);
    }
    match store::delete_schedule(conn, &schedule_id) {
        Ok(()) => ok(&req.id, json!({ "scheduleId": schedule_id })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_swap(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let id_a = match required_str(req, "scheduleIdA") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let id_b = match required_str(req, "scheduleIdB") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let a = match get_schedule_or_err(conn, req, &id_a) {
        Ok(r) => r,
        Err(e) => return e,
    };
    let b = match get_schedule_or_err(conn, req, &id_b) {
        Ok(r) => r,
        Err(e) => return e,
    };
    if a.instance_id.is_some() || b.instance_id.is_some() {
        return err(&req.id, "bad_params", "not a template schedule", None);
    }

    if let Err(e) = engine::swap_schedules(conn, &a, &b) {
        return engine_err(&req.id, &e);
    }
    let a_after = match get_schedule_or_err(conn, req, &id_a) {
        Ok(r) => r,
        Err(e) => return e,
    };
    let b_after = match get_schedule_or_err(conn, req, &id_b) {
        Ok(r) => r,
        Err(e) => return e,
    };
    ok(
        &req.id,
        json!({
            "schedules": [schedule_json(&a_after), schedule_json(&b_after)]
        }),
    )
}

fn handle_sync(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let timetable_id = match required_str(req, "timetableId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match store::timetable_exists(conn, &timetable_id) {
        Ok(true) => {}
        Ok(false) => return err(&req.id, "not_found", "timetable not found", None),
        Err(e) => return engine_err(&req.id, &e),
    }

    match lifecycle::sync_template_to_instances(conn, &timetable_id) {
        Ok(report) => ok(
            &req.id,
            json!({
                "instancesSeen": report.instances_seen,
                "slotsAdded": report.slots_added,
            }),
        ),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "template.schedules.list" => Some(handle_list(state, req)),
        "template.schedules.create" => Some(handle_create(state, req)),
        "template.schedules.update" => Some(handle_update(state, req)),
        "template.schedules.delete" => Some(handle_delete(state, req)),
        "template.schedules.swap" => Some(handle_swap(state, req)),
        "template.syncToInstances" => Some(handle_sync(state, req)),
        _ => None,
    }
}
