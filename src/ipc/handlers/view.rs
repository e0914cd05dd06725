use std::collections::BTreeSet;

use crate::diff;
use crate::error::EngineError;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{db_conn, instance_json, required_str, schedule_json};
use crate::ipc::types::{AppState, Request};
use crate::lifecycle;
use crate::slot;
use crate::store::{self, InstanceRow, ScheduleRow};
use crate::week;
use serde_json::{json, Value as JsonValue};

/// Lesson hours of the active, non-blocked records, in fractional hours.
fn stats_json(rows: &[&ScheduleRow], leave_count: usize) -> JsonValue {
    let mut minutes = 0u32;
    let mut students: BTreeSet<&str> = BTreeSet::new();
    for row in rows {
        if row.is_time_block {
            continue;
        }
        if let (Ok(start), Ok(end)) = (
            slot::parse_time(&row.start_time),
            slot::parse_time(&row.end_time),
        ) {
            minutes += (end - start) as u32;
        }
        students.insert(row.student_name.as_str());
    }
    json!({
        "hours": minutes as f64 / 60.0,
        "students": students.into_iter().collect::<Vec<_>>(),
        "leaveCount": leave_count,
    })
}

fn template_view(conn: &rusqlite::Connection, req: &Request, timetable_id: &str) -> JsonValue {
    let rows = match store::list_template_schedules(conn, timetable_id) {
        Ok(r) => r,
        Err(e) => return engine_err(&req.id, &e),
    };
    let refs: Vec<&ScheduleRow> = rows.iter().collect();
    ok(
        &req.id,
        json!({
            "week": "template",
            "schedules": rows.iter().map(schedule_json).collect::<Vec<_>>(),
            "stats": stats_json(&refs, 0),
        }),
    )
}

fn instance_view(
    conn: &rusqlite::Connection,
    req: &Request,
    selector: &str,
    instance: &InstanceRow,
    generated: Option<bool>,
) -> JsonValue {
    let template = match store::list_template_schedules(conn, &instance.timetable_id) {
        Ok(t) => t,
        Err(e) => return engine_err(&req.id, &e),
    };
    let rows = match store::list_instance_schedules(conn, &instance.id) {
        Ok(r) => r,
        Err(e) => return engine_err(&req.id, &e),
    };
    let report = diff::diff_week(&template, &rows);

    let week_start = match week::parse_date(&instance.week_start) {
        Ok(d) => d,
        Err(e) => return engine_err(&req.id, &e),
    };

    let schedules: Vec<JsonValue> = report
        .active
        .iter()
        .map(|d| {
            let mut v = schedule_json(d.schedule);
            v["classification"] = json!(d.classification.as_str());
            v["templateId"] = json!(d.template_id);
            v
        })
        .collect();

    let cancelled: Vec<JsonValue> = report
        .cancelled
        .iter()
        .map(|c| {
            let date = c
                .template
                .day_of_week
                .as_deref()
                .and_then(|d| slot::normalize_day(d).ok())
                .map(|day| week::format_date(week::date_for_day(week_start, day)));
            json!({
                "templateId": c.template.id,
                "dayOfWeek": c.template.day_of_week,
                "scheduleDate": date,
                "startTime": c.template.start_time,
                "endTime": c.template.end_time,
                "studentName": c.template.student_name,
                "isTimeBlock": c.template.is_time_block,
                "isTrial": c.template.is_trial,
                "onLeave": c.on_leave,
            })
        })
        .collect();

    let active_refs: Vec<&ScheduleRow> = report.active.iter().map(|d| d.schedule).collect();
    let mut result = json!({
        "week": selector,
        "instance": instance_json(instance),
        "schedules": schedules,
        "onLeave": report.on_leave.iter().map(|r| schedule_json(r)).collect::<Vec<_>>(),
        "cancelledSlots": cancelled,
        "stats": stats_json(&active_refs, report.on_leave.len()),
    });
    if let Some(generated) = generated {
        result["generated"] = json!(generated);
    }
    ok(&req.id, result)
}

fn handle_open(state: &mut AppState, req: &Request) -> serde_json::Value {
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

    let week_v = req.params.get("week").cloned().unwrap_or(json!("template"));
    let today = chrono::Local::now().date_naive();

    if let Some(selector) = week_v.as_str() {
        return match selector {
            "template" => template_view(conn, req, &timetable_id),
            "thisWeek" => {
                match lifecycle::ensure_current_week(conn, &state.gen_guard, &timetable_id, today) {
                    Ok(out) => instance_view(conn, req, "thisWeek", &out.instance, Some(out.generated)),
                    Err(e) => engine_err(&req.id, &e),
                }
            }
            "nextWeek" => {
                match lifecycle::ensure_next_week(conn, &state.gen_guard, &timetable_id, today) {
                    Ok(out) => instance_view(conn, req, "nextWeek", &out.instance, Some(out.generated)),
                    Err(e) => engine_err(&req.id, &e),
                }
            }
            _ => err(
                &req.id,
                "bad_params",
                "week must be template, thisWeek, nextWeek or {date}",
                None,
            ),
        };
    }

    // Specific date: resolve an existing week only; generation stays
    // restricted to the current/next selectors.
    if let Some(date_raw) = week_v.get("date").and_then(|v| v.as_str()) {
        let date = match week::parse_date(date_raw) {
            Ok(d) => d,
            Err(e) => return engine_err(&req.id, &e),
        };
        let start = week::format_date(week::week_start(date));
        return match store::find_instance_by_week(conn, &timetable_id, &start) {
            Ok(Some(instance)) => instance_view(conn, req, date_raw, &instance, None),
            Ok(None) => engine_err(
                &req.id,
                &EngineError::InstanceNotFound(format!("week of {date_raw}")),
            ),
            Err(e) => engine_err(&req.id, &e),
        };
    }

    err(
        &req.id,
        "bad_params",
        "week must be template, thisWeek, nextWeek or {date}",
        None,
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "view.open" => Some(handle_open(state, req)),
        _ => None,
    }
}
