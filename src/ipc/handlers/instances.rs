use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{db_conn, instance_json, required_str};
use crate::ipc::types::{AppState, Request};
use crate::lifecycle;
use crate::store;
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

    // Ascending by week start; counts ride along for the week picker.
    let mut stmt = match conn.prepare(
        "SELECT
           wi.id, wi.timetable_id, wi.week_start, wi.week_end,
           (SELECT COUNT(*) FROM schedules s
            WHERE s.instance_id = wi.id AND s.is_on_leave = 0) AS active_count,
           (SELECT COUNT(*) FROM schedules s
            WHERE s.instance_id = wi.id AND s.is_on_leave = 1) AS leave_count
         FROM weekly_instances wi
         WHERE wi.timetable_id = ?
         ORDER BY wi.week_start",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    let rows = stmt
        .query_map([&timetable_id], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "timetableId": row.get::<_, String>(1)?,
                "weekStart": row.get::<_, String>(2)?,
                "weekEnd": row.get::<_, String>(3)?,
                "scheduleCount": row.get::<_, i64>(4)?,
                "leaveCount": row.get::<_, i64>(5)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(instances) => ok(&req.id, json!({ "instances": instances })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_ensure(state: &mut AppState, req: &Request, next_week: bool) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let timetable_id = match required_str(req, "timetableId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let today = chrono::Local::now().date_naive();
    let outcome = if next_week {
        lifecycle::ensure_next_week(conn, &state.gen_guard, &timetable_id, today)
    } else {
        lifecycle::ensure_current_week(conn, &state.gen_guard, &timetable_id, today)
    };
    match outcome {
        Ok(out) => ok(
            &req.id,
            json!({
                "instance": instance_json(&out.instance),
                "generated": out.generated,
            }),
        ),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_clear(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let instance_id = match required_str(req, "instanceId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match lifecycle::clear_instance(conn, &instance_id) {
        Ok(removed) => ok(&req.id, json!({ "instanceId": instance_id, "removed": removed })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_restore_to_template(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let instance_id = match required_str(req, "instanceId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match lifecycle::restore_instance_to_template(conn, &instance_id) {
        Ok(cloned) => ok(&req.id, json!({ "instanceId": instance_id, "cloned": cloned })),
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let instance_id = match required_str(req, "instanceId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    match lifecycle::delete_instance(conn, &instance_id) {
        Ok(()) => ok(&req.id, json!({ "instanceId": instance_id })),
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "instances.list" => Some(handle_list(state, req)),
        "instances.ensureCurrentWeek" => Some(handle_ensure(state, req, false)),
        "instances.ensureNextWeek" => Some(handle_ensure(state, req, true)),
        "instances.clear" => Some(handle_clear(state, req)),
        "instances.restoreToTemplate" => Some(handle_restore_to_template(state, req)),
        "instances.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
