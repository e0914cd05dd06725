use crate::engine;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{db_conn, get_schedule_or_err, opt_str, required_str, schedule_json};
use crate::ipc::types::{AppState, Request};
use serde_json::json;

fn handle_request_leave(state: &mut AppState, req: &Request) -> serde_json::Value {
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
        return err(
            &req.id,
            "bad_params",
            "leave applies to weekly-instance schedules only",
            None,
        );
    }

    let reason = opt_str(&req.params, "reason");
    match engine::request_leave(conn, &row, reason.as_deref()) {
        Ok(updated) => {
            tracing::info!(schedule_id = %updated.id, "leave requested");
            ok(&req.id, json!({ "schedule": schedule_json(&updated) }))
        }
        Err(e) => engine_err(&req.id, &e),
    }
}

fn handle_cancel_leave(state: &mut AppState, req: &Request) -> serde_json::Value {
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
        return err(
            &req.id,
            "bad_params",
            "leave applies to weekly-instance schedules only",
            None,
        );
    }

    match engine::cancel_leave(conn, &row) {
        Ok(updated) => {
            tracing::info!(schedule_id = %updated.id, "leave cancelled");
            ok(&req.id, json!({ "schedule": schedule_json(&updated) }))
        }
        Err(e) => engine_err(&req.id, &e),
    }
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "leave.request" => Some(handle_request_leave(state, req)),
        "leave.cancel" => Some(handle_cancel_leave(state, req)),
        _ => None,
    }
}
