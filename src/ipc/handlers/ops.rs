use crate::engine::{self, OpKind, OpState, PendingOp, SlotTarget, WriteKind};
use crate::error::EngineError;
use crate::ipc::error::{engine_err, err, ok};
use crate::ipc::helpers::{
    get_instance_or_err, get_schedule_or_err, instance_target, opt_bool, opt_str, required_str,
    schedule_json, template_target,
};
use crate::ipc::types::{AppState, Request};
use crate::slot;
use crate::store::ScheduleRow;
use crate::week;
use rusqlite::Connection;
use serde_json::{json, Value as JsonValue};

fn target_json(t: &SlotTarget) -> JsonValue {
    json!({
        "dayOfWeek": t.day_of_week,
        "scheduleDate": t.schedule_date.map(week::format_date),
        "startTime": slot::format_time(t.start),
        "endTime": slot::format_time(t.end),
    })
}

/// Parse one target slot object using the source row's addressing mode.
fn target_for_row(
    conn: &Connection,
    req: &Request,
    row: &ScheduleRow,
    v: &JsonValue,
) -> Result<SlotTarget, JsonValue> {
    let start = opt_str(v, "startTime")
        .ok_or_else(|| err(&req.id, "bad_params", "target missing startTime", None))?;
    let end = opt_str(v, "endTime")
        .ok_or_else(|| err(&req.id, "bad_params", "target missing endTime", None))?;

    match &row.instance_id {
        Some(instance_id) => {
            let instance = get_instance_or_err(conn, req, instance_id)?;
            let date = opt_str(v, "scheduleDate")
                .ok_or_else(|| err(&req.id, "bad_params", "target missing scheduleDate", None))?;
            instance_target(req, &instance, &date, &start, &end)
        }
        None => {
            let day = opt_str(v, "dayOfWeek")
                .ok_or_else(|| err(&req.id, "bad_params", "target missing dayOfWeek", None))?;
            template_target(req, &day, &start, &end)
        }
    }
}

/// A failed apply drops the operation: the slot is idle again, ready for a
/// fresh begin.
fn fail_idle(req: &Request, e: &EngineError) -> serde_json::Value {
    err(&req.id, e.code(), e.to_string(), Some(json!({ "state": "idle" })))
}

fn handle_begin(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let kind_raw = match required_str(req, "kind") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(kind) = OpKind::parse(&kind_raw) else {
        return err(&req.id, "bad_params", "kind must be move, copy or swap", None);
    };
    let schedule_id = match required_str(req, "scheduleId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    if let Err(e) = get_schedule_or_err(conn, req, &schedule_id) {
        return e;
    }

    let op = PendingOp::begin(kind, &schedule_id);
    let resp = ok(
        &req.id,
        json!({
            "opId": op.id,
            "kind": op.kind.as_str(),
            "state": op.state.as_str(),
        }),
    );
    state.pending_ops.insert(op.id.clone(), op);
    resp
}

fn handle_apply(state: &mut AppState, req: &Request) -> serde_json::Value {
    let AppState {
        db, pending_ops, ..
    } = state;
    let Some(conn) = db.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let op_id = match required_str(req, "opId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(mut op) = pending_ops.remove(&op_id) else {
        return err(&req.id, "not_found", "no such pending operation", None);
    };

    let row = match get_schedule_or_err(conn, req, &op.schedule_id) {
        Ok(r) => r,
        Err(e) => return e,
    };

    match op.kind {
        OpKind::Move => {
            let Some(target_v) = req.params.get("target") else {
                return err(&req.id, "bad_params", "missing target", None);
            };
            let target = match target_for_row(conn, req, &row, target_v) {
                Ok(t) => t,
                Err(e) => return e,
            };
            match engine::move_schedule(conn, &row, &target) {
                Ok(moved) => {
                    let _ = op.advance(OpState::Applied);
                    ok(
                        &req.id,
                        json!({ "state": op.state.as_str(), "schedule": schedule_json(&moved) }),
                    )
                }
                Err(e) => fail_idle(req, &e),
            }
        }
        OpKind::Copy => {
            let raw_targets = req
                .params
                .get("targets")
                .and_then(|v| v.as_array())
                .cloned()
                .unwrap_or_default();
            if raw_targets.is_empty() {
                return fail_idle(req, &EngineError::EmptySelection);
            }
            let mut targets = Vec::with_capacity(raw_targets.len());
            for v in &raw_targets {
                match target_for_row(conn, req, &row, v) {
                    Ok(t) => targets.push(t),
                    Err(e) => return e,
                }
            }

            let confirm = opt_bool(&req.params, "confirm", false);
            if !confirm && op.state == OpState::AwaitingConfirmation {
                let resp = err(
                    &req.id,
                    "bad_params",
                    "operation awaits confirmation; re-apply with confirm: true",
                    Some(json!({ "state": op.state.as_str() })),
                );
                pending_ops.insert(op.id.clone(), op);
                return resp;
            }
            if !confirm && op.state == OpState::AwaitingTarget {
                // Dry pass: report per-target verdicts; park for confirmation
                // if anything conflicts.
                let mut preview = Vec::with_capacity(targets.len());
                let mut conflicts = 0usize;
                for t in &targets {
                    match engine::ensure_slot_free(conn, &row.owner(), t, &[], WriteKind::Operation)
                    {
                        Ok(()) => preview.push(json!({ "target": target_json(t), "ok": true })),
                        Err(e) => {
                            conflicts += 1;
                            preview.push(json!({
                                "target": target_json(t),
                                "ok": false,
                                "error": { "code": e.code(), "message": e.to_string() }
                            }));
                        }
                    }
                }
                if conflicts > 0 {
                    let _ = op.advance(OpState::AwaitingConfirmation);
                    let resp = ok(
                        &req.id,
                        json!({
                            "state": op.state.as_str(),
                            "preview": preview,
                            "conflicts": conflicts,
                        }),
                    );
                    pending_ops.insert(op.id.clone(), op);
                    return resp;
                }
            }

            match engine::copy_schedule(conn, &row, &targets) {
                Ok(outcome) => {
                    let _ = op.advance(OpState::Applied);
                    ok(
                        &req.id,
                        json!({
                            "state": op.state.as_str(),
                            "succeeded": outcome.created.len(),
                            "schedules": outcome
                                .created
                                .iter()
                                .map(schedule_json)
                                .collect::<Vec<_>>(),
                            "failures": outcome
                                .failures
                                .iter()
                                .map(|f| json!({
                                    "target": target_json(&f.target),
                                    "error": {
                                        "code": f.error.code(),
                                        "message": f.error.to_string()
                                    }
                                }))
                                .collect::<Vec<_>>(),
                        }),
                    )
                }
                Err(e) => fail_idle(req, &e),
            }
        }
        OpKind::Swap => {
            let other_id = match required_str(req, "targetScheduleId") {
                Ok(v) => v,
                Err(e) => return e,
            };
            let other = match get_schedule_or_err(conn, req, &other_id) {
                Ok(r) => r,
                Err(e) => return e,
            };
            match engine::swap_schedules(conn, &row, &other) {
                Ok(()) => {
                    let _ = op.advance(OpState::Applied);
                    let a = match get_schedule_or_err(conn, req, &row.id) {
                        Ok(r) => r,
                        Err(e) => return e,
                    };
                    let b = match get_schedule_or_err(conn, req, &other.id) {
                        Ok(r) => r,
                        Err(e) => return e,
                    };
                    ok(
                        &req.id,
                        json!({
                            "state": op.state.as_str(),
                            "schedules": [schedule_json(&a), schedule_json(&b)],
                        }),
                    )
                }
                Err(e) => fail_idle(req, &e),
            }
        }
    }
}

fn handle_cancel(state: &mut AppState, req: &Request) -> serde_json::Value {
    let op_id = match required_str(req, "opId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let Some(mut op) = state.pending_ops.remove(&op_id) else {
        return err(&req.id, "not_found", "no such pending operation", None);
    };
    let _ = op.advance(OpState::Cancelled);
    ok(&req.id, json!({ "opId": op_id, "state": op.state.as_str() }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "ops.begin" => Some(handle_begin(state, req)),
        "ops.apply" => Some(handle_apply(state, req)),
        "ops.cancel" => Some(handle_cancel(state, req)),
        _ => None,
    }
}
