use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{db_conn, required_str};
use crate::ipc::types::{AppState, Request};
use crate::store;
use rusqlite::OptionalExtension;
use serde_json::json;
use uuid::Uuid;

fn handle_timetables_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(conn) = state.db.as_ref() else {
        return ok(&req.id, json!({ "timetables": [] }));
    };

    // Counts let the UI show a dashboard without extra round trips.
    let mut stmt = match conn.prepare(
        "SELECT
           t.id,
           t.name,
           (SELECT COUNT(*) FROM schedules s
            WHERE s.timetable_id = t.id AND s.instance_id IS NULL) AS template_count,
           (SELECT COUNT(*) FROM weekly_instances wi
            WHERE wi.timetable_id = t.id) AS instance_count
         FROM timetables t
         ORDER BY t.name",
    ) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };

    let rows = stmt
        .query_map([], |row| {
            Ok(json!({
                "id": row.get::<_, String>(0)?,
                "name": row.get::<_, String>(1)?,
                "templateScheduleCount": row.get::<_, i64>(2)?,
                "instanceCount": row.get::<_, i64>(3)?,
            }))
        })
        .and_then(|it| it.collect::<Result<Vec<_>, _>>());

    match rows {
        Ok(timetables) => ok(&req.id, json!({ "timetables": timetables })),
        Err(e) => err(&req.id, "db_query_failed", e.to_string(), None),
    }
}

fn handle_timetables_create(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let timetable_id = Uuid::new_v4().to_string();
    if let Err(e) = conn.execute(
        "INSERT INTO timetables(id, name, created_at) VALUES(?, ?, ?)",
        (&timetable_id, &name, store::now_ts()),
    ) {
        return err(
            &req.id,
            "db_insert_failed",
            e.to_string(),
            Some(json!({ "table": "timetables" })),
        );
    }

    ok(&req.id, json!({ "timetableId": timetable_id, "name": name }))
}

fn handle_timetables_rename(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let timetable_id = match required_str(req, "timetableId") {
        Ok(v) => v,
        Err(e) => return e,
    };
    let name = match required_str(req, "name") {
        Ok(v) => v,
        Err(e) => return e,
    };

    match conn.execute(
        "UPDATE timetables SET name = ? WHERE id = ?",
        (&name, &timetable_id),
    ) {
        Ok(0) => err(&req.id, "not_found", "timetable not found", None),
        Ok(_) => ok(&req.id, json!({ "timetableId": timetable_id, "name": name })),
        Err(e) => err(&req.id, "db_update_failed", e.to_string(), None),
    }
}

fn handle_timetables_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let conn = match db_conn(state, req) {
        Ok(c) => c,
        Err(e) => return e,
    };
    let timetable_id = match required_str(req, "timetableId") {
        Ok(v) => v,
        Err(e) => return e,
    };

    let exists: Option<i64> = match conn
        .query_row("SELECT 1 FROM timetables WHERE id = ?", [&timetable_id], |r| {
            r.get(0)
        })
        .optional()
    {
        Ok(v) => v,
        Err(e) => return err(&req.id, "db_query_failed", e.to_string(), None),
    };
    if exists.is_none() {
        return err(&req.id, "not_found", "timetable not found", None);
    }

    let tx = match conn.unchecked_transaction() {
        Ok(t) => t,
        Err(e) => return err(&req.id, "db_tx_failed", e.to_string(), None),
    };

    // Delete in dependency order (no ON DELETE CASCADE).
    if let Err(e) = tx.execute("DELETE FROM schedules WHERE timetable_id = ?", [&timetable_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "schedules" })),
        );
    }
    if let Err(e) = tx.execute(
        "DELETE FROM weekly_instances WHERE timetable_id = ?",
        [&timetable_id],
    ) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "weekly_instances" })),
        );
    }
    if let Err(e) = tx.execute("DELETE FROM timetables WHERE id = ?", [&timetable_id]) {
        let _ = tx.rollback();
        return err(
            &req.id,
            "db_delete_failed",
            e.to_string(),
            Some(json!({ "table": "timetables" })),
        );
    }
    if let Err(e) = tx.commit() {
        return err(&req.id, "db_tx_failed", e.to_string(), None);
    }

    ok(&req.id, json!({ "timetableId": timetable_id }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "timetables.list" => Some(handle_timetables_list(state, req)),
        "timetables.create" => Some(handle_timetables_create(state, req)),
        "timetables.rename" => Some(handle_timetables_rename(state, req)),
        "timetables.delete" => Some(handle_timetables_delete(state, req)),
        _ => None,
    }
}
