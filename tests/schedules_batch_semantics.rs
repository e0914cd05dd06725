
use serde_json::json;
use test_support::{
    current_week_day, request_err, request_ok, setup_timetable, spawn_sidecar, temp_dir,
};

#[test]
fn create_batch_aggregates_per_item_results() {
    let workspace = temp_dir("timetabled-batch-create");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let tt = setup_timetable(&mut stdin, &mut reader, &workspace, "Piano Room");
    let monday = current_week_day(0);

    let ensured = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "instances.ensureCurrentWeek",
        json!({ "timetableId": tt }),
    );
    let instance_id = ensured
        .pointer("/instance/id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();

    let batch = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "instance.schedules.createBatch",
        json!({
            "instanceId": instance_id,
            "inputs": [
                { "scheduleDate": monday, "startTime": "16:00", "endTime": "17:00", "studentName": "Alice" },
                // Collides with the first item.
                { "scheduleDate": monday, "startTime": "16:30", "endTime": "17:30", "studentName": "Bob" },
                { "scheduleDate": monday, "startTime": "17:30", "endTime": "18:00", "studentName": "Carol" },
                // Malformed time, rejected item-by-item.
                { "scheduleDate": monday, "startTime": "16:10", "endTime": "17:10", "studentName": "Dana" }
            ]
        }),
    );
    assert_eq!(batch.get("succeeded").and_then(|v| v.as_i64()), Some(2));
    let results = batch.get("results").unwrap().as_array().unwrap();
    assert_eq!(results.len(), 4);
    assert_eq!(results[0].get("ok").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        results[1].pointer("/error/code").and_then(|v| v.as_str()),
        Some("slot_occupied")
    );
    assert_eq!(results[2].get("ok").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        results[3].pointer("/error/code").and_then(|v| v.as_str()),
        Some("invalid_time_format")
    );

    // Failures did not corrupt the applied items.
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "instance.schedules.list",
        json!({ "instanceId": instance_id }),
    );
    assert_eq!(listed.get("schedules").unwrap().as_array().unwrap().len(), 2);
}

#[test]
fn empty_batches_are_rejected_up_front() {
    let workspace = temp_dir("timetabled-batch-empty");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let tt = setup_timetable(&mut stdin, &mut reader, &workspace, "Violin Room");

    let ensured = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "instances.ensureCurrentWeek",
        json!({ "timetableId": tt }),
    );
    let instance_id = ensured
        .pointer("/instance/id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "instance.schedules.createBatch",
        json!({ "instanceId": instance_id, "inputs": [] }),
    );
    assert_eq!(code, "empty_selection");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "instance.schedules.deleteBatch",
        json!({ "scheduleIds": [] }),
    );
    assert_eq!(code, "empty_selection");
}

#[test]
fn delete_batch_reports_missing_ids_without_aborting() {
    let workspace = temp_dir("timetabled-batch-delete");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let tt = setup_timetable(&mut stdin, &mut reader, &workspace, "Guitar Room");
    let monday = current_week_day(0);

    let ensured = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "instances.ensureCurrentWeek",
        json!({ "timetableId": tt }),
    );
    let instance_id = ensured
        .pointer("/instance/id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();

    let mut ids = Vec::new();
    for (rid, start, end) in [("2", "16:00", "17:00"), ("3", "17:00", "18:00")] {
        let created = request_ok(
            &mut stdin,
            &mut reader,
            rid,
            "instance.schedules.create",
            json!({
                "instanceId": instance_id,
                "input": { "scheduleDate": monday, "startTime": start, "endTime": end, "studentName": "Alice" }
            }),
        );
        ids.push(
            created
                .pointer("/schedule/id")
                .and_then(|v| v.as_str())
                .unwrap()
                .to_string(),
        );
    }

    let batch = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "instance.schedules.deleteBatch",
        json!({ "scheduleIds": [ids[0], "no-such-id", ids[1]] }),
    );
    assert_eq!(batch.get("succeeded").and_then(|v| v.as_i64()), Some(2));
    let results = batch.get("results").unwrap().as_array().unwrap();
    assert_eq!(
        results[1].pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_found")
    );

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "instance.schedules.list",
        json!({ "instanceId": instance_id }),
    );
    assert_eq!(listed.get("schedules").unwrap().as_array().unwrap().len(), 0);
}

#[test]
fn occupied_blocks_are_excluded_from_hour_stats() {
    let workspace = temp_dir("timetabled-occupy-stats");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let tt = setup_timetable(&mut stdin, &mut reader, &workspace, "Drum Room");
    let monday = current_week_day(0);

    let ensured = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "instances.ensureCurrentWeek",
        json!({ "timetableId": tt }),
    );
    let instance_id = ensured
        .pointer("/instance/id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "instance.schedules.create",
        json!({
            "instanceId": instance_id,
            "input": { "scheduleDate": monday, "startTime": "16:00", "endTime": "17:00", "studentName": "Alice" }
        }),
    );
    let blocked = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "schedules.occupy",
        json!({
            "instanceId": instance_id,
            "scheduleDate": monday,
            "startTime": "17:00",
            "endTime": "18:00"
        }),
    );
    assert_eq!(
        blocked.pointer("/schedule/isTimeBlock").and_then(|v| v.as_bool()),
        Some(true)
    );

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "view.open",
        json!({ "timetableId": tt, "week": "thisWeek" }),
    );
    // The blocked hour does not count; neither does its reserved label.
    assert_eq!(view.pointer("/stats/hours").and_then(|v| v.as_f64()), Some(1.0));
    let students = view.pointer("/stats/students").unwrap().as_array().unwrap();
    assert_eq!(students.len(), 1);
    assert_eq!(students[0].as_str(), Some("Alice"));

    // The blocked slot still enforces exclusivity.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "5",
        "instance.schedules.create",
        json!({
            "instanceId": instance_id,
            "input": { "scheduleDate": monday, "startTime": "17:00", "endTime": "18:00", "studentName": "Bob" }
        }),
    );
    assert_eq!(code, "slot_occupied");
}
