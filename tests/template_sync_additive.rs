
use serde_json::json;
use test_support::{request_ok, setup_timetable, spawn_sidecar, temp_dir};

/// Template entries added after a week was generated are merged into it;
/// slots deliberately removed from the week stay removed.
#[test]
fn sync_merges_new_template_entries_only() {
    let workspace = temp_dir("timetabled-sync");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let tt = setup_timetable(&mut stdin, &mut reader, &workspace, "Piano Room");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "template.schedules.create",
        json!({
            "timetableId": tt,
            "input": { "dayOfWeek": "mon", "startTime": "16:00", "endTime": "17:00", "studentName": "Alice" }
        }),
    );
    let ensured = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "instances.ensureCurrentWeek",
        json!({ "timetableId": tt }),
    );
    let instance_id = ensured
        .pointer("/instance/id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();

    // Cancel Alice's slot in this week only.
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "instance.schedules.list",
        json!({ "instanceId": instance_id }),
    );
    let alice_week_id = listed
        .pointer("/schedules/0/id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "instance.schedules.delete",
        json!({ "scheduleId": alice_week_id }),
    );

    // A new student joins the recurring roster after generation.
    std::thread::sleep(std::time::Duration::from_millis(5));
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "template.schedules.create",
        json!({
            "timetableId": tt,
            "input": { "dayOfWeek": "wed", "startTime": "11:00", "endTime": "12:00", "studentName": "Dana" }
        }),
    );

    let synced = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "template.syncToInstances",
        json!({ "timetableId": tt }),
    );
    assert_eq!(synced.get("instancesSeen").and_then(|v| v.as_i64()), Some(1));
    assert_eq!(synced.get("slotsAdded").and_then(|v| v.as_i64()), Some(1));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "7",
        "instance.schedules.list",
        json!({ "instanceId": instance_id }),
    );
    let rows = listed.get("schedules").unwrap().as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("studentName").and_then(|v| v.as_str()), Some("Dana"));

    // A second sync changes nothing.
    let synced = request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "template.syncToInstances",
        json!({ "timetableId": tt }),
    );
    assert_eq!(synced.get("slotsAdded").and_then(|v| v.as_i64()), Some(0));

    // The cancelled Monday slot still reads as cancelled, not resurrected.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "view.open",
        json!({ "timetableId": tt, "week": "thisWeek" }),
    );
    let cancelled = view.get("cancelledSlots").unwrap().as_array().unwrap();
    assert_eq!(cancelled.len(), 1);
    assert_eq!(
        cancelled[0].get("studentName").and_then(|v| v.as_str()),
        Some("Alice")
    );
}

#[test]
fn restore_to_template_discards_local_edits() {
    let workspace = temp_dir("timetabled-restore-template");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let tt = setup_timetable(&mut stdin, &mut reader, &workspace, "Violin Room");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "template.schedules.create",
        json!({
            "timetableId": tt,
            "input": { "dayOfWeek": "tue", "startTime": "09:00", "endTime": "10:00", "studentName": "Bob" }
        }),
    );
    let ensured = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "instances.ensureCurrentWeek",
        json!({ "timetableId": tt }),
    );
    let instance_id = ensured
        .pointer("/instance/id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();

    // Local edit: rename this week's record.
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "instance.schedules.list",
        json!({ "instanceId": instance_id }),
    );
    let week_id = listed
        .pointer("/schedules/0/id")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "instance.schedules.update",
        json!({ "scheduleId": week_id, "patch": { "studentName": "Robert" } }),
    );

    let restored = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "instances.restoreToTemplate",
        json!({ "instanceId": instance_id }),
    );
    assert_eq!(restored.get("cloned").and_then(|v| v.as_i64()), Some(1));

    let view = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "view.open",
        json!({ "timetableId": tt, "week": "thisWeek" }),
    );
    let schedules = view.get("schedules").unwrap().as_array().unwrap();
    assert_eq!(schedules.len(), 1);
    assert_eq!(
        schedules[0].get("studentName").and_then(|v| v.as_str()),
        Some("Bob")
    );
    assert_eq!(
        schedules[0].get("classification").and_then(|v| v.as_str()),
        Some("unchanged")
    );
}

#[test]
fn specific_date_views_resolve_existing_weeks_only() {
    let workspace = temp_dir("timetabled-specific-date");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let tt = setup_timetable(&mut stdin, &mut reader, &workspace, "Guitar Room");

    let ensured = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "instances.ensureCurrentWeek",
        json!({ "timetableId": tt }),
    );
    let week_start = ensured
        .pointer("/instance/weekStart")
        .and_then(|v| v.as_str())
        .unwrap()
        .to_string();

    // Any date of the generated week resolves to it.
    let view = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "view.open",
        json!({ "timetableId": tt, "week": { "date": week_start } }),
    );
    assert_eq!(
        view.pointer("/instance/weekStart").and_then(|v| v.as_str()),
        Some(week_start.as_str())
    );

    // A week that was never generated is not resolved implicitly.
    let resp = test_support::request(
        &mut stdin,
        &mut reader,
        "3",
        "view.open",
        json!({ "timetableId": tt, "week": { "date": "2020-01-01" } }),
    );
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("instance_not_found")
    );
}
