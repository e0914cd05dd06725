
use serde_json::json;
use test_support::{request_err, request_ok, setup_timetable, spawn_sidecar, temp_dir};

#[test]
fn template_exclusivity_rejects_overlaps_but_allows_half_pairs() {
    let workspace = temp_dir("timetabled-template-crud");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let tt = setup_timetable(&mut stdin, &mut reader, &workspace, "Piano Room");

    let created = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "template.schedules.create",
        json!({
            "timetableId": tt,
            "input": { "dayOfWeek": "Monday", "startTime": "16:00", "endTime": "17:00", "studentName": "Alice" }
        }),
    );
    assert_eq!(
        created.pointer("/schedule/dayOfWeek").and_then(|v| v.as_str()),
        Some("mon")
    );

    // Same slot again: the exclusivity invariant holds.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "template.schedules.create",
        json!({
            "timetableId": tt,
            "input": { "dayOfWeek": "mon", "startTime": "16:00", "endTime": "17:00", "studentName": "Bob" }
        }),
    );
    assert_eq!(code, "slot_conflict");

    // A partial overlap is just as much of a conflict.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "template.schedules.create",
        json!({
            "timetableId": tt,
            "input": { "dayOfWeek": "mon", "startTime": "16:30", "endTime": "17:30", "studentName": "Bob" }
        }),
    );
    assert_eq!(code, "slot_conflict");

    // Complementary halves of a different hour both fit.
    for (id, start, end, name) in [("4", "18:00", "18:30", "Bob"), ("5", "18:30", "19:00", "Carol")] {
        let _ = request_ok(
            &mut stdin,
            &mut reader,
            id,
            "template.schedules.create",
            json!({
                "timetableId": tt,
                "input": { "dayOfWeek": "mon", "startTime": start, "endTime": end, "studentName": name }
            }),
        );
    }

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "template.schedules.list",
        json!({ "timetableId": tt }),
    );
    assert_eq!(listed.get("schedules").unwrap().as_array().unwrap().len(), 3);
}

#[test]
fn malformed_times_and_days_fail_validation() {
    let workspace = temp_dir("timetabled-template-validation");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let tt = setup_timetable(&mut stdin, &mut reader, &workspace, "Violin Room");

    for (id, day, start, end) in [
        ("1", "Funday", "16:00", "17:00"),
        ("2", "mon", "16:15", "17:15"),
        ("3", "mon", "16:00", "18:00"),
        ("4", "mon", "17:00", "16:00"),
        ("5", "mon", "4pm", "5pm"),
    ] {
        let code = request_err(
            &mut stdin,
            &mut reader,
            id,
            "template.schedules.create",
            json!({
                "timetableId": tt,
                "input": { "dayOfWeek": day, "startTime": start, "endTime": end, "studentName": "Alice" }
            }),
        );
        assert_eq!(code, "invalid_time_format", "case {id}");
    }
}

#[test]
fn localized_day_names_normalize_to_one_slot() {
    let workspace = temp_dir("timetabled-template-days");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let tt = setup_timetable(&mut stdin, &mut reader, &workspace, "Guitar Room");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "template.schedules.create",
        json!({
            "timetableId": tt,
            "input": { "dayOfWeek": "星期三", "startTime": "10:00", "endTime": "11:00", "studentName": "Ming" }
        }),
    );
    // The same Wednesday slot under a different spelling collides.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "template.schedules.create",
        json!({
            "timetableId": tt,
            "input": { "dayOfWeek": "Wednesday", "startTime": "10:00", "endTime": "11:00", "studentName": "Lee" }
        }),
    );
    assert_eq!(code, "slot_conflict");
}

#[test]
fn update_moves_and_renames_with_conflict_checks() {
    let workspace = temp_dir("timetabled-template-update");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let tt = setup_timetable(&mut stdin, &mut reader, &workspace, "Drum Room");

    let a = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "template.schedules.create",
        json!({
            "timetableId": tt,
            "input": { "dayOfWeek": "tue", "startTime": "09:00", "endTime": "10:00", "studentName": "Alice" }
        }),
    );
    let a_id = a.pointer("/schedule/id").and_then(|v| v.as_str()).unwrap().to_string();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "template.schedules.create",
        json!({
            "timetableId": tt,
            "input": { "dayOfWeek": "tue", "startTime": "10:00", "endTime": "11:00", "studentName": "Bob" }
        }),
    );

    // Rename in place is fine.
    let updated = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "template.schedules.update",
        json!({ "scheduleId": a_id, "patch": { "studentName": "Alicia" } }),
    );
    assert_eq!(
        updated.pointer("/schedule/studentName").and_then(|v| v.as_str()),
        Some("Alicia")
    );

    // Moving onto Bob's slot is not.
    let code = request_err(
        &mut stdin,
        &mut reader,
        "4",
        "template.schedules.update",
        json!({ "scheduleId": a_id, "patch": { "startTime": "10:00", "endTime": "11:00" } }),
    );
    assert_eq!(code, "slot_conflict");

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "template.schedules.delete",
        json!({ "scheduleId": a_id }),
    );
    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "template.schedules.list",
        json!({ "timetableId": tt }),
    );
    assert_eq!(listed.get("schedules").unwrap().as_array().unwrap().len(), 1);
}
