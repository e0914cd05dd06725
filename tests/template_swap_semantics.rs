
use serde_json::json;
use test_support::{request_err, request_ok, setup_timetable, spawn_sidecar, temp_dir};

fn create(
    stdin: &mut std::process::ChildStdin,
    reader: &mut std::io::BufReader<std::process::ChildStdout>,
    id: &str,
    tt: &str,
    day: &str,
    start: &str,
    end: &str,
    name: &str,
) -> String {
    let created = request_ok(
        stdin,
        reader,
        id,
        "template.schedules.create",
        json!({
            "timetableId": tt,
            "input": { "dayOfWeek": day, "startTime": start, "endTime": end, "studentName": name }
        }),
    );
    created
        .pointer("/schedule/id")
        .and_then(|v| v.as_str())
        .expect("schedule id")
        .to_string()
}

#[test]
fn swap_exchanges_addressing_and_is_an_involution() {
    let workspace = temp_dir("timetabled-swap");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let tt = setup_timetable(&mut stdin, &mut reader, &workspace, "Cello Room");

    let a = create(&mut stdin, &mut reader, "1", &tt, "mon", "16:00", "17:00", "Alice");
    let b = create(&mut stdin, &mut reader, "2", &tt, "thu", "10:00", "11:00", "Bob");

    let swapped = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "template.schedules.swap",
        json!({ "scheduleIdA": a, "scheduleIdB": b }),
    );
    let schedules = swapped.get("schedules").unwrap().as_array().unwrap();
    // Students stay attached to their own records; only day/time moved.
    assert_eq!(
        schedules[0].get("studentName").and_then(|v| v.as_str()),
        Some("Alice")
    );
    assert_eq!(schedules[0].get("dayOfWeek").and_then(|v| v.as_str()), Some("thu"));
    assert_eq!(schedules[0].get("startTime").and_then(|v| v.as_str()), Some("10:00"));
    assert_eq!(schedules[1].get("dayOfWeek").and_then(|v| v.as_str()), Some("mon"));
    assert_eq!(schedules[1].get("startTime").and_then(|v| v.as_str()), Some("16:00"));

    // Swapping again restores the original addressing.
    let swapped = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "template.schedules.swap",
        json!({ "scheduleIdA": a, "scheduleIdB": b }),
    );
    let schedules = swapped.get("schedules").unwrap().as_array().unwrap();
    assert_eq!(schedules[0].get("dayOfWeek").and_then(|v| v.as_str()), Some("mon"));
    assert_eq!(schedules[0].get("startTime").and_then(|v| v.as_str()), Some("16:00"));
    assert_eq!(schedules[1].get("dayOfWeek").and_then(|v| v.as_str()), Some("thu"));
    assert_eq!(schedules[1].get("startTime").and_then(|v| v.as_str()), Some("10:00"));
}

#[test]
fn swap_between_hour_and_half_hour_is_rejected() {
    let workspace = temp_dir("timetabled-swap-mismatch");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    let tt = setup_timetable(&mut stdin, &mut reader, &workspace, "Flute Room");

    let hour = create(&mut stdin, &mut reader, "1", &tt, "mon", "16:00", "17:00", "Alice");
    let half = create(&mut stdin, &mut reader, "2", &tt, "tue", "10:00", "10:30", "Bob");

    let code = request_err(
        &mut stdin,
        &mut reader,
        "3",
        "template.schedules.swap",
        json!({ "scheduleIdA": hour, "scheduleIdB": half }),
    );
    assert_eq!(code, "duration_mismatch");
}
