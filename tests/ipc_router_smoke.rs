
use serde_json::json;
use test_support::{request, request_err, request_ok, spawn_sidecar, temp_dir};

#[test]
fn health_reports_version_and_workspace() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let health = request_ok(&mut stdin, &mut reader, "1", "health", json!({}));
    assert!(health.get("version").and_then(|v| v.as_str()).is_some());
    assert!(health.get("workspacePath").unwrap().is_null());

    let workspace = temp_dir("timetabled-smoke");
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let health = request_ok(&mut stdin, &mut reader, "3", "health", json!({}));
    assert!(health
        .get("workspacePath")
        .and_then(|v| v.as_str())
        .is_some());
}

#[test]
fn unknown_methods_and_missing_workspace_are_rejected() {
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    let resp = request(&mut stdin, &mut reader, "1", "no.such.method", json!({}));
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("not_implemented")
    );

    let code = request_err(
        &mut stdin,
        &mut reader,
        "2",
        "timetables.create",
        json!({ "name": "Room A" }),
    );
    assert_eq!(code, "no_workspace");

    // Listing before a workspace is selected degrades to empty, not an error.
    let listed = request_ok(&mut stdin, &mut reader, "3", "timetables.list", json!({}));
    assert_eq!(listed.get("timetables").unwrap().as_array().unwrap().len(), 0);
}
