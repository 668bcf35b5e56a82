use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_placementd");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn placementd");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({ "id": id, "method": method, "params": params });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

fn admin_token(stdin: &mut ChildStdin, reader: &mut BufReader<ChildStdout>) -> String {
    let _ = request_ok(
        stdin,
        reader,
        "signup",
        "auth.signup",
        json!({ "username": "admin", "password": "hunter2" }),
    );
    let login = request_ok(
        stdin,
        reader,
        "login",
        "auth.login",
        json!({ "username": "admin", "password": "hunter2" }),
    );
    login
        .get("token")
        .and_then(|v| v.as_str())
        .expect("token")
        .to_string()
}

#[test]
fn course_and_year_lists_round_trip() {
    let workspace = temp_dir("placementd-reference-crud");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let token = admin_token(&mut stdin, &mut reader);

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "course.add",
        json!({ "token": token, "coursename": "Python" }),
    );
    let course_id = added
        .get("id")
        .and_then(|v| v.as_str())
        .expect("course id")
        .to_string();
    // Mutations reply with the refreshed list.
    assert_eq!(
        added.get("courses").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(1)
    );

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "course.add",
        json!({ "token": token, "coursename": "Java" }),
    );
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "4",
        "year.add",
        json!({ "token": token, "year": "2023-2027" }),
    );

    let reference = request_ok(&mut stdin, &mut reader, "5", "reference.get", json!({}));
    let courses = reference
        .get("courses")
        .and_then(|v| v.as_array())
        .expect("courses");
    assert_eq!(courses.len(), 2);
    // Configuration order is admin-entered order.
    assert_eq!(
        courses[0].get("coursename").and_then(|v| v.as_str()),
        Some("Python")
    );
    assert_eq!(
        reference
            .get("years")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    let deleted = request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "course.delete",
        json!({ "token": token, "id": course_id }),
    );
    assert_eq!(deleted.get("removed").and_then(|v| v.as_bool()), Some(true));
    assert_eq!(
        deleted
            .get("courses")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn duplicates_are_rejected() {
    let workspace = temp_dir("placementd-reference-dup");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let token = admin_token(&mut stdin, &mut reader);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "year.add",
        json!({ "token": token, "year": "2022-2026" }),
    );
    let dup = request(
        &mut stdin,
        &mut reader,
        "3",
        "year.add",
        json!({ "token": token, "year": "2022-2026" }),
    );
    assert_eq!(dup.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        dup.pointer("/error/code").and_then(|v| v.as_str()),
        Some("duplicate")
    );

    drop(stdin);
    let _ = child.wait();
}

#[test]
fn mutations_require_a_valid_token() {
    let workspace = temp_dir("placementd-reference-auth");
    let (mut child, mut stdin, mut reader) = spawn_sidecar();
    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    let denied = request(
        &mut stdin,
        &mut reader,
        "2",
        "course.add",
        json!({ "token": "not-a-token", "coursename": "Python" }),
    );
    assert_eq!(denied.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        denied.pointer("/error/code").and_then(|v| v.as_str()),
        Some("unauthorized")
    );

    let missing = request(
        &mut stdin,
        &mut reader,
        "3",
        "year.add",
        json!({ "year": "2021-2025" }),
    );
    assert_eq!(
        missing.pointer("/error/code").and_then(|v| v.as_str()),
        Some("bad_params")
    );

    drop(stdin);
    let _ = child.wait();
}
