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

fn spawn_daemon() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_timetabled");
    let mut child = Command::new(exe)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn timetabled");
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
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
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

fn request_err_code(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> String {
    let value = request(stdin, reader, id, method, params);
    assert_eq!(
        value.get("ok").and_then(|v| v.as_bool()),
        Some(false),
        "{} unexpectedly succeeded: {}",
        method,
        value
    );
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .and_then(|c| c.as_str())
        .expect("error code")
        .to_string()
}

fn open_and_login(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    workspace: &PathBuf,
) {
    let _ = request_ok(
        stdin,
        reader,
        "setup-1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "setup-2",
        "session.register",
        json!({ "username": "casey", "password": "secret123", "displayName": "Casey" }),
    );
    let _ = request_ok(
        stdin,
        reader,
        "setup-3",
        "session.login",
        json!({ "username": "casey", "password": "secret123" }),
    );
}

#[test]
fn bulk_add_creates_the_week_by_period_product() {
    let workspace = temp_dir("timetable-bulk");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    open_and_login(&mut stdin, &mut reader, &workspace);

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "courses.add",
        json!({
            "name": "Algorithms",
            "teacher": "Dr. X",
            "day": "Tue",
            "location": "Room 3",
            "weeks": [3, 4, 5],
            "periods": ["1-2", "3-4"],
        }),
    );
    assert_eq!(added.get("added").and_then(|v| v.as_u64()), Some(6));
    assert_eq!(
        added
            .get("failures")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );

    for week in [3, 4, 5] {
        let listed = request_ok(
            &mut stdin,
            &mut reader,
            &format!("list-{week}"),
            "courses.listWeek",
            json!({ "week": week }),
        );
        let courses = listed
            .get("courses")
            .and_then(|v| v.as_array())
            .cloned()
            .expect("courses array");
        assert_eq!(courses.len(), 2, "week {week}");
        assert!(courses
            .iter()
            .all(|c| c.get("day").and_then(|v| v.as_str()) == Some("Tue")));
        assert!(courses
            .iter()
            .all(|c| c.get("name").and_then(|v| v.as_str()) == Some("Algorithms")));
    }
}

#[test]
fn week_grid_places_courses_by_period_row_and_day_column() {
    let workspace = temp_dir("timetable-grid");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    open_and_login(&mut stdin, &mut reader, &workspace);

    let _ = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "courses.add",
        json!({
            "name": "Algorithms",
            "teacher": "Dr. X",
            "day": "Tue",
            "location": "Room 3",
            "weeks": [3],
            "periods": ["1-2", "3-4"],
        }),
    );

    let grid = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "schedule.weekGrid",
        json!({ "week": 3 }),
    );
    assert_eq!(
        grid.get("days").and_then(|v| v.as_array()).map(|a| a.len()),
        Some(7)
    );
    assert_eq!(
        grid.get("periods")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(5)
    );

    // Tue is column 1; periods 1-2 and 3-4 are rows 0 and 1.
    assert_eq!(
        grid.pointer("/cells/0/1/name").and_then(|v| v.as_str()),
        Some("Algorithms")
    );
    assert_eq!(
        grid.pointer("/cells/1/1/name").and_then(|v| v.as_str()),
        Some("Algorithms")
    );
    assert!(grid
        .pointer("/cells/2/1")
        .map(|v| v.is_null())
        .unwrap_or(false));
    assert!(grid
        .pointer("/cells/0/0")
        .map(|v| v.is_null())
        .unwrap_or(false));
}

#[test]
fn week_range_shortcut_expands_inclusively() {
    let workspace = temp_dir("timetable-range");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    open_and_login(&mut stdin, &mut reader, &workspace);

    let added = request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "courses.add",
        json!({
            "name": "Compilers",
            "teacher": "Dr. Y",
            "day": "Wed",
            "location": "Lab 5",
            "weekRange": { "start": 3, "end": 5 },
            "periods": ["5-6"],
        }),
    );
    assert_eq!(added.get("added").and_then(|v| v.as_u64()), Some(3));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "courses.listWeek",
        json!({ "week": 4 }),
    );
    assert_eq!(
        listed
            .get("courses")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(1)
    );
}

#[test]
fn malformed_selections_are_rejected_without_writes() {
    let workspace = temp_dir("timetable-badinput");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    open_and_login(&mut stdin, &mut reader, &workspace);

    let base = json!({
        "name": "Algorithms",
        "teacher": "Dr. X",
        "day": "Tue",
        "location": "Room 3",
        "weeks": [3],
        "periods": ["1-2"],
    });

    let with = |key: &str, value: serde_json::Value| {
        let mut v = base.clone();
        v[key] = value;
        v
    };

    for (idx, params) in [
        with("name", json!("   ")),
        with("teacher", json!("")),
        with("location", json!("")),
        with("weeks", json!([])),
        with("periods", json!([])),
        with("day", json!("Funday")),
        with("periods", json!(["2-3"])),
        with("weeks", json!([0])),
        with("weeks", json!([19])),
        with("weekRange", json!({ "start": 5, "end": 3 })),
    ]
    .into_iter()
    .enumerate()
    {
        // weekRange cases must not also carry an explicit weeks list.
        let params = if params.get("weekRange").is_some() {
            let mut p = params.clone();
            p.as_object_mut().expect("object").remove("weeks");
            p
        } else {
            params
        };
        let code = request_err_code(
            &mut stdin,
            &mut reader,
            &format!("bad-{idx}"),
            "courses.add",
            params,
        );
        assert_eq!(code, "bad_params", "case {idx}");
    }

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "final-list",
        "courses.listWeek",
        json!({ "week": 3 }),
    );
    assert_eq!(
        listed
            .get("courses")
            .and_then(|v| v.as_array())
            .map(|a| a.len()),
        Some(0)
    );
}

#[test]
fn weeks_and_week_range_together_are_rejected() {
    let workspace = temp_dir("timetable-bothweeks");
    let (_child, mut stdin, mut reader) = spawn_daemon();
    open_and_login(&mut stdin, &mut reader, &workspace);

    let code = request_err_code(
        &mut stdin,
        &mut reader,
        "1",
        "courses.add",
        json!({
            "name": "Algorithms",
            "teacher": "Dr. X",
            "day": "Tue",
            "location": "Room 3",
            "weeks": [3],
            "weekRange": { "start": 3, "end": 5 },
            "periods": ["1-2"],
        }),
    );
    assert_eq!(code, "bad_params");
}
